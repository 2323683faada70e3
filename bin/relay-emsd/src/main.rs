//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the relay-ems daemon."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use relay_ems_common::{init_tracing, AppConfig};
use relay_ems_core::RelayOrchestrator;
use relay_ems_metrics::{new_registry, spawn_http_server, DaemonMetrics, SharedRegistry};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "relay-ems daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Poll every configured device until interrupted")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/relay-ems.toml"));
    candidates.push(PathBuf::from("/etc/relay-ems/relay-ems.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let config = loaded.config;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            println!("Configuration {} is valid", loaded.source.display());
            for (device_id, device) in &config.devices {
                println!(
                    "  {}: {}:{} every {}s",
                    device_id,
                    device.host,
                    device.port,
                    device.poll_interval.as_secs()
                );
            }
        }
        Commands::Run => {
            init_tracing("relay-emsd", &config.logging)?;
            info!(config_path = %loaded.source.display(), devices = config.devices.len(), "configuration loaded");

            let metrics_registry = new_registry();
            let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
            daemon_metrics.observe_config_load(load_duration.as_secs_f64());
            daemon_metrics.inc_start();

            run_daemon(config, Some(metrics_registry)).await?;
        }
    }
    Ok(())
}

async fn run_daemon(config: AppConfig, mut metrics_registry: Option<SharedRegistry>) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let metrics_server = if metrics_settings.enabled {
        match metrics_registry.clone() {
            Some(registry) => {
                info!(address = %metrics_settings.listen, "metrics exporter enabled");
                Some(spawn_http_server(registry, metrics_settings.listen)?)
            }
            None => {
                warn!("metrics exporter requested but no registry available");
                None
            }
        }
    } else {
        metrics_registry = None;
        info!("metrics exporter disabled by configuration");
        None
    };

    let handle = RelayOrchestrator::new(config, metrics_registry)
        .start()
        .await?;

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown().await?;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}
