//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Control CLI for operators interacting with relay devices."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use relay_ems_common::{init_cli, AppConfig, ConnectionSettings};
use relay_ems_core::{test_connection, DeviceProvider};
use relay_ems_discovery::{labels, RelayAction};
use relay_ems_net::HttpConnectionFactory;

#[derive(Debug, Parser)]
#[command(author, version, about = "relay-ems device control utility", long_about = None)]
struct Cli {
    #[arg(short, long, global = true, help = "Emit debug logs on stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check that the device answers with JSON and report its name and topic.
    Test(DeviceArgs),
    /// Discover fields and relay commands and print them.
    Discover {
        #[command(flatten)]
        device: DeviceArgs,
        /// Print the discovered state as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the relay commands the device offers.
    Commands(DeviceArgs),
    /// Switch a relay.
    Send {
        #[command(flatten)]
        device: DeviceArgs,
        /// Relay number; omit for single-relay devices.
        #[arg(long)]
        channel: Option<u32>,
        #[arg(long, value_enum)]
        action: ActionArg,
    },
}

#[derive(Debug, Args)]
struct DeviceArgs {
    /// Device host name or address.
    #[arg(long, conflicts_with = "device", required_unless_present = "device")]
    host: Option<String>,
    #[arg(long, default_value_t = 80)]
    port: u16,
    #[arg(long, env = "RELAY_EMS_USER")]
    user: Option<String>,
    #[arg(long, env = "RELAY_EMS_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Use a device from the configuration file instead of --host.
    #[arg(long, value_name = "ID")]
    device: Option<String>,
    #[arg(long, value_name = "FILE", default_value = "configs/relay-ems.toml")]
    config: PathBuf,
    /// Request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

impl DeviceArgs {
    fn resolve(&self) -> Result<(String, ConnectionSettings, Duration)> {
        if let Some(device_id) = &self.device {
            let config = AppConfig::load(&[&self.config])?;
            let device = config
                .device(device_id)
                .ok_or_else(|| anyhow!("device '{}' is not configured", device_id))?;
            return Ok((
                device_id.clone(),
                device.settings(),
                device.request_timeout,
            ));
        }
        let host = self
            .host
            .clone()
            .ok_or_else(|| anyhow!("either --host or --device is required"))?;
        let settings = ConnectionSettings {
            host: host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
        };
        Ok((host, settings, Duration::from_secs(self.timeout)))
    }

    async fn discovered_provider(&self) -> Result<DeviceProvider> {
        let (device_id, settings, timeout) = self.resolve()?;
        let factory = Arc::new(HttpConnectionFactory::new(timeout));
        let provider = DeviceProvider::new(device_id, settings, factory)?;
        provider
            .first_run()
            .await
            .with_context(|| format!("discovery failed for {}", provider.settings().host))?;
        Ok(provider)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ActionArg {
    On,
    Off,
    Toggle,
}

impl From<ActionArg> for RelayAction {
    fn from(value: ActionArg) -> Self {
        match value {
            ActionArg::On => RelayAction::On,
            ActionArg::Off => RelayAction::Off,
            ActionArg::Toggle => RelayAction::Toggle,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli(cli.verbose);
    match cli.command {
        Commands::Test(device) => {
            let (_, settings, timeout) = device.resolve()?;
            let factory = HttpConnectionFactory::new(timeout);
            println!("{}", test_connection(&factory, &settings).await?);
        }
        Commands::Discover { device, json } => {
            let provider = device.discovered_provider().await?;
            let state = provider
                .state()
                .ok_or_else(|| anyhow!("device state missing after discovery"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(state.as_ref())?);
            } else {
                println!("Fields ({}):", state.property.fields.len());
                for field in &state.property.fields {
                    println!("  {:<40} {:?}", field.name, field.kind);
                }
                print_commands(&provider);
            }
        }
        Commands::Commands(device) => {
            let provider = device.discovered_provider().await?;
            print_commands(&provider);
        }
        Commands::Send {
            device,
            channel,
            action,
        } => {
            let provider = device.discovered_provider().await?;
            let action = RelayAction::from(action);
            provider.send(channel, action).await?;
            let relay = channel.map_or_else(|| "Relay".to_owned(), |n| format!("Relay {}", n));
            println!("{}: {} sent", relay, action);
        }
    }
    Ok(())
}

fn print_commands(provider: &DeviceProvider) {
    let commands = provider.available_commands();
    if commands.is_empty() {
        println!("No relay commands discovered");
        return;
    }
    println!("Commands ({}):", commands.len());
    for command in &commands {
        println!("  {}", labels::command_title(command));
        for option in &command.options {
            println!(
                "    {:<8} {}",
                labels::option_label(option),
                option.encoded_value
            );
        }
    }
}
