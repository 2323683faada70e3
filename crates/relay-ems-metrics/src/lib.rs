//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener.local_addr()?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "relay_emsd_starts_total",
            "Total number of times the relay-ems daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "relay_emsd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }
}

/// Per-device provider counters.
#[derive(Clone, Debug)]
pub struct ProviderMetrics {
    poll_cycles: IntCounterVec,
    first_runs: IntCounterVec,
    commands_sent: IntCounterVec,
    catalog_commands: IntGaugeVec,
}

impl ProviderMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let poll_cycles = IntCounterVec::new(
            Opts::new(
                "relay_ems_poll_cycles_total",
                "Steady-state poll cycles by device and outcome",
            ),
            &["device", "outcome"],
        )?;
        registry.register(Box::new(poll_cycles.clone()))?;

        let first_runs = IntCounterVec::new(
            Opts::new(
                "relay_ems_first_run_total",
                "Discovery attempts by device and outcome",
            ),
            &["device", "outcome"],
        )?;
        registry.register(Box::new(first_runs.clone()))?;

        let commands_sent = IntCounterVec::new(
            Opts::new(
                "relay_ems_commands_sent_total",
                "Relay commands dispatched by device and outcome",
            ),
            &["device", "outcome"],
        )?;
        registry.register(Box::new(commands_sent.clone()))?;

        let catalog_commands = IntGaugeVec::new(
            Opts::new(
                "relay_ems_catalog_commands",
                "Number of commands in the synthesized catalog",
            ),
            &["device"],
        )?;
        registry.register(Box::new(catalog_commands.clone()))?;

        Ok(Self {
            poll_cycles,
            first_runs,
            commands_sent,
            catalog_commands,
        })
    }

    pub fn record_poll(&self, device: &str, outcome: &str) {
        self.poll_cycles.with_label_values(&[device, outcome]).inc();
    }

    pub fn record_first_run(&self, device: &str, outcome: &str) {
        self.first_runs.with_label_values(&[device, outcome]).inc();
    }

    pub fn record_command(&self, device: &str, outcome: &str) {
        self.commands_sent.with_label_values(&[device, outcome]).inc();
    }

    pub fn set_catalog_size(&self, device: &str, commands: usize) {
        self.catalog_commands
            .with_label_values(&[device])
            .set(commands as i64);
    }
}

pub use prometheus;
