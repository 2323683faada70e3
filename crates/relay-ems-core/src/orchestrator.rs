//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use relay_ems_calc_engine::Variables;
use relay_ems_common::{AppConfig, DeviceConfig};
use relay_ems_discovery::labels;
use relay_ems_metrics::{ProviderMetrics, SharedRegistry};
use relay_ems_net::{ConnectionFactory, HttpConnectionFactory};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::provider::DeviceProvider;
use crate::state::StateStore;

/// Starts one polling task per configured device.
pub struct RelayOrchestrator {
    config: Arc<AppConfig>,
    metrics_registry: Option<SharedRegistry>,
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
}

impl std::fmt::Debug for RelayOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayOrchestrator")
            .field("devices", &self.config.devices.len())
            .field("metrics", &self.metrics_registry.is_some())
            .finish()
    }
}

impl RelayOrchestrator {
    pub fn new(config: AppConfig, metrics: Option<SharedRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            metrics_registry: metrics,
            connection_factory: None,
        }
    }

    /// Use one transport factory for every device instead of a `reqwest`
    /// factory built from each device's timeout.
    pub fn with_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connection_factory = Some(factory);
        self
    }

    /// Spawn every device task and return a handle for lifecycle control.
    pub async fn start(self) -> Result<OrchestratorHandle> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
        let store = Arc::new(StateStore::from_config(&self.config.state)?);
        let provider_metrics = match &self.metrics_registry {
            Some(registry) => Some(ProviderMetrics::new(registry.clone())?),
            None => None,
        };

        let mut devices = IndexMap::new();
        for (device_id, device_config) in &self.config.devices {
            let factory = self.factory_for(device_config);
            let mut provider =
                DeviceProvider::new(device_id.clone(), device_config.settings(), factory)
                    .with_context(|| format!("failed to create provider for device {}", device_id))?;
            if let Some(metrics) = &provider_metrics {
                provider = provider.with_metrics(metrics.clone());
            }
            if let Some(state) = store.load(device_id) {
                info!(
                    device = %device_id,
                    commands = state.commands.len(),
                    "restored discovered state"
                );
                if let Some(metrics) = &provider_metrics {
                    metrics.set_catalog_size(device_id, state.commands.len());
                }
                provider = provider.with_state(state);
            }
            let handle = DeviceHandle::spawn(
                Arc::new(provider),
                store.clone(),
                device_config.poll_interval,
                shutdown_rx.resubscribe(),
            );
            devices.insert(device_id.clone(), handle);
        }

        info!(devices = devices.len(), "orchestrator started");
        Ok(OrchestratorHandle {
            shutdown: shutdown_tx,
            devices,
            config: self.config.clone(),
            metrics_registry: self.metrics_registry.clone(),
        })
    }

    fn factory_for(&self, device: &DeviceConfig) -> Arc<dyn ConnectionFactory> {
        match &self.connection_factory {
            Some(factory) => factory.clone(),
            None => Arc::new(HttpConnectionFactory::new(device.request_timeout)),
        }
    }
}

/// Handle returned from the orchestrator startup.
#[derive(Debug)]
pub struct OrchestratorHandle {
    shutdown: broadcast::Sender<()>,
    devices: IndexMap<String, DeviceHandle>,
    config: Arc<AppConfig>,
    metrics_registry: Option<SharedRegistry>,
}

impl OrchestratorHandle {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<SharedRegistry> {
        self.metrics_registry.clone()
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn provider(&self, device_id: &str) -> Option<Arc<DeviceProvider>> {
        self.devices
            .get(device_id)
            .map(|device| device.provider.clone())
    }

    /// Latest variables produced by a device's steady-state polls.
    pub fn variables(&self, device_id: &str) -> Option<watch::Receiver<Variables>> {
        self.devices
            .get(device_id)
            .map(|device| device.variables.clone())
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        for (device_id, device) in self.devices {
            if let Err(err) = device.task.await {
                error!(device = %device_id, error = %err, "device task join error");
            }
        }
        info!("orchestrator shutdown complete");
        Ok(())
    }
}

#[derive(Debug)]
struct DeviceHandle {
    provider: Arc<DeviceProvider>,
    variables: watch::Receiver<Variables>,
    task: JoinHandle<()>,
}

impl DeviceHandle {
    fn spawn(
        provider: Arc<DeviceProvider>,
        store: Arc<StateStore>,
        poll_interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let (variables_tx, variables_rx) = watch::channel(Variables::new());
        let worker = provider.clone();
        let task = tokio::spawn(async move {
            run_device(&worker, &store, poll_interval, &variables_tx, &mut shutdown).await;
        });
        Self {
            provider,
            variables: variables_rx,
            task,
        }
    }
}

async fn run_device(
    provider: &DeviceProvider,
    store: &StateStore,
    poll_interval: Duration,
    variables: &watch::Sender<Variables>,
    shutdown: &mut broadcast::Receiver<()>,
) {
    let device_id = provider.device_id();
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!(device = %device_id, "device shutdown signal received");
                break;
            }
            _ = interval.tick() => {
                match provider.first_run().await {
                    Ok(true) => {
                        log_catalog(provider);
                        if let Some(state) = provider.state() {
                            if let Err(err) = store.save(device_id, &state) {
                                warn!(device = %device_id, error = %err, "failed to persist discovered state");
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(_) => continue,
                }

                let mut latest = Variables::new();
                match provider.poll(&mut latest).await {
                    Ok(summary) => {
                        debug!(
                            device = %device_id,
                            written = summary.written,
                            missing = summary.missing,
                            rejected = summary.rejected,
                            "poll cycle complete"
                        );
                        variables.send_replace(latest);
                    }
                    Err(err) => {
                        warn!(device = %device_id, error = %err, kind = err.kind(), "poll cycle failed");
                    }
                }
            }
        }
    }
}

fn log_catalog(provider: &DeviceProvider) {
    for command in provider.available_commands() {
        info!(
            device = %provider.device_id(),
            command = %labels::command_title(&command),
            rank = command.sort_rank,
            "relay command available"
        );
    }
}
