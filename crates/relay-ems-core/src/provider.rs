//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-device discovery, polling and command dispatch."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! One polled device.
//!
//! A [`DeviceProvider`] discovers its fields and relay commands on the first
//! successful contact, then reuses them on every poll. The discovered state is
//! published whole through an [`ArcSwapOption`]: readers never lock and never
//! observe a half-built catalog.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use relay_ems_calc_engine::{CalcSummary, FieldCalculator, MapCalculator, Variables};
use relay_ems_common::{ConnectionSettings, EmsError, Result};
use relay_ems_discovery::{
    build_url, discover, flatten_to_map, infer, synthesize, Command, Field, RelayAction, GROUP_ID,
};
use relay_ems_metrics::ProviderMetrics;
use relay_ems_net::{ConnectionFactory, HttpConnection, CONTENT_TYPE_JSON};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

/// Scheme, host and port every request template starts with.
pub const BASE_URL: &str = "http://{provider_host}:{provider_port}";
/// Telemetry request appended to [`BASE_URL`].
pub const STATUS_COMMAND: &str = "/cm?cmnd=Status0";
/// Name of the telemetry property owning every discovered field.
pub const PROPERTY_NAME: &str = "cmd";

const DEVICE_NAME_KEY: &str = "Status_DeviceName";
const TOPIC_KEY: &str = "Status_Topic";

/// Telemetry endpoint together with the fields discovered on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProperty {
    pub name: String,
    pub command: String,
    pub fields: Vec<Field>,
}

impl ProviderProperty {
    pub fn template(&self) -> String {
        format!("{}{}", BASE_URL, self.command)
    }
}

/// Everything the first run produces, published and persisted as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredState {
    pub property: ProviderProperty,
    pub commands: Vec<Command>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredState {
    /// Catalog entry for a payload channel, `None` meaning the unnumbered relay.
    pub fn command_for(&self, channel: Option<u32>) -> Option<&Command> {
        self.commands
            .iter()
            .find(|command| command.channel_number() == channel)
    }

    pub fn offers(&self, encoded_value: &str) -> bool {
        self.commands
            .iter()
            .any(|command| command.offers(encoded_value))
    }
}

/// Telemetry URL for a set of connection settings.
pub fn status_url(settings: &ConnectionSettings) -> Result<Url> {
    build_url(
        &format!("{}{}", BASE_URL, STATUS_COMMAND),
        &settings.placeholder_values(),
    )
}

/// URL dispatching one encoded command value.
pub fn command_url(settings: &ConnectionSettings, encoded_value: &str) -> Result<Url> {
    build_url(
        &format!("{}/cm?{}", BASE_URL, encoded_value),
        &settings.placeholder_values(),
    )
}

/// Probe a device with `settings` and report its name and topic.
pub async fn test_connection(
    factory: &dyn ConnectionFactory,
    settings: &ConnectionSettings,
) -> Result<String> {
    let url = status_url(settings)?;
    let connection = factory.create_connection(settings)?;
    connection.test(&url, CONTENT_TYPE_JSON).await?;
    let body = connection.get_as_string(&url).await?;
    let flat = flatten_to_map(&body)?;
    let name = flat.get(DEVICE_NAME_KEY).map(String::as_str).unwrap_or("");
    let topic = flat.get(TOPIC_KEY).map(String::as_str).unwrap_or("");
    Ok(format!(
        "Connection successful: device '{}', topic '{}'",
        name, topic
    ))
}

/// Poller and command dispatcher for one device.
pub struct DeviceProvider {
    device_id: String,
    settings: ConnectionSettings,
    factory: Arc<dyn ConnectionFactory>,
    connection: Arc<dyn HttpConnection>,
    calculator: Arc<dyn FieldCalculator>,
    metrics: Option<ProviderMetrics>,
    state: ArcSwapOption<DiscoveredState>,
}

impl std::fmt::Debug for DeviceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProvider")
            .field("device_id", &self.device_id)
            .field("host", &self.settings.host)
            .field("discovered", &self.is_discovered())
            .finish()
    }
}

impl DeviceProvider {
    pub fn new(
        device_id: impl Into<String>,
        settings: ConnectionSettings,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self> {
        let connection = factory.create_connection(&settings)?;
        Ok(Self {
            device_id: device_id.into(),
            settings,
            factory,
            connection,
            calculator: Arc::new(MapCalculator::new()),
            metrics: None,
            state: ArcSwapOption::empty(),
        })
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn FieldCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_metrics(mut self, metrics: ProviderMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Seed previously persisted discovery results.
    pub fn with_state(self, state: DiscoveredState) -> Self {
        self.state.store(Some(Arc::new(state)));
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn is_discovered(&self) -> bool {
        self.state.load().is_some()
    }

    /// Snapshot of the discovered state, if the first run has completed.
    pub fn state(&self) -> Option<Arc<DiscoveredState>> {
        self.state.load_full()
    }

    /// Relay command catalog, empty until the first run completes.
    pub fn available_commands(&self) -> Vec<Command> {
        self.state()
            .map(|state| state.commands.clone())
            .unwrap_or_default()
    }

    pub fn fields(&self) -> Vec<Field> {
        self.state()
            .map(|state| state.property.fields.clone())
            .unwrap_or_default()
    }

    /// Probe the device with alternative settings, using this provider's transport factory.
    pub async fn test_connection(&self, settings: &ConnectionSettings) -> Result<String> {
        test_connection(self.factory.as_ref(), settings).await
    }

    /// Discover fields and commands when nothing is cached yet.
    ///
    /// Returns `Ok(true)` when this call published new state and `Ok(false)`
    /// when state was already present, including when a concurrent call
    /// published first. On error nothing is published.
    pub async fn first_run(&self) -> Result<bool> {
        if self.is_discovered() {
            return Ok(false);
        }
        match self.discover_state().await {
            Ok(state) => {
                let fields = state.property.fields.len();
                let commands = state.commands.len();
                if !self.publish(state) {
                    debug!(device = %self.device_id, "concurrent first run already published state");
                    return Ok(false);
                }
                info!(
                    device = %self.device_id,
                    fields,
                    commands,
                    "device discovered"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_first_run(&self.device_id, "ok");
                    metrics.set_catalog_size(&self.device_id, commands);
                }
                Ok(true)
            }
            Err(err) => {
                warn!(device = %self.device_id, error = %err, "discovery failed, retrying next cycle");
                if let Some(metrics) = &self.metrics {
                    metrics.record_first_run(&self.device_id, err.kind());
                }
                Err(err)
            }
        }
    }

    /// Install `state` only if nothing is published yet. Returns whether it won.
    fn publish(&self, state: DiscoveredState) -> bool {
        let previous = self
            .state
            .compare_and_swap(&None::<Arc<DiscoveredState>>, Some(Arc::new(state)));
        previous.is_none()
    }

    /// Forget discovered state so the next cycle rediscovers.
    pub fn reset(&self) {
        self.state.store(None);
    }

    /// Fetch one snapshot and write typed variables for the cached fields.
    pub async fn poll(&self, variables: &mut Variables) -> Result<CalcSummary> {
        let result = self.poll_inner(variables).await;
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(err) => err.kind(),
            };
            metrics.record_poll(&self.device_id, outcome);
        }
        result
    }

    async fn poll_inner(&self, variables: &mut Variables) -> Result<CalcSummary> {
        let state = self
            .state()
            .ok_or_else(|| EmsError::Unconfigured(self.device_id.clone()))?;
        let url = build_url(
            &state.property.template(),
            &self.settings.placeholder_values(),
        )?;
        let body = self.connection.get_as_string(&url).await?;
        let flat = flatten_to_map(&body)?;
        Ok(self
            .calculator
            .apply(&flat, &state.property.fields, variables))
    }

    /// One scheduler tick: discover if needed, then poll.
    pub async fn run_cycle(&self) -> Result<Variables> {
        self.first_run().await?;
        let mut variables = Variables::new();
        self.poll(&mut variables).await?;
        Ok(variables)
    }

    /// Dispatch an encoded command value. The response body is ignored.
    pub async fn send_command(&self, encoded_value: &str) -> Result<()> {
        if !self
            .state()
            .map(|state| state.offers(encoded_value))
            .unwrap_or(false)
        {
            debug!(device = %self.device_id, value = encoded_value, "dispatching value outside the catalog");
        }
        let result = self.dispatch(encoded_value).await;
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(()) => "ok",
                Err(err) => err.kind(),
            };
            metrics.record_command(&self.device_id, outcome);
        }
        result
    }

    async fn dispatch(&self, encoded_value: &str) -> Result<()> {
        let url = command_url(&self.settings, encoded_value)?;
        let response = self.connection.get(&url).await?;
        info!(device = %self.device_id, url = %url, status = response.status, "command sent");
        Ok(())
    }

    /// Resolve a channel and action against the catalog and dispatch it.
    pub async fn send(&self, channel: Option<u32>, action: RelayAction) -> Result<()> {
        let state = self
            .state()
            .ok_or_else(|| EmsError::Unconfigured(self.device_id.clone()))?;
        let option = state
            .command_for(channel)
            .and_then(|command| command.option(action))
            .ok_or_else(|| {
                EmsError::MalformedRequest(format!(
                    "device '{}' has no relay {} offering {}",
                    self.device_id,
                    channel.map_or_else(|| "(single)".to_owned(), |n| n.to_string()),
                    action
                ))
            })?;
        let encoded_value = option.encoded_value.clone();
        self.send_command(&encoded_value).await
    }
}
