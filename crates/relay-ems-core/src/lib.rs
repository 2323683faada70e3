//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Device providers, discovered-state persistence and the polling orchestrator.

pub mod orchestrator;
pub mod provider;
pub mod state;

pub use orchestrator::{OrchestratorHandle, RelayOrchestrator};
pub use provider::{
    command_url, status_url, test_connection, DeviceProvider, DiscoveredState, ProviderProperty,
    BASE_URL, PROPERTY_NAME, STATUS_COMMAND,
};
pub use state::StateStore;
