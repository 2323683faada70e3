//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the relay-ems workspace.
//! This crate exposes configuration loading, device connection settings,
//! logging initialisation and the error taxonomy consumed across the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod settings;

pub use config::{AppConfig, DeviceConfig, LoggingConfig, MetricsConfig, StateConfig};
pub use error::{EmsError, Result};
pub use logging::{init_cli, init_tracing, LogFormat};
pub use settings::ConnectionSettings;
