//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Discovery of telemetry fields and relay commands from device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Turns an arbitrary device status document into addressable fields and a
//! catalog of relay commands, and builds the request URLs both paths share.
//!
//! The pipeline runs leaves first:
//! [`template`] -> [`json`] -> [`field`] -> [`capability`] -> [`catalog`].

pub mod capability;
pub mod catalog;
pub mod field;
pub mod json;
pub mod labels;
pub mod template;

pub use capability::{descriptor_for_key, infer, ControlActionDescriptor};
pub use catalog::{payload_prefix, synthesize, Command, RelayAction, SubAction, GROUP_ID};
pub use field::{discover, Field, FieldKind};
pub use json::{flatten_to_map, flatten_values};
pub use template::build_url;
