//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed variable calculation from flattened device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
pub mod calculator;
pub mod errors;

pub use calculator::{CalcSummary, FieldCalculator, MapCalculator, Variables};
pub use errors::{CalcError, Result};
