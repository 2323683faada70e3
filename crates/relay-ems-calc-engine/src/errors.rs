//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed variable calculation from flattened device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalcError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("value '{value}' of {key} is not a number")]
    NotANumber { key: String, value: String },
    #[error("value '{value}' of {key} is not a boolean")]
    NotABoolean { key: String, value: String },
}
