//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Discovery of telemetry fields and relay commands from device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use relay_ems_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::json::flatten_values;

/// Scalar kind inferred from the JSON representation of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Number(_) => FieldKind::Number,
            Value::Bool(_) => FieldKind::Boolean,
            _ => FieldKind::String,
        }
    }
}

/// One addressable value of a device snapshot.
///
/// Identity is `(owner, name)`; two fields with the same identity are the same
/// field regardless of kind or source key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Output variable name.
    pub name: String,
    /// Flattened key in the device document.
    pub source_key: String,
    pub kind: FieldKind,
    /// Logical provider property the field belongs to.
    pub owner: String,
}

impl Field {
    pub fn new(source_key: impl Into<String>, kind: FieldKind, owner: impl Into<String>) -> Self {
        let source_key = source_key.into();
        Self {
            name: variable_name(&source_key),
            source_key,
            kind,
            owner: owner.into(),
        }
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.name == other.name
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        self.owner
            .cmp(&other.owner)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Derive an output variable name from a flattened key.
pub fn variable_name(source_key: &str) -> String {
    source_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Flatten `raw_json` and describe every leaf as a [`Field`] owned by `owner`.
pub fn discover(raw_json: &str, owner: &str) -> Result<BTreeSet<Field>> {
    let flat = flatten_values(raw_json)?;
    let mut fields = BTreeSet::new();
    for (key, value) in &flat {
        // insert keeps the first key for a colliding variable name
        fields.insert(Field::new(key.as_str(), FieldKind::of(value), owner));
    }
    debug!(owner, keys = flat.len(), fields = fields.len(), "fields discovered");
    Ok(fields)
}
