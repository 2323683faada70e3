//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Discovery of telemetry fields and relay commands from device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use relay_ems_common::{EmsError, Result};
use serde_json::Value;

/// Separator placed between the segments of a flattened key.
pub const KEY_SEPARATOR: char = '_';

/// Parse `json` and flatten it into scalar leaves keyed by their joined path.
///
/// `{"StatusSTS":{"POWER1":"ON"}}` becomes `StatusSTS_POWER1 -> "ON"`; array
/// elements use their index as the segment.
pub fn flatten_values(json: &str) -> Result<BTreeMap<String, Value>> {
    let document: Value = serde_json::from_str(json)?;
    let Value::Object(map) = document else {
        return Err(EmsError::Parse(format!(
            "expected a JSON object at the top level, found {}",
            type_name(&document)
        )));
    };
    let mut flat = BTreeMap::new();
    for (key, value) in map {
        flatten_into(&mut flat, key, value);
    }
    Ok(flat)
}

/// Flatten `json` into string values, as consumed by the calculator.
pub fn flatten_to_map(json: &str) -> Result<BTreeMap<String, String>> {
    Ok(flatten_values(json)?
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(&value)))
        .collect())
}

/// Render a scalar the way it should appear in a flat string map.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn flatten_into(flat: &mut BTreeMap<String, Value>, prefix: String, value: Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(flat, format!("{prefix}{KEY_SEPARATOR}{key}"), nested);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.into_iter().enumerate() {
                flatten_into(flat, format!("{prefix}{KEY_SEPARATOR}{index}"), nested);
            }
        }
        scalar => {
            flat.insert(prefix, scalar);
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
