//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed variable calculation from flattened device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use relay_ems_discovery::{Field, FieldKind};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::errors::{CalcError, Result};

/// Output variables keyed by field name.
pub type Variables = BTreeMap<String, Value>;

/// Outcome counts of one calculation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalcSummary {
    pub written: usize,
    /// Fields whose source key was absent from the snapshot.
    pub missing: usize,
    /// Values that could not be converted to the field kind.
    pub rejected: usize,
}

/// Applies field rules to a flattened snapshot and writes typed variables.
pub trait FieldCalculator: Send + Sync {
    fn apply(
        &self,
        flat_values: &BTreeMap<String, String>,
        fields: &[Field],
        variables: &mut Variables,
    ) -> CalcSummary;
}

/// Default calculator: one variable per field, converted to the field's kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapCalculator;

impl MapCalculator {
    pub fn new() -> Self {
        Self
    }

    fn convert(field: &Field, raw: &str) -> Result<Value> {
        match field.kind {
            FieldKind::String => Ok(Value::String(raw.to_owned())),
            FieldKind::Number => parse_number(raw).ok_or_else(|| CalcError::NotANumber {
                key: field.source_key.clone(),
                value: raw.to_owned(),
            }),
            FieldKind::Boolean => parse_bool(raw).map(Value::Bool).ok_or_else(|| {
                CalcError::NotABoolean {
                    key: field.source_key.clone(),
                    value: raw.to_owned(),
                }
            }),
        }
    }
}

impl FieldCalculator for MapCalculator {
    fn apply(
        &self,
        flat_values: &BTreeMap<String, String>,
        fields: &[Field],
        variables: &mut Variables,
    ) -> CalcSummary {
        let mut summary = CalcSummary::default();
        for field in fields {
            let Some(raw) = flat_values.get(&field.source_key) else {
                summary.missing += 1;
                continue;
            };
            match Self::convert(field, raw) {
                Ok(value) => {
                    variables.insert(field.name.clone(), value);
                    summary.written += 1;
                }
                Err(err) => {
                    warn!(field = %field.name, error = %err, "skipping unconvertible value");
                    summary.rejected += 1;
                }
            }
        }
        debug!(
            written = summary.written,
            missing = summary.missing,
            rejected = summary.rejected,
            "variables calculated"
        );
        summary
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(integer) = raw.parse::<i64>() {
        return Some(Value::from(integer));
    }
    if let Ok(unsigned) = raw.parse::<u64>() {
        return Some(Value::from(unsigned));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Some(true),
        "false" | "off" | "0" => Some(false),
        _ => None,
    }
}
