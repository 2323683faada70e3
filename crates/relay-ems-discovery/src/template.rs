//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Discovery of telemetry fields and relay commands from device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use relay_ems_common::{EmsError, Result};
use url::Url;

/// Matches `{name}` placeholders.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid placeholder regex"));

/// Substitute every `{name}` in `template` with `values[name]` and parse the result
/// as an absolute URL.
///
/// Every placeholder must have a value; the result must carry a host.
pub fn build_url(template: &str, values: &BTreeMap<String, String>) -> Result<Url> {
    let missing: BTreeSet<&str> = PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .filter(|name| !values.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(EmsError::MalformedRequest(format!(
            "no value for placeholder(s) {} in '{}'",
            missing.into_iter().collect::<Vec<_>>().join(", "),
            template
        )));
    }

    let substituted = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    });

    let url = Url::parse(&substituted).map_err(|err| {
        EmsError::MalformedRequest(format!("'{}' is not a valid URL: {}", substituted, err))
    })?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(EmsError::MalformedRequest(format!(
            "'{}' does not name a host",
            substituted
        ))),
    }
}
