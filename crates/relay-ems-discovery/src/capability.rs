//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Discovery of telemetry fields and relay commands from device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::field::Field;

/// Command keyword shared by every relay channel.
pub const POWER_KEYWORD: &str = "Power";
/// Title key of a device with one unnumbered relay.
pub const TITLE_SINGLE_RELAY: &str = "relay.single";
/// Title key of one numbered relay channel.
pub const TITLE_MULTI_RELAY: &str = "relay.multi";

/// Power state keys in the flattened `Status0` document: `StatusSTS_POWER`,
/// `StatusSTS_POWER1`, ...
static POWER_STATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^StatusSTS_POWER(\d*)$").expect("valid power state regex"));

/// A controllable relay channel inferred from a power state key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlActionDescriptor {
    pub base_keyword: String,
    /// Zero based index taken from the key suffix, `None` for an unnumbered relay.
    pub channel_index: Option<u32>,
    pub title_key: String,
}

impl ControlActionDescriptor {
    pub fn single() -> Self {
        Self {
            base_keyword: POWER_KEYWORD.to_owned(),
            channel_index: None,
            title_key: TITLE_SINGLE_RELAY.to_owned(),
        }
    }

    pub fn channel(index: u32) -> Self {
        Self {
            base_keyword: POWER_KEYWORD.to_owned(),
            channel_index: Some(index),
            title_key: TITLE_MULTI_RELAY.to_owned(),
        }
    }

    /// Channel number used in the command payload (`index + 1`).
    pub fn channel_number(&self) -> Option<u32> {
        self.channel_index.map(|index| index + 1)
    }

    /// Position in the catalog; unnumbered relays sort first.
    pub fn sort_rank(&self) -> u32 {
        self.channel_number().unwrap_or(0)
    }
}

/// Recognise a power state key and describe the channel it controls.
///
/// A suffix that does not fit a channel index falls back to the unnumbered relay.
pub fn descriptor_for_key(key: &str) -> Option<ControlActionDescriptor> {
    let caps = POWER_STATE.captures(key)?;
    let suffix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    if suffix.is_empty() {
        return Some(ControlActionDescriptor::single());
    }
    match suffix
        .parse::<u32>()
        .ok()
        .filter(|index| index.checked_add(1).is_some())
    {
        Some(index) => Some(ControlActionDescriptor::channel(index)),
        None => {
            warn!(key, suffix, "channel suffix out of range, treating as single relay");
            Some(ControlActionDescriptor::single())
        }
    }
}

/// Collect one descriptor per distinct channel found among `fields`.
pub fn infer<'a, I>(fields: I) -> BTreeSet<ControlActionDescriptor>
where
    I: IntoIterator<Item = &'a Field>,
{
    fields
        .into_iter()
        .filter_map(|field| descriptor_for_key(&field.source_key))
        .collect()
}
