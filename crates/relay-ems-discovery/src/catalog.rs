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
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::ControlActionDescriptor;

/// Group every synthesized command is filed under.
pub const GROUP_ID: &str = "Tasmota";

/// Separator between the command keyword and its argument (`%20`).
const ENCODED_SPACE: &str = "%20";

/// Concrete relay operation offered by every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayAction {
    On,
    Off,
    Toggle,
}

impl RelayAction {
    /// Canonical option order.
    pub const ALL: [RelayAction; 3] = [RelayAction::On, RelayAction::Off, RelayAction::Toggle];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelayAction::On => "on",
            RelayAction::Off => "off",
            RelayAction::Toggle => "toggle",
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            RelayAction::On => "option.on",
            RelayAction::Off => "option.off",
            RelayAction::Toggle => "option.toggle",
        }
    }
}

impl fmt::Display for RelayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(RelayAction::On),
            "off" => Ok(RelayAction::Off),
            "toggle" => Ok(RelayAction::Toggle),
            other => Err(format!("unknown relay action: {}", other)),
        }
    }
}

/// One selectable variant of a command. `encoded_value` is sent verbatim as the
/// query string of the command request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubAction {
    pub encoded_value: String,
    pub label_key: String,
}

/// User-invocable relay command with its on/off/toggle variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    pub group_id: String,
    pub title_key: String,
    pub options: Vec<SubAction>,
    pub sort_rank: u32,
}

impl Command {
    /// Payload channel number, `None` for the unnumbered relay.
    pub fn channel_number(&self) -> Option<u32> {
        (self.sort_rank > 0).then_some(self.sort_rank)
    }

    /// Variant matching `action`.
    pub fn option(&self, action: RelayAction) -> Option<&SubAction> {
        self.options
            .iter()
            .find(|option| option.label_key == action.label_key())
    }

    /// Whether `encoded_value` belongs to one of this command's variants.
    pub fn offers(&self, encoded_value: &str) -> bool {
        self.options
            .iter()
            .any(|option| option.encoded_value == encoded_value)
    }
}

impl Ord for Command {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_rank
            .cmp(&other.sort_rank)
            .then_with(|| self.group_id.cmp(&other.group_id))
            .then_with(|| self.title_key.cmp(&other.title_key))
            .then_with(|| self.options.cmp(&other.options))
    }
}

impl PartialOrd for Command {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Payload shared by a descriptor's variants: `cmnd=Power`, the channel number
/// when present, then an encoded space.
pub fn payload_prefix(descriptor: &ControlActionDescriptor) -> String {
    let mut prefix = format!("cmnd={}", descriptor.base_keyword);
    if let Some(number) = descriptor.channel_number() {
        prefix.push_str(&number.to_string());
    }
    prefix.push_str(ENCODED_SPACE);
    prefix
}

fn command_for(group_id: &str, descriptor: &ControlActionDescriptor) -> Command {
    let prefix = payload_prefix(descriptor);
    let options = RelayAction::ALL
        .iter()
        .map(|action| SubAction {
            encoded_value: format!("{}{}", prefix, action.as_str()),
            label_key: action.label_key().to_owned(),
        })
        .collect();
    Command {
        group_id: group_id.to_owned(),
        title_key: descriptor.title_key.clone(),
        options,
        sort_rank: descriptor.sort_rank(),
    }
}

/// Build the command catalog for `descriptors`: one command per distinct
/// descriptor, ordered by channel.
pub fn synthesize<'a, I>(group_id: &str, descriptors: I) -> Vec<Command>
where
    I: IntoIterator<Item = &'a ControlActionDescriptor>,
{
    let unique: HashSet<Command> = descriptors
        .into_iter()
        .map(|descriptor| command_for(group_id, descriptor))
        .collect();
    let mut catalog: Vec<Command> = unique.into_iter().collect();
    catalog.sort();
    catalog
}
