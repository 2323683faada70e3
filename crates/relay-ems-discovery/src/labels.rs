//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Discovery of telemetry fields and relay commands from device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! English texts for catalog title and label keys.

use crate::capability::{TITLE_MULTI_RELAY, TITLE_SINGLE_RELAY};
use crate::catalog::{Command, SubAction};

/// Resolve a key, returning the key itself when no text is known.
pub fn text(key: &str) -> &str {
    match key {
        TITLE_SINGLE_RELAY => "Relay",
        TITLE_MULTI_RELAY => "Relay {0}",
        "option.on" => "On",
        "option.off" => "Off",
        "option.toggle" => "Toggle",
        other => other,
    }
}

/// Display title of a command, with the channel number filled in.
pub fn command_title(command: &Command) -> String {
    let template = text(&command.title_key);
    match command.channel_number() {
        Some(number) => template.replace("{0}", &number.to_string()),
        None => template.replace(" {0}", ""),
    }
}

pub fn option_label(option: &SubAction) -> &str {
    text(&option.label_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ControlActionDescriptor;
    use crate::catalog::{synthesize, GROUP_ID};

    #[test]
    fn titles_include_channel_numbers() {
        let catalog = synthesize(
            GROUP_ID,
            &[
                ControlActionDescriptor::single(),
                ControlActionDescriptor::channel(1),
            ],
        );
        assert_eq!(command_title(&catalog[0]), "Relay");
        assert_eq!(command_title(&catalog[1]), "Relay 2");
        assert_eq!(option_label(&catalog[1].options[2]), "Toggle");
        assert_eq!(text("unknown.key"), "unknown.key");
    }
}
