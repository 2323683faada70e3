//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Scripted device transport and shared fixtures."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! `Status0` documents as answered by real devices.

/// Two numbered relays, already flat.
pub const TWO_RELAYS_FLAT: &str = r#"{"Status_DeviceName":"Plug1","Status_Topic":"plug1","StatusSTS_POWER1":"ON","StatusSTS_POWER2":"OFF"}"#;

/// One unnumbered relay.
pub const SINGLE_RELAY: &str = r#"{"StatusSTS_POWER":"ON"}"#;

/// Sensor-only device without relays.
pub const NO_RELAYS: &str = r#"{"Status":{"DeviceName":"Meter","Topic":"meter"},"StatusSNS":{"ENERGY":{"Power":118,"Voltage":229.4}}}"#;

/// Full nested document of an energy-monitoring plug.
pub const ENERGY_PLUG: &str = r#"{
  "Status": {
    "Module": 49,
    "DeviceName": "Kitchen",
    "FriendlyName": ["Kitchen"],
    "Topic": "kitchen_plug",
    "Power": 1,
    "PowerOnState": 3
  },
  "StatusNET": {
    "Hostname": "kitchen-plug",
    "IPAddress": "192.168.1.40",
    "Webserver": 2
  },
  "StatusSTS": {
    "Time": "2024-05-01T12:00:00",
    "Uptime": "3T04:05:06",
    "Heap": 25,
    "POWER": "ON",
    "Wifi": {"AP": 1, "SSId": "home", "RSSI": 76}
  },
  "StatusSNS": {
    "Time": "2024-05-01T12:00:00",
    "ENERGY": {
      "Total": 123.456,
      "Yesterday": 1.2,
      "Today": 0.35,
      "Power": 42,
      "Voltage": 230,
      "Current": 0.182
    }
  }
}"#;
