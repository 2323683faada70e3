//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed variable calculation from flattened device snapshots."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use relay_ems_calc_engine::{FieldCalculator, MapCalculator, Variables};
use relay_ems_discovery::{discover, flatten_to_map, Field};
use serde_json::json;

const FIRST: &str = r#"{
    "Status": {"DeviceName": "Plug1", "Topic": "plug1"},
    "StatusSTS": {"POWER": "ON", "Uptime": "0T01:00:00"},
    "StatusSNS": {"ENERGY": {"Power": 42, "Voltage": 230.1, "Today": 0.35}}
}"#;

const SECOND: &str = r#"{
    "Status": {"DeviceName": "Plug1", "Topic": "plug1"},
    "StatusSTS": {"POWER": "OFF", "Uptime": "0T01:01:00", "Heap": 25},
    "StatusSNS": {"ENERGY": {"Power": 0, "Voltage": 229.8}}
}"#;

#[test]
fn discovered_fields_drive_later_snapshots() {
    let fields: Vec<Field> = discover(FIRST, "cmd").unwrap().into_iter().collect();
    let calculator = MapCalculator::new();

    let mut variables = Variables::new();
    let summary = calculator.apply(&flatten_to_map(FIRST).unwrap(), &fields, &mut variables);
    assert_eq!(summary.written, fields.len());
    assert_eq!(variables["StatusSNS_ENERGY_Power"], json!(42));
    assert_eq!(variables["StatusSTS_POWER"], json!("ON"));

    let mut variables = Variables::new();
    let summary = calculator.apply(&flatten_to_map(SECOND).unwrap(), &fields, &mut variables);
    // `Today` vanished and `Heap` is new; only known fields are written.
    assert_eq!(summary.missing, 1);
    assert!(!variables.contains_key("StatusSTS_Heap"));
    assert_eq!(variables["StatusSTS_POWER"], json!("OFF"));
    assert_eq!(variables["StatusSNS_ENERGY_Voltage"], json!(229.8));
}
