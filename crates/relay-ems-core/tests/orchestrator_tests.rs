//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::Path;
use std::time::Duration;

use relay_ems_common::{AppConfig, DeviceConfig, StateConfig};
use relay_ems_core::{RelayOrchestrator, StateStore};
use relay_ems_metrics::new_registry;
use relay_ems_testharness::{fixtures, ScriptedConnection};
use serde_json::json;
use tempfile::tempdir;

fn config_with_state(state_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.devices.insert(
        "plug".into(),
        DeviceConfig {
            host: "plug.local".into(),
            poll_interval: Duration::from_millis(20),
            ..DeviceConfig::default()
        },
    );
    config.state = StateConfig {
        directory: state_dir.to_path_buf(),
    };
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn devices_are_discovered_polled_and_persisted() {
    let temp = tempdir().expect("tempdir");
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let orchestrator = RelayOrchestrator::new(config_with_state(temp.path()), Some(new_registry()))
        .with_connection_factory(connection.factory());
    let handle = orchestrator.start().await.unwrap();

    let mut variables = handle.variables("plug").unwrap();
    tokio::time::timeout(Duration::from_secs(5), variables.changed())
        .await
        .expect("poll within timeout")
        .unwrap();
    assert_eq!(variables.borrow()["StatusSTS_POWER2"], json!("OFF"));

    let provider = handle.provider("plug").unwrap();
    assert_eq!(provider.available_commands().len(), 2);
    assert_eq!(handle.device_ids().collect::<Vec<_>>(), vec!["plug"]);
    handle.shutdown().await.unwrap();

    let store = StateStore::new(temp.path()).unwrap();
    let persisted = store.load("plug").expect("state persisted after first run");
    assert_eq!(persisted.commands, provider.available_commands());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_reuses_persisted_catalog() {
    let temp = tempdir().expect("tempdir");

    let first = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let handle = RelayOrchestrator::new(config_with_state(temp.path()), None)
        .with_connection_factory(first.factory())
        .start()
        .await
        .unwrap();
    let mut variables = handle.variables("plug").unwrap();
    tokio::time::timeout(Duration::from_secs(5), variables.changed())
        .await
        .expect("poll within timeout")
        .unwrap();
    handle.shutdown().await.unwrap();

    // The device now reports a single relay, but discovery must not rerun.
    let second = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    let handle = RelayOrchestrator::new(config_with_state(temp.path()), None)
        .with_connection_factory(second.factory())
        .start()
        .await
        .unwrap();
    let provider = handle.provider("plug").unwrap();
    assert!(provider.is_discovered());
    assert_eq!(provider.available_commands().len(), 2);
    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_device_stays_undiscovered() {
    let temp = tempdir().expect("tempdir");
    let connection = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    connection.set_offline(true);
    let handle = RelayOrchestrator::new(config_with_state(temp.path()), None)
        .with_connection_factory(connection.factory())
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let provider = handle.provider("plug").unwrap();
    assert!(!provider.is_discovered());
    assert!(connection.requests().len() >= 2);
    handle.shutdown().await.unwrap();

    assert!(StateStore::new(temp.path()).unwrap().load("plug").is_none());
}
