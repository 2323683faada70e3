//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-device discovery, polling and command dispatch."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use relay_ems_calc_engine::Variables;
use relay_ems_common::{ConnectionSettings, EmsError};
use relay_ems_core::DeviceProvider;
use relay_ems_discovery::RelayAction;
use relay_ems_metrics::{new_registry, prometheus::TextEncoder, ProviderMetrics};
use relay_ems_testharness::{fixtures, ScriptedConnection};
use serde_json::json;

fn provider_for(connection: &Arc<ScriptedConnection>) -> DeviceProvider {
    DeviceProvider::new(
        "plug",
        ConnectionSettings::new("plug.local"),
        connection.factory(),
    )
    .unwrap()
}

fn encoded_values(provider: &DeviceProvider) -> Vec<Vec<String>> {
    provider
        .available_commands()
        .iter()
        .map(|command| {
            command
                .options
                .iter()
                .map(|option| option.encoded_value.clone())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn two_relay_device_yields_ranked_commands() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider = provider_for(&connection);

    assert!(provider.first_run().await.unwrap());

    let power_fields: Vec<_> = provider
        .fields()
        .into_iter()
        .filter(|field| field.source_key.starts_with("StatusSTS_POWER"))
        .map(|field| field.name)
        .collect();
    assert_eq!(power_fields, vec!["StatusSTS_POWER1", "StatusSTS_POWER2"]);

    let commands = provider.available_commands();
    let ranks: Vec<u32> = commands.iter().map(|command| command.sort_rank).collect();
    assert_eq!(ranks, vec![2, 3]);
    assert!(commands.iter().all(|command| command.group_id == "Tasmota"));
    assert_eq!(
        encoded_values(&provider),
        vec![
            vec![
                "cmnd=Power2%20on".to_owned(),
                "cmnd=Power2%20off".to_owned(),
                "cmnd=Power2%20toggle".to_owned(),
            ],
            vec![
                "cmnd=Power3%20on".to_owned(),
                "cmnd=Power3%20off".to_owned(),
                "cmnd=Power3%20toggle".to_owned(),
            ],
        ]
    );

    let message = provider
        .test_connection(&ConnectionSettings::new("plug.local"))
        .await
        .unwrap();
    assert_eq!(
        message,
        "Connection successful: device 'Plug1', topic 'plug1'"
    );
}

#[tokio::test]
async fn single_relay_device_yields_one_unnumbered_command() {
    let connection = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    let provider = provider_for(&connection);
    provider.first_run().await.unwrap();

    let commands = provider.available_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].channel_number(), None);
    assert_eq!(commands[0].title_key, "relay.single");
    assert!(commands[0]
        .options
        .iter()
        .all(|option| option.encoded_value.starts_with("cmnd=Power%20")));
}

#[tokio::test]
async fn nested_document_discovers_single_relay() {
    let connection = ScriptedConnection::with_status(fixtures::ENERGY_PLUG);
    let provider = provider_for(&connection);
    provider.first_run().await.unwrap();

    assert_eq!(provider.available_commands().len(), 1);
    let names: Vec<String> = provider.fields().into_iter().map(|f| f.name).collect();
    assert!(names.contains(&"StatusSNS_ENERGY_Power".to_owned()));
    assert!(names.contains(&"Status_FriendlyName_0".to_owned()));
}

#[tokio::test]
async fn sensor_only_device_has_empty_catalog() {
    let connection = ScriptedConnection::with_status(fixtures::NO_RELAYS);
    let provider = provider_for(&connection);
    assert!(provider.first_run().await.unwrap());
    assert!(provider.is_discovered());
    assert!(provider.available_commands().is_empty());
}

#[tokio::test]
async fn toggle_on_channel_two_hits_the_device() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider = provider_for(&connection);
    provider.first_run().await.unwrap();

    provider.send(Some(2), RelayAction::Toggle).await.unwrap();
    assert_eq!(
        connection.command_requests(),
        vec!["http://plug.local/cm?cmnd=Power2%20toggle".to_owned()]
    );
}

#[tokio::test]
async fn unknown_channel_is_rejected_without_a_request() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider = provider_for(&connection);
    provider.first_run().await.unwrap();

    let err = provider.send(Some(7), RelayAction::On).await.unwrap_err();
    assert!(matches!(err, EmsError::MalformedRequest(_)));
    assert!(connection.command_requests().is_empty());
}

#[tokio::test]
async fn values_outside_the_catalog_are_still_dispatched() {
    let connection = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    let provider = provider_for(&connection);

    provider.send_command("cmnd=Power5%20on").await.unwrap();
    assert_eq!(
        connection.command_requests(),
        vec!["http://plug.local/cm?cmnd=Power5%20on".to_owned()]
    );
}

#[tokio::test]
async fn dispatch_fails_only_on_transport_errors() {
    let connection = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    let provider = provider_for(&connection);
    provider.first_run().await.unwrap();

    connection.set_offline(true);
    let err = provider.send(None, RelayAction::Off).await.unwrap_err();
    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn failed_first_run_leaves_no_state_and_retries() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    connection.set_offline(true);
    let provider = provider_for(&connection);

    assert!(provider.first_run().await.is_err());
    assert!(!provider.is_discovered());
    assert!(provider.available_commands().is_empty());

    connection.set_offline(false);
    connection.set_status_body("[1, 2, 3]");
    let err = provider.first_run().await.unwrap_err();
    assert!(matches!(err, EmsError::Parse(_)));
    assert!(provider.fields().is_empty());

    connection.set_status_body(fixtures::TWO_RELAYS_FLAT);
    assert!(provider.first_run().await.unwrap());
    assert_eq!(provider.available_commands().len(), 2);
}

#[tokio::test]
async fn first_run_happens_once() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider = provider_for(&connection);
    assert!(provider.first_run().await.unwrap());
    let first = provider.state().unwrap();

    connection.set_status_body(fixtures::SINGLE_RELAY);
    assert!(!provider.first_run().await.unwrap());
    assert!(Arc::ptr_eq(&first, &provider.state().unwrap()));
    assert_eq!(connection.requests().len(), 1);
}

#[tokio::test]
async fn overlapping_first_runs_publish_once() {
    let registry = new_registry();
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    connection.set_latency(Duration::from_millis(50));
    let provider =
        provider_for(&connection).with_metrics(ProviderMetrics::new(registry.clone()).unwrap());

    let (first, second) = tokio::join!(provider.first_run(), provider.first_run());
    let published = [first.unwrap(), second.unwrap()];
    assert_eq!(published.iter().filter(|won| **won).count(), 1);
    assert_eq!(connection.requests().len(), 2);

    let state = provider.state().unwrap();
    assert!(!provider.first_run().await.unwrap());
    assert!(Arc::ptr_eq(&state, &provider.state().unwrap()));

    let encoded = TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    assert!(encoded.contains(r#"relay_ems_first_run_total{device="plug",outcome="ok"} 1"#));
}

#[tokio::test]
async fn poll_requires_discovery() {
    let connection = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    let provider = provider_for(&connection);
    let mut variables = Variables::new();
    let err = provider.poll(&mut variables).await.unwrap_err();
    assert_eq!(err, EmsError::Unconfigured("plug".into()));
    assert!(connection.requests().is_empty());
}

#[tokio::test]
async fn poll_uses_cached_fields_only() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider = provider_for(&connection);
    provider.first_run().await.unwrap();

    connection.set_status_body(
        r#"{"Status_DeviceName":"Plug1","Status_Topic":"plug1","StatusSTS_POWER1":"OFF","StatusSTS_POWER2":"ON","StatusSTS_POWER3":"ON"}"#,
    );
    let mut variables = Variables::new();
    let summary = provider.poll(&mut variables).await.unwrap();
    assert_eq!(summary.written, 4);
    assert_eq!(variables["StatusSTS_POWER1"], json!("OFF"));
    assert!(!variables.contains_key("StatusSTS_POWER3"));
    assert_eq!(provider.available_commands().len(), 2);
}

#[tokio::test]
async fn failed_poll_keeps_cached_state() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider = provider_for(&connection);
    provider.first_run().await.unwrap();
    let before = provider.state().unwrap();

    connection.set_status_body("not json");
    let mut variables = Variables::new();
    assert!(provider.poll(&mut variables).await.is_err());
    assert!(variables.is_empty());
    assert_eq!(*before, *provider.state().unwrap());
}

#[tokio::test]
async fn run_cycle_discovers_then_polls() {
    let connection = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    let provider = provider_for(&connection);
    let variables = provider.run_cycle().await.unwrap();
    assert_eq!(variables["StatusSTS_POWER"], json!("ON"));
    assert_eq!(connection.requests().len(), 2);
}

#[tokio::test]
async fn connectivity_test_tolerates_missing_identity() {
    let connection = ScriptedConnection::with_status(fixtures::SINGLE_RELAY);
    let provider = provider_for(&connection);
    let message = provider
        .test_connection(&ConnectionSettings::new("other.local"))
        .await
        .unwrap();
    assert_eq!(message, "Connection successful: device '', topic ''");
    assert_eq!(
        connection.requests(),
        vec!["http://other.local/cm?cmnd=Status0".to_owned()]
    );
}

#[tokio::test]
async fn connectivity_test_propagates_failures() {
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider = provider_for(&connection);

    connection.set_content_type("text/html");
    let err = provider
        .test_connection(&ConnectionSettings::new("plug.local"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transport");

    let err = provider
        .test_connection(&ConnectionSettings::new("bad host"))
        .await
        .unwrap_err();
    assert!(matches!(err, EmsError::MalformedRequest(_)));
}

#[tokio::test]
async fn outcomes_are_counted_per_device() {
    let registry = new_registry();
    let connection = ScriptedConnection::with_status(fixtures::TWO_RELAYS_FLAT);
    let provider =
        provider_for(&connection).with_metrics(ProviderMetrics::new(registry.clone()).unwrap());

    let mut variables = Variables::new();
    let _ = provider.poll(&mut variables).await;
    provider.first_run().await.unwrap();
    provider.poll(&mut variables).await.unwrap();
    provider.send(Some(2), RelayAction::On).await.unwrap();

    let encoded = TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    assert!(encoded.contains(r#"relay_ems_poll_cycles_total{device="plug",outcome="unconfigured"} 1"#));
    assert!(encoded.contains(r#"relay_ems_poll_cycles_total{device="plug",outcome="ok"} 1"#));
    assert!(encoded.contains(r#"relay_ems_first_run_total{device="plug",outcome="ok"} 1"#));
    assert!(encoded.contains(r#"relay_ems_commands_sent_total{device="plug",outcome="ok"} 1"#));
    assert!(encoded.contains(r#"relay_ems_catalog_commands{device="plug"} 2"#));
}
