//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Scripted device transport and shared fixtures."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Test doubles for the device transport.
//!
//! [`ScriptedConnection`] answers `Status0` requests with a scripted document,
//! acknowledges every other command, and records each URL it was asked for so
//! tests can assert on the exact wire format.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_ems_common::{ConnectionSettings, EmsError, Result};
use relay_ems_net::{
    media_type_matches, ConnectionFactory, HttpConnection, HttpResponse, CONTENT_TYPE_JSON,
};
use tracing::debug;
use url::Url;

pub mod fixtures;

#[derive(Debug, Default)]
struct Script {
    status_body: Option<String>,
    content_type: Option<String>,
    offline: bool,
    latency: Duration,
    requests: Vec<String>,
}

/// In-memory device endpoint.
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    script: Mutex<Script>,
}

impl ScriptedConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Device answering `Status0` with `body`.
    pub fn with_status(body: impl Into<String>) -> Arc<Self> {
        let connection = Self::new();
        connection.set_status_body(body);
        connection
    }

    pub fn set_status_body(&self, body: impl Into<String>) {
        self.script.lock().status_body = Some(body.into());
    }

    /// Content type reported to connectivity tests. Defaults to JSON.
    pub fn set_content_type(&self, content_type: impl Into<String>) {
        self.script.lock().content_type = Some(content_type.into());
    }

    /// While offline every request fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.script.lock().offline = offline;
    }

    /// Delay applied to every GET after it is recorded.
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = latency;
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.script.lock().requests.clone()
    }

    /// Requested URLs that were not status polls.
    pub fn command_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| !is_status_request(url))
            .collect()
    }

    /// A factory handing out this connection for any settings.
    pub fn factory(self: &Arc<Self>) -> Arc<ScriptedFactory> {
        Arc::new(ScriptedFactory {
            connection: self.clone(),
            created: Mutex::new(Vec::new()),
        })
    }
}

fn is_status_request(url: &str) -> bool {
    url.ends_with("cmnd=Status0")
}

#[async_trait]
impl HttpConnection for ScriptedConnection {
    async fn test(&self, url: &Url, expected_content_type: &str) -> Result<()> {
        let script = self.script.lock();
        if script.offline {
            return Err(EmsError::transport(url.as_str(), "device offline"));
        }
        let actual = script.content_type.as_deref().unwrap_or(CONTENT_TYPE_JSON);
        if !media_type_matches(actual, expected_content_type) {
            return Err(EmsError::transport(
                url.as_str(),
                format!("expected content type {}, got {}", expected_content_type, actual),
            ));
        }
        Ok(())
    }

    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        let latency = {
            let mut script = self.script.lock();
            script.requests.push(url.to_string());
            script.latency
        };
        debug!(url = %url, latency_ms = latency.as_millis() as u64, "scripted GET");
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let script = self.script.lock();
        if script.offline {
            return Err(EmsError::transport(url.as_str(), "device offline"));
        }
        if is_status_request(url.as_str()) {
            return match &script.status_body {
                Some(body) => Ok(HttpResponse {
                    status: 200,
                    content_type: Some(CONTENT_TYPE_JSON.to_owned()),
                    body: body.clone(),
                }),
                None => Ok(HttpResponse {
                    status: 404,
                    content_type: None,
                    body: String::new(),
                }),
            };
        }
        Ok(HttpResponse {
            status: 200,
            content_type: Some(CONTENT_TYPE_JSON.to_owned()),
            body: format!(r#"{{"Command":"{}"}}"#, url.query().unwrap_or_default()),
        })
    }
}

/// Factory returning one shared [`ScriptedConnection`] and remembering the
/// settings it was asked to connect with.
#[derive(Debug)]
pub struct ScriptedFactory {
    connection: Arc<ScriptedConnection>,
    created: Mutex<Vec<ConnectionSettings>>,
}

impl ScriptedFactory {
    pub fn created(&self) -> Vec<ConnectionSettings> {
        self.created.lock().clone()
    }
}

impl ConnectionFactory for ScriptedFactory {
    fn create_connection(&self, settings: &ConnectionSettings) -> Result<Arc<dyn HttpConnection>> {
        self.created.lock().push(settings.clone());
        Ok(self.connection.clone())
    }
}
