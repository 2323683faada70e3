//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Device transport and connection factories."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use relay_ems_common::{ConnectionSettings, EmsError, Result};
use url::Url;

pub mod http;

pub use http::{HttpConnectionFactory, ReqwestConnection};

/// Content type the device answers its status and command requests with.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Raw response returned by a transport GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Unified interface for the transport used against one device.
#[async_trait]
pub trait HttpConnection: Send + Sync {
    /// Probe the endpoint and verify it answers with the expected content type.
    async fn test(&self, url: &Url, expected_content_type: &str) -> Result<()>;

    /// Issue a GET and return whatever the device answered.
    async fn get(&self, url: &Url) -> Result<HttpResponse>;

    /// Issue a GET and return the body, failing on non-success status codes.
    async fn get_as_string(&self, url: &Url) -> Result<String> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(EmsError::transport(
                url.as_str(),
                format!("unexpected status {}", response.status),
            ));
        }
        Ok(response.body)
    }
}

/// Builds a connection for a set of device settings.
pub trait ConnectionFactory: Send + Sync {
    fn create_connection(&self, settings: &ConnectionSettings) -> Result<Arc<dyn HttpConnection>>;
}

/// Returns true when `actual` names the same media type as `expected`, ignoring
/// parameters such as `charset`.
pub fn media_type_matches(actual: &str, expected: &str) -> bool {
    actual
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case(expected.trim()))
        .unwrap_or(false)
}
