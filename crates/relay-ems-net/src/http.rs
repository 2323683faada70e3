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
use std::time::Duration;

use async_trait::async_trait;
use relay_ems_common::{ConnectionSettings, EmsError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::{media_type_matches, ConnectionFactory, HttpConnection, HttpResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `reqwest` backed transport. Attaches basic auth when the settings carry a user.
#[derive(Debug, Clone)]
pub struct ReqwestConnection {
    client: Client,
    user: Option<String>,
    password: Option<String>,
}

impl ReqwestConnection {
    pub fn new(settings: &ConnectionSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EmsError::transport(settings.host.as_str(), err))?;
        Ok(Self {
            client,
            user: settings.user().map(str::to_owned),
            password: settings.password().map(str::to_owned),
        })
    }

    fn request(&self, url: &Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url.clone());
        match &self.user {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }
}

#[async_trait]
impl HttpConnection for ReqwestConnection {
    async fn test(&self, url: &Url, expected_content_type: &str) -> Result<()> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(EmsError::transport(
                url.as_str(),
                format!("unexpected status {}", response.status),
            ));
        }
        match response.content_type.as_deref() {
            Some(actual) if media_type_matches(actual, expected_content_type) => Ok(()),
            other => Err(EmsError::transport(
                url.as_str(),
                format!(
                    "expected content type {}, got {}",
                    expected_content_type,
                    other.unwrap_or("none")
                ),
            )),
        }
    }

    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        debug!(url = %url, "issuing GET");
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|err| EmsError::transport(url.as_str(), err))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|err| EmsError::transport(url.as_str(), err))?;
        debug!(url = %url, status, bytes = body.len(), "received response");
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Default factory producing [`ReqwestConnection`]s with a fixed request timeout.
#[derive(Debug, Clone)]
pub struct HttpConnectionFactory {
    timeout: Duration,
}

impl HttpConnectionFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpConnectionFactory {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    fn create_connection(&self, settings: &ConnectionSettings) -> Result<Arc<dyn HttpConnection>> {
        Ok(Arc::new(ReqwestConnection::new(settings, self.timeout)?))
    }
}
