//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder name substituted with the device host.
pub const PROVIDER_HOST: &str = "provider_host";
/// Placeholder name substituted with the device port.
pub const PROVIDER_PORT: &str = "provider_port";
/// Placeholder name substituted with the optional user.
pub const OPTIONAL_USER: &str = "optional_user";
/// Placeholder name substituted with the optional password.
pub const OPTIONAL_PASSWORD: &str = "optional_password";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 80;

/// Connection settings for one device. Consumed read-only by URL building and
/// by the transport when it attaches credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: None,
            password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// User name, ignoring blank values.
    pub fn user(&self) -> Option<&str> {
        non_blank(self.user.as_deref())
    }

    /// Password, ignoring blank values.
    pub fn password(&self) -> Option<&str> {
        non_blank(self.password.as_deref())
    }

    /// Values available to `{name}` placeholders in request templates.
    pub fn placeholder_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert(PROVIDER_HOST.to_owned(), self.host.trim().to_owned());
        values.insert(PROVIDER_PORT.to_owned(), self.port.to_string());
        if let Some(user) = self.user() {
            values.insert(OPTIONAL_USER.to_owned(), user.to_owned());
        }
        if let Some(password) = self.password() {
            values.insert(OPTIONAL_PASSWORD.to_owned(), password.to_owned());
        }
        values
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
