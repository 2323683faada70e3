//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmsError>;

/// Failure taxonomy shared by discovery, transport and provider orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmsError {
    /// The URL template could not be substituted or did not yield a valid URL.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    /// The device answered with something that is not a JSON object.
    #[error("unable to parse device response: {0}")]
    Parse(String),
    /// Connection, timeout or HTTP-level failure.
    #[error("transport failure for {url}: {reason}")]
    Transport { url: String, reason: String },
    /// The provider has not completed its first run yet.
    #[error("provider '{0}' has not completed discovery")]
    Unconfigured(String),
}

impl EmsError {
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EmsError::MalformedRequest(_) => "malformed_request",
            EmsError::Parse(_) => "parse",
            EmsError::Transport { .. } => "transport",
            EmsError::Unconfigured(_) => "unconfigured",
        }
    }
}

impl From<serde_json::Error> for EmsError {
    fn from(err: serde_json::Error) -> Self {
        EmsError::Parse(err.to_string())
    }
}
