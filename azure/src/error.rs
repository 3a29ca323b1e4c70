use errors::{Classify, ErrorKind};
use thiserror::Error;

pub type AzureResult<T> = Result<T, AzureError>;

#[derive(Debug, Error)]
pub enum AzureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider cannot run in this environment; a chain moves on.
    #[error("{provider} credential unavailable: {reason}")]
    CredentialUnavailable { provider: String, reason: String },

    /// The provider ran and the identity platform rejected it.
    #[error("{provider} authentication failed: {message}")]
    Authentication { provider: String, message: String },

    #[error("No credential could provide a token: {}", .0.join("; "))]
    NoCredential(Vec<String>),

    #[error("Invalid configuration key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Service error: {status} - {message}")]
    Service { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error)
}

impl Classify for AzureError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Http(_)
            | Self::CredentialUnavailable { .. }
            | Self::Authentication { .. }
            | Self::NoCredential(_) => ErrorKind::UpstreamUnavailable,
            Self::InvalidKey { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Service { status, .. } => match *status {
                400 => ErrorKind::Validation,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                412 => ErrorKind::ConcurrencyConflict,
                429 | 500..=599 => ErrorKind::UpstreamUnavailable,
                _ => ErrorKind::Internal
            },
            Self::InvalidUrl { .. } | Self::Configuration(_) | Self::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl AzureError {
    pub(crate) fn unavailable(provider: &str, reason: impl Into<String>) -> Self {
        Self::CredentialUnavailable {
            provider: provider.to_string(),
            reason: reason.into()
        }
    }

    pub(crate) fn authentication(provider: &str, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.to_string(),
            message: message.into()
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::CredentialUnavailable { .. })
    }
}
