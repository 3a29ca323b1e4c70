//! Configuration errors.

use errors::{Classify, ErrorKind};
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {format} file {path}: {reason}")]
    Parse {
        format: &'static str,
        path: String,
        reason: String
    },

    #[error("Config file has no extension: {path}")]
    NoExtension { path: String },

    #[error("Unsupported config file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String
    },

    #[error("Configuration validation failed: {0}")]
    Validation(String)
}

impl Classify for ConfigError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidValue { .. } | Self::Validation(_) => ErrorKind::Validation,
            Self::FileNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Internal
        }
    }
}
