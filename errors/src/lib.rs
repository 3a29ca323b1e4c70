//! # Field Engineer Errors
//!
//! Error taxonomy shared across the Field Engineer backend.
//!
//! Every crate keeps its own `thiserror` enum close to the code that raises
//! it, and classifies each variant into an [`ErrorKind`] through the
//! [`Classify`] trait. The HTTP layer maps kinds to status codes; nothing
//! below it needs to know about HTTP.

use serde::Serialize;
use thiserror::Error;

/// Client-visible error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// An identifier did not parse as a GUID.
    InvalidIdentifier,
    /// A required field is missing, empty or malformed.
    Validation,
    NotFound,
    /// Duplicate key on create.
    Conflict,
    /// The caller's version token is stale.
    ConcurrencyConflict,
    /// Credential missing.
    Unauthorized,
    /// Credential present but insufficient.
    Forbidden,
    /// Database or remote store unreachable.
    UpstreamUnavailable,
    Canceled,
    Timeout,
    Internal
}

impl ErrorKind {
    /// Stable machine-readable code used in response bodies.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::Canceled => "CANCELED",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR"
        }
    }

    /// Generic message safe to return when detailed errors are disabled.
    pub fn public_message(self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "The identifier is not a valid GUID",
            Self::Validation => "The request payload is invalid",
            Self::NotFound => "The requested resource was not found",
            Self::Conflict => "The resource already exists",
            Self::ConcurrencyConflict => "The resource was modified by another request",
            Self::Unauthorized => "Missing credentials",
            Self::Forbidden => "Insufficient credentials",
            Self::UpstreamUnavailable => "A backing service is unavailable",
            Self::Canceled => "The request was canceled",
            Self::Timeout => "The operation timed out",
            Self::Internal => "An internal error occurred"
        }
    }
}

/// Implemented by every error type that can reach a request boundary.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Identifier parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Invalid security identifier '{value}': {reason}")]
    InvalidSid { value: String, reason: String }
}

impl Classify for IdentityError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidIdentifier
    }
}

/// A single field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into()
        }
    }

    /// Shorthand for the most common failure: a required field left empty.
    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "must not be empty")
    }
}

impl Classify for ValidationError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
