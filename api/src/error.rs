//! Error types for the HTTP surface.
//!
//! Lower crates classify their errors into [`ErrorKind`]; this module is the
//! only place that turns a kind into a status code.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response}
};
use azure::AzureError;
use config::ConfigError;
use errors::{Classify, ErrorKind, ValidationError};
use serde::Serialize;
use std::time::Duration;
use storage::StoreError;
use thiserror::Error;

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Azure(#[from] AzureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Missing admin key")]
    Unauthorized,

    #[error("Invalid admin key")]
    Forbidden,

    /// A collaborator the endpoint needs was not configured at startup.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server error: {0}")]
    Server(String)
}

impl Classify for ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => e.kind(),
            Self::Azure(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::Validation(e) => e.kind(),
            Self::InvalidBody(_) => ErrorKind::Validation,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::NotConfigured(_) => ErrorKind::UpstreamUnavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Server(_) => ErrorKind::Internal
        }
    }
}

/// Status code for an error category.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidIdentifier | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ConcurrencyConflict => StatusCode::PRECONDITION_FAILED,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        // Client closed request.
        ErrorKind::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Error response body for HTTP endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: kind.code().to_string(),
                message: message.into()
            }
        }
    }
}

impl ApiError {
    /// Taxonomy response. Server-side failures always get the generic
    /// message; client errors carry their detail unless `detailed` is off.
    fn taxonomy_response(self, detailed: bool) -> Response {
        let kind = self.kind();

        if let Self::Store(StoreError::ConcurrencyConflict { current, .. }) = self {
            return precondition_failed(*current);
        }

        let server_side = matches!(
            kind,
            ErrorKind::Internal | ErrorKind::UpstreamUnavailable | ErrorKind::Timeout
        );
        let message = if server_side || !detailed {
            if server_side {
                tracing::error!(error = %self, code = kind.code(), "Request failed");
            } else {
                tracing::warn!(error = %self, code = kind.code(), "Request rejected");
            }
            kind.public_message().to_string()
        } else {
            self.to_string()
        };

        (status_for(kind), Json(ErrorResponse::new(kind, message))).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.taxonomy_response(true)
    }
}

/// 412 carrying the stored entity, so the client can merge and retry.
fn precondition_failed(current: serde_json::Value) -> Response {
    let etag = current
        .get("version")
        .and_then(serde_json::Value::as_str)
        .and_then(|version| HeaderValue::from_str(&format!("\"{version}\"")).ok());

    let mut response = (StatusCode::PRECONDITION_FAILED, Json(current)).into_response();
    if let Some(etag) = etag {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}

/// Failure of an administrative endpoint.
///
/// With detailed errors on, anything past authentication is a 400 whose
/// text body is the underlying message. Otherwise the taxonomy applies with
/// generic messages only.
#[derive(Debug)]
pub struct AdminError {
    error: ApiError,
    detailed: bool
}

impl AdminError {
    pub fn new(error: impl Into<ApiError>, detailed: bool) -> Self {
        Self {
            error: error.into(),
            detailed
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self.error.kind() {
            ErrorKind::Unauthorized | ErrorKind::Forbidden => self.error.into_response(),
            _ if self.detailed => {
                tracing::warn!(error = %self.error, "Admin request failed");
                (StatusCode::BAD_REQUEST, self.error.to_string()).into_response()
            }
            _ => self.error.taxonomy_response(false)
        }
    }
}
