use errors::{Classify, ErrorKind, IdentityError, ValidationError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

const INSUFFICIENT_PRIVILEGE: &str = "42501";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' already exists")]
    Conflict { entity: &'static str, id: String },

    #[error("{entity} '{id}' is still referenced by other records")]
    InUse { entity: &'static str, id: String },

    /// The caller's version is stale; `current` is the stored record.
    #[error("{entity} '{id}' was modified by another request")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        current: Box<serde_json::Value>
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error)
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into()
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Database(sqlx::Error::Database(db)) if db.is_unique_violation())
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, Self::Database(sqlx::Error::Database(db)) if db.is_foreign_key_violation())
    }
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } | Self::InUse { .. } => ErrorKind::Conflict,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::Validation(e) => e.kind(),
            Self::Identity(e) => e.kind(),
            Self::Serialization(_) => ErrorKind::Internal,
            Self::Database(e) => classify_sqlx(e)
        }
    }
}

fn classify_sqlx(error: &sqlx::Error) -> ErrorKind {
    match error {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::PoolTimedOut => ErrorKind::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            ErrorKind::UpstreamUnavailable
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => ErrorKind::Conflict,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => ErrorKind::Validation,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE) => {
            ErrorKind::Forbidden
        }
        _ => ErrorKind::Internal
    }
}
