//! Error types for store and mutex operations.

use thiserror::Error;

/// Errors produced by document stores, lock stores, and repositories.
///
/// Coordination outcomes (a held lock, a missing lock record, a lost create
/// race) are never reported through this type; they are result values.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document with the same identity already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    /// Entity or document could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// The operation was cut short and may or may not have been applied.
    #[error("outcome unknown: {0}")]
    Indeterminate(String),
    /// Configuration was rejected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Whether this error is a store-level uniqueness violation.
    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
