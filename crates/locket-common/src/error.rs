//! Error types for Locket
//!
//! `LocketError` is the error taxonomy shared by the lock store, the expiration
//! supervisor and the request service.

/// Locket error types
///
/// `ResourceNotFound` and `LockCollision` are domain outcomes callers branch on.
/// Every infrastructure failure that cannot heal by retrying collapses into
/// `Unrecoverable`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LocketError {
    #[error("resource not found")]
    ResourceNotFound,

    #[error("lock collision")]
    LockCollision,

    #[error("unrecoverable error")]
    Unrecoverable,

    #[error("database error: {0}")]
    Database(String),

    #[error("failed to generate guid: {0}")]
    GuidGeneration(String),

    #[error("invalid ttl")]
    InvalidTtl,

    #[error("invalid owner")]
    InvalidOwner,

    #[error("invalid type")]
    InvalidType,
}

impl LocketError {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, LocketError::Unrecoverable)
    }
}

/// Result alias used across the Locket crates
pub type Result<T> = std::result::Result<T, LocketError>;
