//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No usable session: absent, unknown, expired, tampered or sealed under
    /// another key. The cases are deliberately indistinguishable.
    #[error("Session not found")]
    NotFound,

    /// The encoded cookie would exceed the configured size budget.
    #[error("Session payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Cookie store key is not 16, 24 or 32 bytes long.
    #[error("Invalid key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<SessionError> for lattice_core::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => lattice_core::Error::SessionNotFound,
            SessionError::PayloadTooLarge { .. } => {
                lattice_core::Error::PayloadTooLarge(err.to_string())
            }
            other => lattice_core::Error::SessionPersistence(other.to_string()),
        }
    }
}
