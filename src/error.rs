//! Error taxonomy shared by the store, the report engine and the renderer.
//!
//! Every variant except `Io`, `Database` and `Config` is recoverable by the
//! caller: fix the input, pick another value, refresh the view, or reassign the
//! dependent pieces first.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Required input is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// A uniqueness rule rejected the write.
    #[error("{0}")]
    Conflict(String),

    /// The targeted row does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The write would leave (or find) dangling references between tables.
    #[error("{0}")]
    ReferentialIntegrity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// True for the variants a caller can resolve by changing its input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict(_) | Self::NotFound(_) | Self::ReferentialIntegrity(_)
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
