//! Error types for notely-core

use thiserror::Error;

/// Result type alias using notely-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in notely-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure: the request never produced a response
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error envelope
    #[error("API error: {0}")]
    Api(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// The offline worker task is gone or dropped a reply
    #[error("Offline worker error: {0}")]
    Worker(String),

    /// Queued operation with a type the client does not know
    #[error("Unknown operation type: {0}")]
    UnknownOperation(String),

    /// Queued operation whose payload does not fit its type
    #[error("Invalid {kind} operation: {reason}")]
    InvalidOperation { kind: String, reason: String },
}

impl Error {
    /// Returns `true` for network/transport failures (as opposed to errors
    /// reported by the API itself).
    ///
    /// Only transport failures are worth replaying later.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}
