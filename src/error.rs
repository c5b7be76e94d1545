//! Error types for cache and retention operations
//!
//! Cache paths never surface these to callers (they degrade to a miss);
//! memory and consent paths always do, since their guarantees depend on
//! durable writes.

use thiserror::Error;

/// Main error type for the caching and retention core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Write or read blocked because the user has not granted the purpose
    #[error("Consent denied: user {user_id} has not granted {purpose}")]
    ConsentDenied { user_id: String, purpose: String },

    /// Record is absent or expired; callers cannot tell the two apart
    #[error("Not found: {0}")]
    NotFound(String),

    /// Key-value backend could not be reached or rejected the operation
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Malformed category, purpose or record, rejected before any I/O
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether the error came from the storage layer rather than from policy
    pub fn is_backend(&self) -> bool {
        matches!(self, CoreError::BackendUnavailable(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::SerializationError(e.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}
