//! Error types for the Myko service
//!
//! Provides a unified error type and the validation error variants

use thiserror::Error;

/// Result type alias using MykoError
pub type Result<T> = std::result::Result<T, MykoError>;

/// Unified error type for Myko operations
#[derive(Debug, Error)]
pub enum MykoError {
    // Malformed input, rejected before any state mutation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Sink failures (network, rejection)
    #[error("Backend error: {0}")]
    Backend(String),

    // Sink call exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Contract breach (e.g. unparseable key that should have been verified)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Backend,
    Internal,
}

impl MykoError {
    /// Classify the error into the three caller-facing kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MykoError::Validation(_) => ErrorKind::Validation,
            MykoError::Backend(_) | MykoError::Timeout(_) => ErrorKind::Backend,
            MykoError::Config(_) | MykoError::Serialization(_) | MykoError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        MykoError::Backend(err.to_string())
    }
}

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("entry doesn't contain an origin")]
    MissingOrigin,

    #[error("event name is required")]
    EmptyEventName,

    #[error("{field} contains illegal characters: {value:?}")]
    IllegalCharacter { field: &'static str, value: String },

    #[error("filter needs a scope or an origin")]
    EmptyFilter,
}

impl From<serde_json::Error> for MykoError {
    fn from(err: serde_json::Error) -> Self {
        MykoError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for MykoError {
    fn from(err: std::io::Error) -> Self {
        MykoError::Backend(err.to_string())
    }
}

impl From<anyhow::Error> for MykoError {
    fn from(err: anyhow::Error) -> Self {
        MykoError::Internal(err.to_string())
    }
}
