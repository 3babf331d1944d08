//! Error types for courier.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Caller Errors ===
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // === Subsystem Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error code used in structured logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConversationNotFound(_) => "CONVERSATION_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Delivery(_) => "DELIVERY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error must never be retried.
    ///
    /// A malformed payload stays malformed no matter how many times the
    /// job runs, so validation failures discard the job immediately.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_fatal() {
        assert!(AppError::Validation("bad payload".into()).is_fatal());
        assert!(!AppError::Delivery("timeout".into()).is_fatal());
        assert!(!AppError::Storage("disk full".into()).is_fatal());
    }

    #[test]
    fn test_serde_error_maps_to_validation() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.error_code(), "VALIDATION_ERROR");
        assert!(app.is_fatal());
    }
}
