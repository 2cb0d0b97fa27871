//! Error types for Sarafi services.

use thiserror::Error;

/// Main error type for Sarafi operations.
#[derive(Error, Debug)]
pub enum SarafiError {
    /// Entity does not exist, or belongs to another tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input failed a business rule.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Remaining balance too small for the requested allocation.
    #[error("Insufficient balance on {entity}: required {required}, available {available}")]
    InsufficientBalance {
        entity: &'static str,
        required: String,
        available: String,
    },

    /// State machine refused the change.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A concurrent writer changed the record first, or a uniqueness rule was hit.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SarafiError {
    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SarafiError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a validation error without a field.
    pub fn validation(message: impl Into<String>) -> Self {
        SarafiError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Shorthand for a validation error tied to an input field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        SarafiError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SarafiError::Conflict(_) | SarafiError::Database(_))
    }

    /// True for any rejection of the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SarafiError::Validation { .. } | SarafiError::InsufficientBalance { .. }
        )
    }

    /// Get a stable error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            SarafiError::NotFound { .. } => "NOT_FOUND",
            SarafiError::Validation { .. } => "VALIDATION_FAILED",
            SarafiError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            SarafiError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SarafiError::Conflict(_) => "CONFLICT",
            SarafiError::Database(_) => "DATABASE_ERROR",
            SarafiError::Configuration(_) => "CONFIGURATION_ERROR",
            SarafiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for Sarafi operations.
pub type Result<T> = std::result::Result<T, SarafiError>;
