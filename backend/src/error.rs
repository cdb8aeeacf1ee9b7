//! Error handling for the Mart Operations platform
//!
//! Stock errors are split deliberately: `InsufficientStock` is the expected,
//! user-facing "we cannot sell you this" answer, while `AllocationConflict`
//! and `InvariantViolation` signal races and bugs that callers handle very
//! differently.

use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available} (short {shortage})"
    )]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
        shortage: i32,
    },

    /// A batch changed between planning and application; safe to re-plan
    #[error("Allocation conflict: {0}")]
    AllocationConflict(String),

    /// The ledger books no longer balance; never retried, always a bug
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the operation may be retried after re-reading current state
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::AllocationConflict(_))
    }

    pub fn validation(field: &str, message: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for services
pub type AppResult<T> = Result<T, AppError>;
