//! Error types for kdesk-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid order side: {0}")]
    InvalidSide(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid deployment status: {0}")]
    InvalidStatus(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
