//! Workflow error types.

use kdesk_broker::{GatewayError, SessionError};
use kdesk_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Market is closed (open Mon-Fri 09:15-15:30, now {now_hhmm:04})")]
    MarketClosed { now_hhmm: u32 },

    /// Required credentials are missing. Raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not connected to the broker")]
    NotConnected,

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Algorithm not found: {0}")]
    AlgorithmNotFound(String),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("No order intent for algorithm {0}; pass an explicit order")]
    NoOrderIntent(String),

    /// The broker accepted the call but placed no order.
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
