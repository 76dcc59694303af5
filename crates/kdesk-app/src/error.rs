//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] kdesk_store::StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] kdesk_broker::GatewayError),

    #[error("Session error: {0}")]
    Session(#[from] kdesk_broker::SessionError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] kdesk_workflow::WorkflowError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] kdesk_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
