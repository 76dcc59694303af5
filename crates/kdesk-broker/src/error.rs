//! Broker error types.

use std::fmt;

use kdesk_store::StoreError;
use thiserror::Error;

/// One failed transport attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAttempt {
    pub transport: String,
    pub reason: String,
}

impl fmt::Display for TransportAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.transport, self.reason)
    }
}

fn join_attempts(attempts: &[TransportAttempt]) -> String {
    if attempts.is_empty() {
        return "no transports configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every transport failed before a usable broker response arrived.
    #[error("All transports failed ({})", join_attempts(attempts))]
    Transport { attempts: Vec<TransportAttempt> },

    /// The broker answered with an error envelope.
    #[error("Broker API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        error_type: Option<String>,
        message: String,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Required credentials are missing. Raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Invalid profile response: {0}")]
    InvalidProfile(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;
