//! Relay error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream returned a non-JSON body (HTTP {0})")]
    NonJsonResponse(u16),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Proxy server error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
