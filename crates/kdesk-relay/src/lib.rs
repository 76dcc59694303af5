//! kdesk-relay - same-origin relay for the broker REST API.
//!
//! Browser-style clients cannot call the broker host directly, so the desk
//! falls back to this relay. Every `/api/<path>` request is forwarded to
//! `<upstream_base_url>/<path>` and the upstream status and JSON body are
//! returned unchanged. Failures surface as HTTP 500 with
//! `{"error": "Proxy server error", "message": ...}`.
//!
//! # Usage
//!
//! ```ignore
//! use kdesk_relay::{run_relay, RelayConfig};
//!
//! run_relay(RelayConfig::default()).await?;
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use server::{create_router, run_relay, upstream_body, RelayState, UpstreamBody};
