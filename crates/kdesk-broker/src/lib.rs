//! Broker REST access for kdesk.
//!
//! - [`Transport`]: one route to the broker (direct, prefixed relay, local relay)
//! - [`BrokerGateway`]: ordered transport fallback and broker error mapping
//! - [`SessionManager`]: checksum token exchange, profile check, login URL
//! - [`Notifier`]: one user-visible message per action

pub mod error;
pub mod gateway;
pub mod notify;
pub mod response;
pub mod session;
pub mod transport;

pub use error::{GatewayError, GatewayResult, SessionError, SessionResult, TransportAttempt};
pub use gateway::{
    BrokerGateway, ORDERS_ENDPOINT, POSITIONS_ENDPOINT, PROFILE_ENDPOINT, SESSION_TOKEN_ENDPOINT,
};
pub use notify::{LogNotifier, Notifier, NotifyLevel, RecordingNotifier};
pub use response::{NetPosition, Profile};
pub use session::{
    checksum, login_url, request_token_from_redirect, AutoConnect, SessionManager, SessionStatus,
    DEFAULT_LOGIN_BASE_URL,
};
pub use transport::{
    build_transports, BoxFuture, BrokerRequest, DynTransport, HttpMethod, HttpSettings,
    HttpTransport, MockOutcome, MockTransport, RawResponse, RecordedCall, Transport,
    TransportConfig, DEFAULT_API_BASE_URL, DEFAULT_KITE_VERSION, DEFAULT_TIMEOUT,
};
