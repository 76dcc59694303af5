//! Core domain types for the kdesk broker dashboard.
//!
//! This crate provides the types shared by every other crate:
//! - `Credentials`, `ApiAuth`: API key/secret/token material and risk settings
//! - `Algorithm`, `Deployment`: persisted records
//! - `OrderSide`, `OrderParams`: the fixed intraday market-order payload
//! - `Exchange`: static symbol-to-exchange routing
//! - `Clock`, `is_market_open_at`: market-hours predicate

pub mod error;
pub mod market;
pub mod order;
pub mod trading_session;
pub mod types;

pub use error::{CoreError, Result};
pub use market::{current_nifty_future, Exchange};
pub use order::{OrderParams, OrderResult, OrderSide, ORDER_TYPE_MARKET, PRODUCT_MIS};
pub use trading_session::{
    hhmm, is_market_open, is_market_open_at, Clock, FixedClock, SystemClock, MARKET_CLOSE_HHMM,
    MARKET_OPEN_HHMM,
};
pub use types::{
    record_id, Algorithm, AlgorithmDraft, ApiAuth, Credentials, Deployment, DeploymentStatus,
};
