//! Persisted records: credentials, algorithms and deployments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CoreError;

// ============================================================================
// Credentials
// ============================================================================

/// Broker API credentials and risk settings.
///
/// Field names serialize in camelCase so settings exported from the
/// browser dashboard load unchanged. Empty strings mean "not set".
#[derive(Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub request_token: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,
    #[serde(default)]
    pub auto_trade: bool,
}

// Defaults are per field: `Credentials` implements Drop.
fn default_max_positions() -> u32 {
    10
}

fn default_risk_per_trade() -> f64 {
    2.0
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            request_token: String::new(),
            access_token: String::new(),
            redirect_url: String::new(),
            max_positions: default_max_positions(),
            risk_per_trade: default_risk_per_trade(),
            auto_trade: false,
        }
    }
}

impl Credentials {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn has_api_secret(&self) -> bool {
        !self.api_secret.trim().is_empty()
    }

    pub fn has_request_token(&self) -> bool {
        !self.request_token.trim().is_empty()
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    /// Auth material for authenticated calls, if both halves are present.
    pub fn api_auth(&self) -> Option<ApiAuth> {
        if self.has_api_key() && self.has_access_token() {
            Some(ApiAuth::new(self.api_key.trim(), self.access_token.trim()))
        } else {
            None
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &redact(&self.api_secret))
            .field("request_token", &redact(&self.request_token))
            .field("access_token", &redact(&self.access_token))
            .field("redirect_url", &self.redirect_url)
            .field("max_positions", &self.max_positions)
            .field("risk_per_trade", &self.risk_per_trade)
            .field("auto_trade", &self.auto_trade)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// API key and access token pair sent with every authenticated call.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiAuth {
    api_key: String,
    access_token: String,
}

impl ApiAuth {
    pub fn new(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `Authorization` header value: `token {api_key}:{access_token}`.
    pub fn authorization(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }
}

impl fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAuth")
            .field("api_key", &self.api_key)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Algorithm
// ============================================================================

/// A stored strategy script. The code is opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Algorithm {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editor contents submitted for saving.
///
/// `id: None` creates a new algorithm; `Some(id)` overwrites that one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlgorithmDraft {
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub code: String,
}

// ============================================================================
// Deployment
// ============================================================================

/// Deployment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Running,
    Stopped,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A deployed algorithm.
///
/// `algorithm_id` is a weak reference: deleting the algorithm leaves the
/// deployment in place with its denormalized `algorithm_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub algorithm_id: String,
    pub algorithm_name: String,
    pub status: DeploymentStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub trades: u32,
}

impl Deployment {
    /// Create a running deployment for `algorithm`.
    pub fn start(id: String, algorithm: &Algorithm, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            algorithm_id: algorithm.id.clone(),
            algorithm_name: algorithm.name.clone(),
            status: DeploymentStatus::Running,
            started_at,
            profit: 0.0,
            trades: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == DeploymentStatus::Running
    }
}

// ============================================================================
// Record IDs
// ============================================================================

/// Time-derived record ID.
///
/// Format: `{timestamp_ms}`, or `{timestamp_ms}_{uuid_short}` when the plain
/// form is already taken.
pub fn record_id(now: DateTime<Utc>, is_taken: impl Fn(&str) -> bool) -> String {
    let base = now.timestamp_millis().to_string();
    if !is_taken(&base) {
        return base;
    }

    loop {
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        let candidate = format!("{base}_{uuid_short}");
        if !is_taken(&candidate) {
            return candidate;
        }
    }
}
