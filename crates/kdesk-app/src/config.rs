//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kdesk_broker::{
    HttpSettings, TransportConfig, DEFAULT_API_BASE_URL, DEFAULT_KITE_VERSION,
    DEFAULT_LOGIN_BASE_URL,
};
use kdesk_relay::RelayConfig;
use kdesk_workflow::DEFAULT_NIFTY_LOT_QUANTITY;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Broker REST configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker REST root used by direct and prefixed transports.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Host serving `/connect/login`.
    #[serde(default = "default_login_base_url")]
    pub login_base_url: String,
    #[serde(default = "default_kite_version")]
    pub kite_version: String,
    /// Per-request timeout in seconds. Default: 10.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Transports tried in order until one responds.
    #[serde(default = "TransportConfig::default_chain")]
    pub transports: Vec<TransportConfig>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_login_base_url() -> String {
    DEFAULT_LOGIN_BASE_URL.to_string()
}

fn default_kite_version() -> String {
    DEFAULT_KITE_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            login_base_url: default_login_base_url(),
            kite_version: default_kite_version(),
            timeout_secs: default_timeout_secs(),
            transports: TransportConfig::default_chain(),
        }
    }
}

impl BrokerConfig {
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            api_base_url: self.api_base_url.clone(),
            kite_version: self.kite_version.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Local storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `settings.json`, `algorithms.json` and `deployments.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Order and monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Position poll period (seconds). Default: 30.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Quantity of the built-in NIFTY futures order. Default: 50.
    #[serde(default = "default_nifty_lot_quantity")]
    pub nifty_lot_quantity: u32,
}

fn default_monitor_interval_secs() -> u64 {
    30
}

fn default_nifty_lot_quantity() -> u32 {
    DEFAULT_NIFTY_LOT_QUANTITY
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_monitor_interval_secs(),
            nifty_lot_quantity: default_nifty_lot_quantity(),
        }
    }
}

impl WorkflowConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level configuration, one TOML table per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`AppConfig::from_file`], but a missing file yields defaults.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            warn!(config_path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.broker.transports.is_empty() {
            return Err(AppError::Config(
                "broker.transports must list at least one transport".to_string(),
            ));
        }
        if self.broker.timeout_secs == 0 {
            return Err(AppError::Config(
                "broker.timeout_secs must be positive".to_string(),
            ));
        }
        if self.workflow.monitor_interval_secs == 0 {
            return Err(AppError::Config(
                "workflow.monitor_interval_secs must be positive".to_string(),
            ));
        }
        if self.workflow.nifty_lot_quantity == 0 {
            return Err(AppError::Config(
                "workflow.nifty_lot_quantity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
