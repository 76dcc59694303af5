//! Relay configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Broker host that `/api/*` is forwarded to.
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,
    /// `X-Kite-Version` sent upstream.
    #[serde(default = "default_kite_version")]
    pub kite_version: String,
    /// Upstream request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    3001
}

fn default_upstream_base_url() -> String {
    "https://api.kite.trade".to_string()
}

fn default_kite_version() -> String {
    "3".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream_base_url: default_upstream_base_url(),
            kite_version: default_kite_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    relay: RelayConfig,
}

impl RelayConfig {
    /// Read the `[relay]` table of a kdesk config file.
    pub fn from_file(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
            .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(raw: &str) -> RelayResult<Self> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(file.relay)
    }
}
