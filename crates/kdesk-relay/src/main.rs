//! kdesk relay - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

/// Forward /api/* calls to the broker REST host
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides PORT env var and config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream broker base URL
    #[arg(short, long)]
    upstream: Option<String>,

    /// Configuration file path (can also be set via KDESK_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    kdesk_telemetry::init_logging(&args.log_level)?;

    info!("Starting kdesk relay v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > KDESK_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("KDESK_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let mut config = if std::path::Path::new(&config_path).exists() {
        info!(config_path = %config_path, "Loading configuration");
        kdesk_relay::RelayConfig::from_file(&config_path)?
    } else {
        warn!(config_path = %config_path, "Config file not found, using defaults");
        kdesk_relay::RelayConfig::default()
    };

    // Port: CLI arg > PORT env var > config file
    if let Some(port) = args.port {
        config.port = port;
    } else if let Ok(raw) = std::env::var("PORT") {
        config.port = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid PORT value {raw:?}: {e}"))?;
    }
    if let Some(upstream) = args.upstream {
        config.upstream_base_url = upstream;
    }

    kdesk_relay::run_relay(config).await?;

    Ok(())
}
