//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the default filter directive for `level`.
fn default_directive(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    format!("{level},kdesk=debug")
}

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence; otherwise `level` is used for everything and
/// kdesk crates log at debug. Output is JSON when `RUST_ENV=production` and
/// pretty otherwise.
pub fn init_logging(level: &str) -> TelemetryResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    let result = if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("warn"), "warn,kdesk=debug");
        assert_eq!(default_directive(""), "info,kdesk=debug");
    }

    #[test]
    fn test_second_init_is_an_error() {
        let _ = init_logging("info");
        assert!(matches!(
            init_logging("info"),
            Err(TelemetryError::LoggingInit(_))
        ));
    }
}
