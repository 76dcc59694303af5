//! kdesk operator application.
//!
//! Wires the stores, broker session, order workflow and position monitors
//! into one [`Application`] and renders them for the `kdesk` CLI.

pub mod app;
pub mod config;
pub mod console;
pub mod error;

pub use app::{Application, SettingsUpdate};
pub use config::{AppConfig, BrokerConfig, StorageConfig, TelemetryConfig, WorkflowConfig};
pub use console::ConsoleNotifier;
pub use error::{AppError, AppResult};
