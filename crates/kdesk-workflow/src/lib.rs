//! Trading workflows for kdesk.
//!
//! - [`OrderWorkflow`]: market-hours gate and order submission
//! - [`PositionMonitor`], [`MonitorSet`]: periodic P&L refresh per deployment
//! - [`Deployer`]: deploy/stop lifecycle with rollback on failed orders

pub mod deploy;
pub mod error;
pub mod monitor;
pub mod order;
pub mod positions;

pub use deploy::{DeployOutcome, Deployer, OrderIntent, DEFAULT_NIFTY_LOT_QUANTITY};
pub use error::{WorkflowError, WorkflowResult};
pub use monitor::{MonitorHandle, MonitorSet, PositionMonitor, DEFAULT_MONITOR_INTERVAL};
pub use order::OrderWorkflow;
pub use positions::{position_rows, total_pnl, PositionRow};
