//! Local persistence for kdesk.
//!
//! Three records live in a string key-value store, one JSON document each:
//! - `settings`: [`CredentialStore`]
//! - `algorithms`: [`AlgorithmStore`]
//! - `deployments`: [`DeploymentRegistry`]

pub mod algorithms;
pub mod credentials;
pub mod deployments;
pub mod error;
pub mod kv;

pub use algorithms::{AlgorithmStore, DEFAULT_ALGORITHM_NAME};
pub use credentials::CredentialStore;
pub use deployments::{compute_display_rows, format_profit, DeploymentRegistry, DisplayRow};
pub use error::{StoreError, StoreResult};
pub use kv::{
    load_json, save_json, FileKvStore, KvStore, MemoryKvStore, ALGORITHMS_KEY, DEPLOYMENTS_KEY,
    SETTINGS_KEY,
};
