//! Deployment registry.
//!
//! Holds the persisted deployment records. Monitoring handles are owned by
//! the workflow layer and never stored here. Several processes may share one
//! data directory (`kdesk watch` alongside one-shot commands), so every
//! mutation reloads the map from storage under the write lock before
//! applying its change, and reads go to storage as well. The in-memory map
//! only serves reads when storage cannot be read.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use kdesk_core::{record_id, Algorithm, Deployment, DeploymentStatus};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::kv::{load_json, save_json, KvStore, DEPLOYMENTS_KEY};

type DeploymentMap = BTreeMap<String, Deployment>;

/// Deployment map backed by a [`KvStore`].
pub struct DeploymentRegistry {
    kv: Arc<dyn KvStore>,
    deployments: RwLock<DeploymentMap>,
}

impl DeploymentRegistry {
    pub fn open(kv: Arc<dyn KvStore>) -> StoreResult<Self> {
        let deployments: DeploymentMap = load_json(kv.as_ref(), DEPLOYMENTS_KEY)?;
        Ok(Self {
            kv,
            deployments: RwLock::new(deployments),
        })
    }

    fn load(&self) -> StoreResult<DeploymentMap> {
        load_json(self.kv.as_ref(), DEPLOYMENTS_KEY)
    }

    /// Current map as stored, refreshing the cached copy.
    fn snapshot(&self) -> DeploymentMap {
        match self.load() {
            Ok(stored) => {
                *self.deployments.write() = stored.clone();
                stored
            }
            Err(e) => {
                warn!(error = %e, "Failed to read deployments, serving cached copy");
                self.deployments.read().clone()
            }
        }
    }

    /// Create a running deployment for `algorithm` started at `now`.
    pub fn create(&self, algorithm: &Algorithm, now: DateTime<Utc>) -> StoreResult<Deployment> {
        let mut cached = self.deployments.write();
        let mut stored = self.load()?;
        let id = record_id(now, |candidate| stored.contains_key(candidate));
        let deployment = Deployment::start(id.clone(), algorithm, now);

        stored.insert(id.clone(), deployment.clone());
        save_json(self.kv.as_ref(), DEPLOYMENTS_KEY, &stored)?;
        *cached = stored;

        info!(
            deployment_id = %id,
            algorithm_id = %algorithm.id,
            "Deployment created"
        );
        Ok(deployment)
    }

    pub fn get(&self, id: &str) -> Option<Deployment> {
        self.snapshot().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().contains_key(id)
    }

    /// All deployments ordered by start time.
    pub fn list(&self) -> Vec<Deployment> {
        let mut all: Vec<Deployment> = self.snapshot().into_values().collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Deployments currently in the running state.
    pub fn running(&self) -> Vec<Deployment> {
        self.list().into_iter().filter(|d| d.is_running()).collect()
    }

    /// Add one trade to `id`. Returns false (and writes nothing) if unknown.
    pub fn increment_trades(&self, id: &str) -> StoreResult<bool> {
        self.mutate(id, |d| d.trades = d.trades.saturating_add(1))
    }

    /// Overwrite the profit of `id`. Returns false (and writes nothing) if unknown.
    pub fn set_profit(&self, id: &str, profit: f64) -> StoreResult<bool> {
        self.mutate(id, |d| d.profit = profit)
    }

    /// Remove `id`. Returns the removed record, `None` if unknown.
    pub fn remove(&self, id: &str) -> StoreResult<Option<Deployment>> {
        let mut cached = self.deployments.write();
        let mut stored = self.load()?;
        let Some(removed) = stored.remove(id) else {
            *cached = stored;
            return Ok(None);
        };
        save_json(self.kv.as_ref(), DEPLOYMENTS_KEY, &stored)?;
        *cached = stored;
        info!(deployment_id = %id, "Deployment removed");
        Ok(Some(removed))
    }

    fn mutate(&self, id: &str, f: impl FnOnce(&mut Deployment)) -> StoreResult<bool> {
        let mut cached = self.deployments.write();
        let mut stored = self.load()?;
        let Some(deployment) = stored.get_mut(id) else {
            debug!(deployment_id = %id, "Skipping update for missing deployment");
            *cached = stored;
            return Ok(false);
        };

        f(deployment);
        save_json(self.kv.as_ref(), DEPLOYMENTS_KEY, &stored)?;
        *cached = stored;
        Ok(true)
    }
}

// ============================================================================
// Display rows
// ============================================================================

/// One rendered deployment row.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub id: String,
    pub algorithm_name: String,
    pub status: DeploymentStatus,
    /// Rupee-formatted profit, e.g. `₹125.50`.
    pub profit: String,
    pub profit_positive: bool,
    pub trades: u32,
    pub started_at: String,
    /// The referenced algorithm has been deleted.
    pub source_missing: bool,
}

/// Format a profit value as rupees with two decimals.
pub fn format_profit(profit: f64) -> String {
    format!("₹{profit:.2}")
}

/// Build display rows for `deployments`, sorted by start time.
///
/// `started_at` is rendered in `tz` as `%Y-%m-%d %H:%M:%S`.
pub fn compute_display_rows<Tz>(
    deployments: &[Deployment],
    algorithm_exists: impl Fn(&str) -> bool,
    tz: &Tz,
) -> Vec<DisplayRow>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut sorted: Vec<&Deployment> = deployments.iter().collect();
    sorted.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));

    sorted
        .into_iter()
        .map(|d| DisplayRow {
            id: d.id.clone(),
            algorithm_name: d.algorithm_name.clone(),
            status: d.status,
            profit: format_profit(d.profit),
            profit_positive: d.profit >= 0.0,
            trades: d.trades,
            started_at: d
                .started_at
                .with_timezone(tz)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            source_missing: !algorithm_exists(&d.algorithm_id),
        })
        .collect()
}
