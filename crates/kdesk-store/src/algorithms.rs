//! Algorithm script storage.
//!
//! Algorithms are keyed by a time-derived id that stays stable across edits.
//! Saving under an existing id preserves `createdAt` and refreshes `updatedAt`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kdesk_core::{record_id, Algorithm, AlgorithmDraft};
use parking_lot::RwLock;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::kv::{load_json, save_json, KvStore, ALGORITHMS_KEY};

/// Name of the algorithm seeded into an empty store.
pub const DEFAULT_ALGORITHM_NAME: &str = "NIFTY Futures Buy";

const DEFAULT_ALGORITHM_DESCRIPTION: &str =
    "Places a buy order on the current-month NIFTY future when deployed";

const DEFAULT_ALGORITHM_CODE: &str = include_str!("../assets/nifty_futures_buy.py");

/// Algorithm map backed by a [`KvStore`].
pub struct AlgorithmStore {
    kv: Arc<dyn KvStore>,
    algorithms: RwLock<BTreeMap<String, Algorithm>>,
}

impl AlgorithmStore {
    pub fn open(kv: Arc<dyn KvStore>) -> StoreResult<Self> {
        let algorithms: BTreeMap<String, Algorithm> = load_json(kv.as_ref(), ALGORITHMS_KEY)?;
        Ok(Self {
            kv,
            algorithms: RwLock::new(algorithms),
        })
    }

    /// Save a draft using the current time.
    pub fn save(&self, draft: AlgorithmDraft) -> StoreResult<Algorithm> {
        self.save_at(draft, Utc::now())
    }

    /// Save a draft as of `now`.
    ///
    /// Requires a non-empty name and non-blank code.
    pub fn save_at(&self, draft: AlgorithmDraft, now: DateTime<Utc>) -> StoreResult<Algorithm> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation(
                "algorithm name is required".to_string(),
            ));
        }
        if draft.code.trim().is_empty() {
            return Err(StoreError::Validation(
                "algorithm code is required".to_string(),
            ));
        }

        let mut algorithms = self.algorithms.write();

        let id = match draft.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => record_id(now, |candidate| algorithms.contains_key(candidate)),
        };
        let created_at = algorithms
            .get(&id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let algorithm = Algorithm {
            id: id.clone(),
            name: name.to_string(),
            description: draft.description.trim().to_string(),
            code: draft.code,
            created_at,
            updated_at: now,
        };

        let previous = algorithms.insert(id.clone(), algorithm.clone());
        if let Err(e) = save_json(self.kv.as_ref(), ALGORITHMS_KEY, &*algorithms) {
            match previous {
                Some(prev) => algorithms.insert(id, prev),
                None => algorithms.remove(&id),
            };
            return Err(e);
        }

        info!(algorithm_id = %algorithm.id, name = %algorithm.name, "Algorithm saved");
        Ok(algorithm)
    }

    pub fn get(&self, id: &str) -> Option<Algorithm> {
        self.algorithms.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.algorithms.read().contains_key(id)
    }

    /// All algorithms, most recently updated first.
    pub fn list(&self) -> Vec<Algorithm> {
        let mut all: Vec<Algorithm> = self.algorithms.read().values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.name.cmp(&b.name)));
        all
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.read().is_empty()
    }

    /// Delete an algorithm. Returns the removed record, `None` if unknown.
    ///
    /// Deployments referencing it are left in place.
    pub fn delete(&self, id: &str) -> StoreResult<Option<Algorithm>> {
        let mut algorithms = self.algorithms.write();
        let Some(removed) = algorithms.remove(id) else {
            return Ok(None);
        };
        if let Err(e) = save_json(self.kv.as_ref(), ALGORITHMS_KEY, &*algorithms) {
            algorithms.insert(id.to_string(), removed);
            return Err(e);
        }
        info!(algorithm_id = %id, "Algorithm deleted");
        Ok(Some(removed))
    }

    /// Seed the built-in NIFTY futures algorithm when the store is empty.
    ///
    /// Returns the seeded algorithm, `None` if algorithms already exist.
    pub fn seed_defaults(&self, now: DateTime<Utc>) -> StoreResult<Option<Algorithm>> {
        if !self.is_empty() {
            return Ok(None);
        }
        let draft = AlgorithmDraft {
            id: Some(format!("nifty_buy_{}", now.timestamp_millis())),
            name: DEFAULT_ALGORITHM_NAME.to_string(),
            description: DEFAULT_ALGORITHM_DESCRIPTION.to_string(),
            code: DEFAULT_ALGORITHM_CODE.to_string(),
        };
        let seeded = self.save_at(draft, now)?;
        info!(algorithm_id = %seeded.id, "Default algorithm created");
        Ok(Some(seeded))
    }
}
