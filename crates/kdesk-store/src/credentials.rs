//! Credential persistence.

use std::sync::Arc;

use kdesk_core::Credentials;
use parking_lot::RwLock;
use tracing::info;

use crate::error::StoreResult;
use crate::kv::{load_json, save_json, KvStore, SETTINGS_KEY};

/// Holds the current credentials and mirrors every change to the store.
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
    current: RwLock<Credentials>,
}

impl CredentialStore {
    /// Load credentials from `kv`, defaulting when nothing was saved yet.
    pub fn open(kv: Arc<dyn KvStore>) -> StoreResult<Self> {
        let current: Credentials = load_json(kv.as_ref(), SETTINGS_KEY)?;
        Ok(Self {
            kv,
            current: RwLock::new(current),
        })
    }

    /// Snapshot of the current credentials.
    pub fn get(&self) -> Credentials {
        self.current.read().clone()
    }

    /// Overwrite all credentials.
    pub fn save(&self, credentials: Credentials) -> StoreResult<()> {
        let mut current = self.current.write();
        save_json(self.kv.as_ref(), SETTINGS_KEY, &credentials)?;
        *current = credentials;
        info!(has_access_token = current.has_access_token(), "Settings saved");
        Ok(())
    }

    /// Apply `f` to a copy of the credentials and save the result.
    pub fn update(&self, f: impl FnOnce(&mut Credentials)) -> StoreResult<Credentials> {
        let mut current = self.current.write();
        let mut next = current.clone();
        f(&mut next);
        save_json(self.kv.as_ref(), SETTINGS_KEY, &next)?;
        *current = next.clone();
        Ok(next)
    }

    /// Store a freshly exchanged access token. The request token it was
    /// exchanged for is single-use and gets cleared.
    pub fn set_access_token(&self, access_token: &str) -> StoreResult<()> {
        self.update(|creds| {
            creds.access_token = access_token.to_string();
            creds.request_token.clear();
        })?;
        Ok(())
    }
}
