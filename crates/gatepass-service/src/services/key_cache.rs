//! In-process snapshot of verification keys.
//!
//! [`CachedKeyStore`] wraps another [`KeyStore`] and serves reads from an
//! immutable [`KeySnapshot`]. Every successful status transition rebuilds the
//! snapshot from the wrapped store and swaps it in atomically, so a reader
//! sees either the pre-rotation or the post-rotation key set, never a mix.

use crate::errors::PassError;
use crate::models::{KeyStatus, SigningKey};
use crate::observability::metrics;
use crate::repositories::KeyStore;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Immutable view of the Active and Retired keys at one point in time.
#[derive(Debug, Default)]
pub struct KeySnapshot {
    active: Option<Arc<SigningKey>>,
    keys: HashMap<String, Arc<SigningKey>>,
}

impl KeySnapshot {
    fn from_keys(keys: Vec<SigningKey>) -> Self {
        let mut snapshot = Self::default();
        for key in keys {
            let key = Arc::new(key);
            match key.status {
                KeyStatus::Active => {
                    snapshot.active = Some(Arc::clone(&key));
                }
                KeyStatus::Retired => {}
                // list_verification_keys never returns these
                KeyStatus::Pending | KeyStatus::Purged => continue,
            }
            snapshot.keys.insert(key.key_id.clone(), key);
        }
        snapshot
    }

    pub fn active(&self) -> Option<&Arc<SigningKey>> {
        self.active.as_ref()
    }

    pub fn get(&self, key_id: &str) -> Option<&Arc<SigningKey>> {
        self.keys.get(key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Key store decorator that answers reads from an atomically swapped
/// snapshot and falls back to the wrapped store on a miss.
pub struct CachedKeyStore {
    inner: Arc<dyn KeyStore>,
    snapshot: ArcSwap<KeySnapshot>,
    // Serializes rebuilds so an older read can never overwrite a newer one
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for CachedKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("CachedKeyStore")
            .field(
                "active_key_id",
                &snapshot.active().map(|key| key.key_id.as_str()),
            )
            .field("verification_keys", &snapshot.len())
            .finish_non_exhaustive()
    }
}

impl CachedKeyStore {
    /// Wrap `inner` and build the initial snapshot from it.
    ///
    /// # Errors
    ///
    /// `StoreRead` if the initial key list cannot be read.
    pub async fn load(inner: Arc<dyn KeyStore>) -> Result<Self, PassError> {
        let cache = Self {
            inner,
            snapshot: ArcSwap::from_pointee(KeySnapshot::default()),
            refresh_lock: Mutex::new(()),
        };
        cache.refresh().await?;
        Ok(cache)
    }

    /// Rebuild the snapshot from the wrapped store.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<(), PassError> {
        let _guard = self.refresh_lock.lock().await;

        let keys = self.inner.list_verification_keys().await?;
        let snapshot = KeySnapshot::from_keys(keys);

        tracing::debug!(
            target: "gatepass.cache",
            active_key_id = ?snapshot.active().map(|key| key.key_id.as_str()),
            verification_keys = snapshot.len(),
            "Key snapshot refreshed"
        );
        metrics::set_verification_keys(snapshot.len());

        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Current snapshot. Callers hold it for the duration of one operation.
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        self.snapshot.load_full()
    }

    /// The active key as of the current snapshot, without touching the
    /// wrapped store.
    ///
    /// # Errors
    ///
    /// `NoActiveKey` if the snapshot has no active key (store never
    /// initialized).
    pub fn cached_active_key(&self) -> Result<Arc<SigningKey>, PassError> {
        self.snapshot
            .load()
            .active()
            .cloned()
            .ok_or(PassError::NoActiveKey)
    }

    /// Look up a key for verification: snapshot first, wrapped store on a
    /// miss. Misses are not added to the snapshot; it only changes on
    /// status transitions.
    pub async fn verification_key(&self, key_id: &str) -> Result<Option<Arc<SigningKey>>, PassError> {
        let snapshot = self.snapshot.load_full();
        if let Some(key) = snapshot.get(key_id) {
            return Ok(Some(Arc::clone(key)));
        }

        tracing::debug!(target: "gatepass.cache", key_id = %key_id, "Key snapshot miss");
        Ok(self.inner.get_key_by_id(key_id).await?.map(Arc::new))
    }

    async fn refresh_after_write(&self, operation: &'static str, key_id: &str) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(
                target: "gatepass.cache",
                operation = operation,
                key_id = %key_id,
                error = %e,
                "Key snapshot refresh failed; keeping last-known-good snapshot"
            );
        }
    }
}

#[async_trait]
impl KeyStore for CachedKeyStore {
    async fn get_active_key(&self) -> Result<SigningKey, PassError> {
        let snapshot = self.snapshot.load_full();
        if let Some(key) = snapshot.active() {
            return Ok(SigningKey::clone(key));
        }
        self.inner.get_active_key().await
    }

    async fn get_key_by_id(&self, key_id: &str) -> Result<Option<SigningKey>, PassError> {
        Ok(self
            .verification_key(key_id)
            .await?
            .map(|key| SigningKey::clone(&key)))
    }

    async fn insert_key(&self, key: &SigningKey) -> Result<(), PassError> {
        // Pending keys are invisible to readers; nothing to refresh
        self.inner.insert_key(key).await
    }

    async fn activate_key(&self, key_id: &str) -> Result<(), PassError> {
        self.inner.activate_key(key_id).await?;
        self.refresh_after_write("activate", key_id).await;
        Ok(())
    }

    async fn retire_key(&self, key_id: &str) -> Result<(), PassError> {
        self.inner.retire_key(key_id).await?;
        self.refresh_after_write("retire", key_id).await;
        Ok(())
    }

    async fn purge_key(&self, key_id: &str) -> Result<(), PassError> {
        self.inner.purge_key(key_id).await?;
        self.refresh_after_write("purge", key_id).await;
        Ok(())
    }

    async fn list_purgeable(&self, now: DateTime<Utc>) -> Result<Vec<String>, PassError> {
        self.inner.list_purgeable(now).await
    }

    async fn list_verification_keys(&self) -> Result<Vec<SigningKey>, PassError> {
        self.inner.list_verification_keys().await
    }
}
