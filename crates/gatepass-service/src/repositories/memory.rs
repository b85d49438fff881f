use super::KeyStore;
use crate::errors::PassError;
use crate::models::{KeyStatus, SigningKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local key store.
///
/// A single lock guards the whole map, so `activate_key` demotes the old
/// Active key and promotes the new one without any reader seeing both or
/// neither.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of a key regardless of visibility. Intended for tests and
    /// diagnostics; Purged keys are reported as such.
    pub async fn status_of(&self, key_id: &str) -> Option<KeyStatus> {
        self.keys.read().await.get(key_id).map(|key| key.status)
    }

    /// Number of keys currently Active.
    pub async fn active_count(&self) -> usize {
        self.keys
            .read()
            .await
            .values()
            .filter(|key| key.status == KeyStatus::Active)
            .count()
    }

    /// Total number of records, including Purged ones.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

fn unknown_key(key_id: &str) -> PassError {
    PassError::StoreWrite(format!("Signing key not found: {}", key_id))
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn get_active_key(&self) -> Result<SigningKey, PassError> {
        self.keys
            .read()
            .await
            .values()
            .find(|key| key.status == KeyStatus::Active)
            .cloned()
            .ok_or(PassError::NoActiveKey)
    }

    async fn get_key_by_id(&self, key_id: &str) -> Result<Option<SigningKey>, PassError> {
        Ok(self
            .keys
            .read()
            .await
            .get(key_id)
            .filter(|key| key.status.is_visible())
            .cloned())
    }

    async fn insert_key(&self, key: &SigningKey) -> Result<(), PassError> {
        let mut keys = self.keys.write().await;
        if keys.contains_key(&key.key_id) {
            return Err(PassError::StoreWrite(format!(
                "Signing key already exists: {}",
                key.key_id
            )));
        }
        keys.insert(key.key_id.clone(), key.with_status(KeyStatus::Pending));

        tracing::debug!(target: "gatepass.store", key_id = %key.key_id, "Inserted pending signing key");
        Ok(())
    }

    async fn activate_key(&self, key_id: &str) -> Result<(), PassError> {
        let mut keys = self.keys.write().await;

        match keys.get(key_id).map(|key| key.status) {
            None => return Err(unknown_key(key_id)),
            Some(KeyStatus::Pending) => {}
            Some(KeyStatus::Active | KeyStatus::Retired | KeyStatus::Purged) => return Ok(()),
        }

        let mut demoted = None;
        for key in keys.values_mut() {
            if key.status == KeyStatus::Active {
                key.status = KeyStatus::Retired;
                demoted = Some(key.key_id.clone());
            }
        }
        if let Some(key) = keys.get_mut(key_id) {
            key.status = KeyStatus::Active;
        }

        tracing::debug!(
            target: "gatepass.store",
            key_id = %key_id,
            demoted_key_id = ?demoted,
            "Activated signing key"
        );
        Ok(())
    }

    async fn retire_key(&self, key_id: &str) -> Result<(), PassError> {
        let mut keys = self.keys.write().await;
        let key = keys.get_mut(key_id).ok_or_else(|| unknown_key(key_id))?;

        if matches!(key.status, KeyStatus::Pending | KeyStatus::Active) {
            key.status = KeyStatus::Retired;
            tracing::debug!(target: "gatepass.store", key_id = %key_id, "Retired signing key");
        }
        Ok(())
    }

    async fn purge_key(&self, key_id: &str) -> Result<(), PassError> {
        let mut keys = self.keys.write().await;
        let key = keys.get_mut(key_id).ok_or_else(|| unknown_key(key_id))?;

        match key.status {
            KeyStatus::Active => Err(PassError::StoreWrite(format!(
                "Refusing to purge active signing key: {}",
                key_id
            ))),
            KeyStatus::Purged => Ok(()),
            KeyStatus::Pending | KeyStatus::Retired => {
                key.status = KeyStatus::Purged;
                tracing::debug!(target: "gatepass.store", key_id = %key_id, "Purged signing key");
                Ok(())
            }
        }
    }

    async fn list_purgeable(&self, now: DateTime<Utc>) -> Result<Vec<String>, PassError> {
        let mut ids: Vec<String> = self
            .keys
            .read()
            .await
            .values()
            .filter(|key| {
                matches!(key.status, KeyStatus::Retired | KeyStatus::Pending)
                    && key.expires_at < now
            })
            .map(|key| key.key_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_verification_keys(&self) -> Result<Vec<SigningKey>, PassError> {
        Ok(self
            .keys
            .read()
            .await
            .values()
            .filter(|key| key.status.is_visible())
            .cloned()
            .collect())
    }
}
