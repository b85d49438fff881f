//! Signing key persistence.
//!
//! [`KeyStore`] is the only seam through which key state is read or
//! written. Two backends implement it: [`memory::InMemoryKeyStore`] for
//! single-process deployments and tests, and [`signing_keys::PgKeyStore`]
//! for PostgreSQL. [`crate::services::key_cache::CachedKeyStore`] decorates
//! either one with an in-process snapshot.

pub mod memory;
pub mod signing_keys;

use crate::errors::PassError;
use crate::models::SigningKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable record of signing keys and their lifecycle state.
///
/// Status transitions are idempotent: asking for a state the key is already
/// in (or past) succeeds without changing anything, so a rotation can be
/// retried safely.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The current Active key.
    ///
    /// # Errors
    ///
    /// `NoActiveKey` if no key has ever been activated.
    async fn get_active_key(&self) -> Result<SigningKey, PassError>;

    /// Look up a key usable for verification.
    ///
    /// Returns `None` for Pending and Purged keys exactly as for ids that
    /// never existed.
    async fn get_key_by_id(&self, key_id: &str) -> Result<Option<SigningKey>, PassError>;

    /// Persist a new key. The stored status is always Pending, whatever
    /// `key.status` says.
    ///
    /// # Errors
    ///
    /// `StoreWrite` on duplicate id or I/O failure.
    async fn insert_key(&self, key: &SigningKey) -> Result<(), PassError>;

    /// Promote a Pending key to Active, demoting the current Active key to
    /// Retired in the same atomic step.
    ///
    /// No-op when the key is already Active, Retired or Purged.
    async fn activate_key(&self, key_id: &str) -> Result<(), PassError>;

    /// Move a Pending or Active key to Retired. `expires_at` is untouched.
    async fn retire_key(&self, key_id: &str) -> Result<(), PassError>;

    /// Move a Pending or Retired key to Purged. Refuses the Active key.
    async fn purge_key(&self, key_id: &str) -> Result<(), PassError>;

    /// Ids of Retired (and orphaned Pending) keys whose grace deadline is
    /// before `now`.
    async fn list_purgeable(&self, now: DateTime<Utc>) -> Result<Vec<String>, PassError>;

    /// Every Active and Retired key.
    async fn list_verification_keys(&self) -> Result<Vec<SigningKey>, PassError>;
}
