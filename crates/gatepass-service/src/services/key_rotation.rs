//! Key rotation scheduler.
//!
//! Every rotation interval `R` a fresh key is generated and activated, the
//! previous key is retired (it keeps verifying until its own grace deadline)
//! and keys past their grace deadline are purged.
//!
//! # Failure handling
//!
//! Until the new key is confirmed Active the previous key is left untouched,
//! so a failed insert or activation only delays rotation. Failures are logged
//! and counted; the next tick retries from scratch.

use crate::config::RotationSettings;
use crate::crypto;
use crate::errors::PassError;
use crate::models::{KeyStatus, SigningKey};
use crate::observability::metrics;
use crate::repositories::KeyStore;
use crate::services::key_cache::CachedKeyStore;
use chrono::{DateTime, Utc};
use common::clock::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Result of one completed rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub new_key_id: String,
    pub retired_key_id: Option<String>,
    pub purged_key_ids: Vec<String>,
}

pub struct KeyRotationScheduler {
    store: Arc<CachedKeyStore>,
    clock: Arc<dyn Clock>,
    settings: RotationSettings,
    rotations_completed: AtomicU64,
    rotations_failed: AtomicU64,
}

impl std::fmt::Debug for KeyRotationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotationScheduler")
            .field("settings", &self.settings)
            .field("rotations_completed", &self.rotations_completed())
            .field("rotations_failed", &self.rotations_failed())
            .finish_non_exhaustive()
    }
}

impl KeyRotationScheduler {
    pub fn new(
        store: Arc<CachedKeyStore>,
        clock: Arc<dyn Clock>,
        settings: RotationSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            rotations_completed: AtomicU64::new(0),
            rotations_failed: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> RotationSettings {
        self.settings
    }

    /// Rotations that reached the point where the new key was Active.
    pub fn rotations_completed(&self) -> u64 {
        self.rotations_completed.load(Ordering::SeqCst)
    }

    /// Rotations abandoned before the new key became Active.
    pub fn rotations_failed(&self) -> u64 {
        self.rotations_failed.load(Ordering::SeqCst)
    }

    fn new_key(&self, now: DateTime<Utc>) -> Result<SigningKey, PassError> {
        let lifetime = chrono::Duration::from_std(self.settings.key_lifetime())
            .map_err(|e| PassError::Internal(format!("Key lifetime out of range: {}", e)))?;
        let expires_at = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| PassError::Internal("Key expiry out of range".to_string()))?;

        Ok(SigningKey {
            key_id: crypto::generate_key_id(),
            secret: crypto::generate_signing_secret()?,
            created_at: now,
            activates_at: now,
            expires_at,
            status: KeyStatus::Pending,
        })
    }

    /// Make sure an Active key exists, creating the first one if the store
    /// is empty. Returns the id of the key created, if any.
    ///
    /// Idempotent, and not counted as a rotation.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> Result<Option<String>, PassError> {
        self.store.refresh().await?;

        match self.store.get_active_key().await {
            Ok(key) => {
                tracing::debug!(target: "gatepass.rotation", key_id = %key.key_id, "Active signing key present");
                return Ok(None);
            }
            Err(PassError::NoActiveKey) => {}
            Err(e) => return Err(e),
        }

        let key = self.new_key(self.clock.now())?;
        self.store.insert_key(&key).await?;
        self.store.activate_key(&key.key_id).await?;

        info!(
            target: "gatepass.rotation",
            key_id = %key.key_id,
            expires_at = %key.expires_at,
            "Initial signing key created"
        );
        Ok(Some(key.key_id))
    }

    /// Run one rotation now.
    ///
    /// # Errors
    ///
    /// Returns the error if the new key could not be generated, inserted or
    /// activated; the previous key then remains Active. Retire and purge
    /// failures are logged and do not fail the rotation.
    #[instrument(skip_all)]
    pub async fn rotate(&self) -> Result<RotationOutcome, PassError> {
        match self.rotate_inner().await {
            Ok(outcome) => {
                self.rotations_completed.fetch_add(1, Ordering::SeqCst);
                metrics::record_key_rotation("success");
                #[allow(clippy::cast_precision_loss)]
                metrics::set_key_rotation_last_success(self.clock.now().timestamp() as f64);
                Ok(outcome)
            }
            Err(e) => {
                self.rotations_failed.fetch_add(1, Ordering::SeqCst);
                metrics::record_key_rotation("error");
                Err(e)
            }
        }
    }

    async fn rotate_inner(&self) -> Result<RotationOutcome, PassError> {
        let now = self.clock.now();

        let previous = match self.store.get_active_key().await {
            Ok(key) => Some(key.key_id),
            Err(PassError::NoActiveKey) => None,
            Err(e) => return Err(e),
        };

        let key = self.new_key(now)?;
        self.store.insert_key(&key).await?;
        // Commit point: the previous key is demoted in the same step
        self.store.activate_key(&key.key_id).await?;

        if let Some(previous_id) = &previous {
            if let Err(e) = self.store.retire_key(previous_id).await {
                tracing::warn!(
                    target: "gatepass.rotation",
                    key_id = %previous_id,
                    error = %e,
                    "Failed to retire previous signing key"
                );
            }
        }

        let purged_key_ids = self.purge_expired(now).await;

        info!(
            target: "gatepass.rotation",
            new_key_id = %key.key_id,
            retired_key_id = ?previous,
            purged = purged_key_ids.len(),
            expires_at = %key.expires_at,
            "Signing key rotated"
        );

        Ok(RotationOutcome {
            new_key_id: key.key_id,
            retired_key_id: previous,
            purged_key_ids,
        })
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let candidates = match self.store.list_purgeable(now).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(target: "gatepass.rotation", error = %e, "Failed to list purgeable keys");
                return Vec::new();
            }
        };

        let mut purged = Vec::with_capacity(candidates.len());
        for key_id in candidates {
            match self.store.purge_key(&key_id).await {
                Ok(()) => purged.push(key_id),
                Err(e) => {
                    tracing::warn!(
                        target: "gatepass.rotation",
                        key_id = %key_id,
                        error = %e,
                        "Failed to purge signing key"
                    );
                }
            }
        }

        metrics::record_keys_purged(purged.len() as u64);
        purged
    }

    /// Rotation loop. Runs until `cancel_token` is cancelled.
    ///
    /// The first rotation happens one interval after the loop starts. Ticks
    /// are awaited inline, and a tick missed while a rotation was still
    /// running is skipped rather than replayed.
    pub async fn run(&self, cancel_token: CancellationToken) {
        let period = self.settings.rotation_interval();

        if let Err(e) = self.initialize().await {
            tracing::error!(
                target: "gatepass.rotation",
                error = %e,
                "Signing key initialization failed; retrying at next rotation"
            );
        }

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            target: "gatepass.rotation",
            rotation_interval_secs = period.as_secs(),
            grace_period_secs = self.settings.grace_period().as_secs(),
            "Key rotation scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.rotate().await {
                        tracing::error!(
                            target: "gatepass.rotation",
                            error = %e,
                            error_kind = e.kind().as_str(),
                            "Key rotation failed; previous key remains active"
                        );
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!(target: "gatepass.rotation", "Key rotation scheduler received shutdown signal, exiting");
                    break;
                }
            }
        }
    }
}
