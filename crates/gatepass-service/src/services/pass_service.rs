//! Function-level boundary consumed by the surrounding application.
//!
//! [`PassService`] wires the cached key store, rotation scheduler, startup
//! guard, signer and validator together and exposes the three operations
//! request handlers need: `ensure_scheduler_started`, `issue` and `validate`.

use crate::config::RotationSettings;
use crate::errors::PassError;
use crate::models::Claims;
use crate::repositories::KeyStore;
use crate::services::key_cache::CachedKeyStore;
use crate::services::key_rotation::KeyRotationScheduler;
use crate::services::startup_guard::StartupGuard;
use crate::services::token_signer::TokenSigner;
use crate::services::token_validator::TokenValidator;
use common::clock::Clock;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct PassService {
    keys: Arc<CachedKeyStore>,
    startup: StartupGuard,
    signer: TokenSigner,
    validator: TokenValidator,
}

impl PassService {
    /// Wire the service over `store`. Loads the initial key snapshot but
    /// does not create keys or start the scheduler.
    ///
    /// # Errors
    ///
    /// `StoreRead` if the initial snapshot cannot be loaded.
    pub async fn build(
        store: Arc<dyn KeyStore>,
        clock: Arc<dyn Clock>,
        settings: RotationSettings,
    ) -> Result<Self, PassError> {
        let keys = Arc::new(CachedKeyStore::load(store).await?);
        let scheduler = Arc::new(KeyRotationScheduler::new(
            Arc::clone(&keys),
            Arc::clone(&clock),
            settings,
        ));

        Ok(Self {
            startup: StartupGuard::new(scheduler),
            signer: TokenSigner::new(Arc::clone(&keys), Arc::clone(&clock), settings),
            validator: TokenValidator::new(Arc::clone(&keys), clock),
            keys,
        })
    }

    /// Create the first signing key if the store has none.
    pub async fn initialize(&self) -> Result<Option<String>, PassError> {
        self.startup.scheduler().initialize().await
    }

    /// Start the rotation scheduler at most once per process. Safe to call
    /// from every initialization path.
    pub fn ensure_scheduler_started(&self) {
        self.startup.ensure_started();
    }

    /// Issue a token carrying `claims`, valid for `ttl`.
    pub fn issue(&self, claims: &Claims, ttl: Duration) -> Result<String, PassError> {
        self.signer.issue(claims, ttl)
    }

    /// Validate a token and return its claims.
    pub async fn validate(&self, token: &str) -> Result<Claims, PassError> {
        self.validator.validate(token).await
    }

    /// Stop the scheduler task, if running.
    pub async fn stop_scheduler(&self) {
        self.startup.stop().await;
    }

    pub fn scheduler(&self) -> &Arc<KeyRotationScheduler> {
        self.startup.scheduler()
    }

    pub fn startup_guard(&self) -> &StartupGuard {
        &self.startup
    }

    pub fn key_store(&self) -> &Arc<CachedKeyStore> {
        &self.keys
    }

    /// Largest TTL `issue` accepts.
    pub fn max_ttl(&self) -> Duration {
        self.signer.max_ttl()
    }
}
