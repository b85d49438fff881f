//! Service test harness
//!
//! Provides [`TestPassService`]: a fully wired [`PassService`] over an
//! in-memory (optionally fault-injecting) store, driven by simulated time.

use crate::flaky_store::FlakyKeyStore;
use crate::key_fixtures::t0;
use crate::simulated_time::SimulatedTime;
use gatepass_service::config::RotationSettings;
use gatepass_service::errors::PassError;
use gatepass_service::models::KeyStatus;
use gatepass_service::repositories::memory::InMemoryKeyStore;
use gatepass_service::repositories::KeyStore;
use gatepass_service::services::pass_service::PassService;
use std::sync::Arc;

/// Test harness for exercising the pass service end to end
///
/// # Example
/// ```rust,ignore
/// #[tokio::test(start_paused = true)]
/// async fn test_rotation() -> Result<(), anyhow::Error> {
///     let harness = TestPassService::start(scenario_settings()).await?;
///     harness.service.ensure_scheduler_started();
///
///     harness.time.advance(minutes(3)).await;
///     assert_eq!(harness.service.scheduler().rotations_completed(), 1);
///     Ok(())
/// }
/// ```
pub struct TestPassService {
    pub service: PassService,
    pub time: SimulatedTime,
    pub store: Arc<FlakyKeyStore>,
    pub settings: RotationSettings,
}

impl TestPassService {
    /// Build the service at [`t0`] and create its first key.
    pub async fn start(settings: RotationSettings) -> Result<Self, PassError> {
        let harness = Self::build(settings).await?;
        harness.service.initialize().await?;
        Ok(harness)
    }

    /// Build the service at [`t0`] without creating any key.
    pub async fn build(settings: RotationSettings) -> Result<Self, PassError> {
        let time = SimulatedTime::new(t0());
        let store = Arc::new(FlakyKeyStore::default());
        let service = PassService::build(
            Arc::clone(&store) as Arc<dyn KeyStore>,
            time.clock(),
            settings,
        )
        .await?;

        Ok(Self {
            service,
            time,
            store,
            settings,
        })
    }

    /// The in-memory store underneath the fault injection layer.
    pub fn backing_store(&self) -> &Arc<InMemoryKeyStore> {
        self.store.inner()
    }

    /// Id of the Active key according to the backing store.
    pub async fn active_key_id(&self) -> String {
        self.backing_store()
            .get_active_key()
            .await
            .expect("store has an active key")
            .key_id
    }

    pub async fn status_of(&self, key_id: &str) -> Option<KeyStatus> {
        self.backing_store().status_of(key_id).await
    }

    /// Assert exactly one Active key exists in the store.
    pub async fn assert_single_active_key(&self) {
        assert_eq!(
            self.backing_store().active_count().await,
            1,
            "Expected exactly one active signing key"
        );
    }

    pub fn rotations_completed(&self) -> u64 {
        self.service.scheduler().rotations_completed()
    }

    pub fn rotations_failed(&self) -> u64 {
        self.service.scheduler().rotations_failed()
    }

    /// Stop the scheduler task, if running.
    pub async fn shutdown(&self) {
        self.service.stop_scheduler().await;
    }
}
