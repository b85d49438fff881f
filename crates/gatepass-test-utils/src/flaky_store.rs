//! Fault-injecting key store
//!
//! [`FlakyKeyStore`] wraps an [`InMemoryKeyStore`] and fails selected
//! operations on demand, so tests can drive rotation through store outages.
//! Operations can also be slowed down to simulate a store that stalls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatepass_service::errors::PassError;
use gatepass_service::models::SigningKey;
use gatepass_service::repositories::memory::InMemoryKeyStore;
use gatepass_service::repositories::KeyStore;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    GetActive,
    GetById,
    Insert,
    Activate,
    Retire,
    Purge,
    ListPurgeable,
    ListVerification,
}

const OP_COUNT: usize = 8;

impl StoreOp {
    fn index(self) -> usize {
        match self {
            StoreOp::GetActive => 0,
            StoreOp::GetById => 1,
            StoreOp::Insert => 2,
            StoreOp::Activate => 3,
            StoreOp::Retire => 4,
            StoreOp::Purge => 5,
            StoreOp::ListPurgeable => 6,
            StoreOp::ListVerification => 7,
        }
    }

    fn is_write(self) -> bool {
        matches!(
            self,
            StoreOp::Insert | StoreOp::Activate | StoreOp::Retire | StoreOp::Purge
        )
    }
}

/// In-memory store with per-operation failure switches, delays and call
/// counters.
#[derive(Debug)]
pub struct FlakyKeyStore {
    inner: Arc<InMemoryKeyStore>,
    failing: [AtomicBool; OP_COUNT],
    delays_ms: [AtomicU64; OP_COUNT],
    calls: [AtomicUsize; OP_COUNT],
    in_flight: [AtomicUsize; OP_COUNT],
    max_in_flight: [AtomicUsize; OP_COUNT],
}

impl Default for FlakyKeyStore {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryKeyStore::new()))
    }
}

impl FlakyKeyStore {
    pub fn new(inner: Arc<InMemoryKeyStore>) -> Self {
        Self {
            inner,
            failing: Default::default(),
            delays_ms: Default::default(),
            calls: Default::default(),
            in_flight: Default::default(),
            max_in_flight: Default::default(),
        }
    }

    /// The wrapped store, for inspecting state the faults did not touch.
    pub fn inner(&self) -> &Arc<InMemoryKeyStore> {
        &self.inner
    }

    /// Make `op` fail (or succeed again) on every subsequent call.
    pub fn set_failing(&self, op: StoreOp, failing: bool) {
        self.failing[op.index()].store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent call to `op` sleep for `delay` (Tokio time)
    /// before reaching the wrapped store. A zero delay turns it off.
    ///
    /// The delay is read when a call starts, so clearing it does not
    /// shorten a call already sleeping.
    pub fn set_delay(&self, op: StoreOp, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delays_ms[op.index()].store(millis, Ordering::SeqCst);
    }

    /// Clear every failure switch and delay.
    pub fn heal(&self) {
        for flag in &self.failing {
            flag.store(false, Ordering::SeqCst);
        }
        for delay in &self.delays_ms {
            delay.store(0, Ordering::SeqCst);
        }
    }

    /// Number of calls made to `op`, failed ones included.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Highest number of calls to `op` ever in progress at the same time.
    pub fn max_in_flight(&self, op: StoreOp) -> usize {
        self.max_in_flight[op.index()].load(Ordering::SeqCst)
    }

    fn check_failing(&self, op: StoreOp) -> Result<(), PassError> {
        if !self.failing[op.index()].load(Ordering::SeqCst) {
            return Ok(());
        }

        let message = format!("injected {:?} failure", op);
        if op.is_write() {
            Err(PassError::StoreWrite(message))
        } else {
            Err(PassError::StoreRead(message))
        }
    }

    /// Count the call, apply any injected failure or delay, then run the
    /// wrapped operation.
    async fn call<T, F>(&self, op: StoreOp, inner: F) -> Result<T, PassError>
    where
        F: Future<Output = Result<T, PassError>>,
    {
        let i = op.index();
        self.calls[i].fetch_add(1, Ordering::SeqCst);
        self.check_failing(op)?;

        let now_in_flight = self.in_flight[i].fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight[i].fetch_max(now_in_flight, Ordering::SeqCst);

        let delay_ms = self.delays_ms[i].load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        let result = inner.await;

        self.in_flight[i].fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl KeyStore for FlakyKeyStore {
    async fn get_active_key(&self) -> Result<SigningKey, PassError> {
        self.call(StoreOp::GetActive, self.inner.get_active_key())
            .await
    }

    async fn get_key_by_id(&self, key_id: &str) -> Result<Option<SigningKey>, PassError> {
        self.call(StoreOp::GetById, self.inner.get_key_by_id(key_id))
            .await
    }

    async fn insert_key(&self, key: &SigningKey) -> Result<(), PassError> {
        self.call(StoreOp::Insert, self.inner.insert_key(key)).await
    }

    async fn activate_key(&self, key_id: &str) -> Result<(), PassError> {
        self.call(StoreOp::Activate, self.inner.activate_key(key_id))
            .await
    }

    async fn retire_key(&self, key_id: &str) -> Result<(), PassError> {
        self.call(StoreOp::Retire, self.inner.retire_key(key_id))
            .await
    }

    async fn purge_key(&self, key_id: &str) -> Result<(), PassError> {
        self.call(StoreOp::Purge, self.inner.purge_key(key_id)).await
    }

    async fn list_purgeable(&self, now: DateTime<Utc>) -> Result<Vec<String>, PassError> {
        self.call(StoreOp::ListPurgeable, self.inner.list_purgeable(now))
            .await
    }

    async fn list_verification_keys(&self) -> Result<Vec<SigningKey>, PassError> {
        self.call(
            StoreOp::ListVerification,
            self.inner.list_verification_keys(),
        )
        .await
    }
}
