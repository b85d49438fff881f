//! Idempotent start of the rotation scheduler.
//!
//! [`StartupGuard`] is constructed once per process and shared by reference
//! with every initialization path. The first caller of
//! [`StartupGuard::ensure_started`] wins a compare-and-swap on the guard's
//! state and spawns the scheduler task; everyone else returns immediately.

use crate::services::key_rotation::KeyRotationScheduler;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const NOT_STARTED: u8 = 0;
const STARTED: u8 = 1;

struct RunningScheduler {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

pub struct StartupGuard {
    scheduler: Arc<KeyRotationScheduler>,
    state: AtomicU8,
    running: Mutex<Option<RunningScheduler>>,
}

impl std::fmt::Debug for StartupGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupGuard")
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl StartupGuard {
    pub fn new(scheduler: Arc<KeyRotationScheduler>) -> Self {
        Self {
            scheduler,
            state: AtomicU8::new(NOT_STARTED),
            running: Mutex::new(None),
        }
    }

    pub fn scheduler(&self) -> &Arc<KeyRotationScheduler> {
        &self.scheduler
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningScheduler>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the scheduler unless it is already running.
    ///
    /// Safe to call from any number of initialization paths, concurrently.
    /// Must be called from within a Tokio runtime; otherwise nothing is
    /// started, an error is logged and a later call may try again.
    pub fn ensure_started(&self) {
        if self.is_started() {
            tracing::debug!(target: "gatepass.startup", "Key rotation scheduler already started");
            return;
        }

        // Held until the handle is stored so stop() never sees STARTED
        // without a task to cancel.
        let mut running = self.lock_running();

        if self
            .state
            .compare_exchange(NOT_STARTED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(target: "gatepass.startup", "Key rotation scheduler already started");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(
                    target: "gatepass.startup",
                    error = %e,
                    "Cannot start key rotation scheduler outside a Tokio runtime"
                );
                self.state.store(NOT_STARTED, Ordering::Release);
                return;
            }
        };

        let cancel_token = CancellationToken::new();
        let scheduler = Arc::clone(&self.scheduler);
        let task_token = cancel_token.clone();
        let handle = runtime.spawn(async move { scheduler.run(task_token).await });

        *running = Some(RunningScheduler {
            handle,
            cancel_token,
        });

        info!(target: "gatepass.startup", "Key rotation scheduler spawned");
    }

    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) == STARTED
    }

    /// Cancel the scheduler task, wait for it to exit and allow a later
    /// [`StartupGuard::ensure_started`] to start a new one.
    pub async fn stop(&self) {
        let running = {
            let mut running = self.lock_running();
            let taken = running.take();
            if let Some(taken) = &taken {
                taken.cancel_token.cancel();
            }
            self.state.store(NOT_STARTED, Ordering::Release);
            taken
        };

        if let Some(running) = running {
            if let Err(e) = running.handle.await {
                tracing::error!(target: "gatepass.startup", error = %e, "Key rotation scheduler task failed");
            }
            info!(target: "gatepass.startup", "Key rotation scheduler stopped");
        }
    }
}
