//! Simulated time for rotation tests
//!
//! The service reads wall-clock time through a [`ManualClock`] while the
//! rotation scheduler sleeps on Tokio timers. [`SimulatedTime`] advances
//! both together so key timestamps and timer ticks never drift apart.
//!
//! Tests using it must run with `#[tokio::test(start_paused = true)]`.

use chrono::{DateTime, Utc};
use common::clock::{Clock, ManualClock};
use std::sync::Arc;
use std::time::Duration;

/// Number of scheduler yields after each time jump; enough for a rotation
/// against an in-memory store to run to completion.
const SETTLE_YIELDS: usize = 32;

#[derive(Debug, Clone)]
pub struct SimulatedTime {
    clock: Arc<ManualClock>,
}

impl SimulatedTime {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            clock: Arc::new(ManualClock::new(start)),
        }
    }

    /// Clock to hand to the service.
    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Let spawned tasks run until they block on a timer.
    pub async fn settle(&self) {
        for _ in 0..SETTLE_YIELDS {
            tokio::task::yield_now().await;
        }
    }

    /// Move both clocks forward by `by` in one jump.
    ///
    /// A timer that would have fired more than once inside `by` fires once;
    /// use [`SimulatedTime::advance_in_steps`] to observe every tick.
    pub async fn advance(&self, by: Duration) {
        self.settle().await;
        let delta = chrono::Duration::from_std(by).expect("duration out of range");
        self.clock.advance(delta);
        tokio::time::advance(by).await;
        self.settle().await;
    }

    /// Move forward by `total` in increments of at most `step`.
    pub async fn advance_in_steps(&self, total: Duration, step: Duration) {
        assert!(!step.is_zero(), "step must be non-zero");
        let mut remaining = total;
        while !remaining.is_zero() {
            let next = remaining.min(step);
            self.advance(next).await;
            remaining -= next;
        }
    }
}

/// Shorthand for whole minutes.
pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}
