//! # Gate Pass Test Utilities
//!
//! Shared test utilities for the gate pass service.
//!
//! This crate provides:
//! - Simulated time (`SimulatedTime`): one handle that moves both the
//!   service clock and Tokio's paused clock
//! - Deterministic key fixtures and rotation settings
//! - Fault injection (`FlakyKeyStore`) for store failures during rotation
//! - Custom assertions (`TokenAssertions` trait) and token tampering helpers
//! - Service harness (`TestPassService`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gatepass_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = TestPassService::start(scenario_settings()).await?;
//!
//!     let token = harness.service.issue(&member_claims("mem-1"), minutes(5))?;
//!     token.assert_valid_pass_token().assert_expires_in(300);
//!
//!     harness.time.advance(minutes(2)).await;
//!     assert_eq!(harness.service.validate(&token).await?, member_claims("mem-1"));
//! }
//! ```

pub mod assertions;
pub mod flaky_store;
pub mod key_fixtures;
pub mod pass_harness;
pub mod simulated_time;

// Re-export commonly used items
pub use assertions::*;
pub use flaky_store::*;
pub use key_fixtures::*;
pub use pass_harness::*;
pub use simulated_time::*;
