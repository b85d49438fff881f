//! Observability for the pass service.
//!
//! Logging uses `tracing` with literal targets so operators can filter by
//! concern, e.g. `RUST_LOG=gatepass_service=info,gatepass.rotation=debug`:
//! - `gatepass.rotation`: rotation scheduler
//! - `gatepass.startup`: scheduler startup and shutdown
//! - `gatepass.token`: issuance and validation
//! - `gatepass.store`: key store backends
//! - `gatepass.cache`: in-process key snapshot
//! - `gatepass.crypto`: signing and at-rest encryption
//!
//! # Privacy by Default
//!
//! Entry points use `#[instrument(skip_all)]` and log an explicit allow-list
//! of fields:
//! - **SAFE**: key ids, key status, error kinds, durations, counts
//! - **NEVER**: key material, master key, token strings, claim values

pub mod metrics;
