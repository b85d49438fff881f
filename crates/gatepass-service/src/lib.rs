//! Gate pass signing service library
//!
//! Issues and verifies short-lived signed tokens ("passes") embedded in
//! scannable codes, and manages the lifecycle of the HMAC keys that sign
//! them: scheduled rotation, a bounded grace window for retired keys, and
//! purging.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Token signing/verification and at-rest key encryption
//! - `errors` - Error types
//! - `models` - Signing keys and pass claims
//! - `observability` - Log targets and metrics
//! - `repositories` - Key store contract and backends
//! - `services` - Key cache, rotation scheduler, startup guard, signer,
//!   validator and the `PassService` facade

pub mod config;
pub mod crypto;
pub mod errors;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
