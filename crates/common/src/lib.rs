//! Common utilities shared across the gate pass crates.

#![warn(clippy::pedantic)]

/// Module for wall-clock abstraction (system and manually driven clocks)
pub mod clock;

/// Module for secret types that prevent accidental logging
pub mod secret;
