//! Deterministic key fixtures for testing
//!
//! All fixtures are deterministic based on seed values, so a failing test
//! reproduces exactly.

use chrono::{DateTime, TimeZone, Utc};
use common::secret::SecretBox;
use gatepass_service::config::RotationSettings;
use gatepass_service::models::{Claims, KeyStatus, SigningKey};
use std::time::Duration;

/// Fixed start instant for simulated-time tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("valid fixed timestamp")
}

/// Deterministic 32-byte HMAC secret.
///
/// The same seed always produces the same bytes; different seeds never
/// collide.
pub fn test_secret(seed: u8) -> SecretBox<Vec<u8>> {
    let bytes = (0u8..32)
        .map(|i| seed.wrapping_mul(31).wrapping_add(i.wrapping_mul(7)) ^ 0x5a)
        .collect();
    SecretBox::new(Box::new(bytes))
}

/// Deterministic 32-byte master key for at-rest encryption tests.
pub fn test_master_key() -> Vec<u8> {
    (0u8..32).collect()
}

/// Signing key with id `pk-test-<seed>` valid from `activates_at` for
/// `lifetime`.
pub fn test_signing_key(
    seed: u8,
    status: KeyStatus,
    activates_at: DateTime<Utc>,
    lifetime: chrono::Duration,
) -> SigningKey {
    SigningKey {
        key_id: format!("pk-test-{:02}", seed),
        secret: test_secret(seed),
        created_at: activates_at,
        activates_at,
        expires_at: activates_at + lifetime,
        status,
    }
}

/// Settings of the worked example: R = 3 min, G = 10 min, max TTL 5 min,
/// margin 1 min.
pub fn scenario_settings() -> RotationSettings {
    RotationSettings::new(
        Duration::from_secs(3 * 60),
        Duration::from_secs(10 * 60),
        Duration::from_secs(5 * 60),
        Duration::from_secs(60),
    )
    .expect("scenario settings are valid")
}

/// Claims a gate scanner would expect on a member's pass.
pub fn member_claims(membership_id: &str) -> Claims {
    Claims::new()
        .with("membership_id", membership_id)
        .with("scope", "gate:enter")
        .with("venue", "north-stand")
}
