//! Grace window behavior of retired keys
//!
//! A retired key keeps verifying until `activates_at + R + G` inclusive and
//! is unknown strictly after. Every step below is at most one rotation
//! interval so no scheduler tick is skipped.

use gatepass_service::errors::PassError;
use gatepass_service::models::KeyStatus;
use gatepass_service::repositories::KeyStore;
use gatepass_test_utils::{member_claims, minutes, scenario_settings, token_key_id, TestPassService};
use std::time::Duration;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Token signed just before a rotation: valid until its own expiry, then
/// expired while its key is still in grace, then unknown once the key's
/// deadline passes.
#[tokio::test(start_paused = true)]
async fn test_retired_key_verifies_until_deadline() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    harness.service.ensure_scheduler_started();

    // t0+2:59
    harness.time.advance(minutes(2) + secs(59)).await;
    let token = harness.service.issue(&member_claims("mem-2001"), minutes(5))?;
    let key_id = token_key_id(&token);

    // t0+3: rotation retires the signing key
    harness.time.advance(secs(1)).await;
    assert_eq!(harness.rotations_completed(), 1);
    assert_eq!(harness.status_of(&key_id).await, Some(KeyStatus::Retired));

    // t0+7:59: last second of the token's life
    harness.time.advance(minutes(4) + secs(59)).await;
    harness.service.validate(&token).await?;

    // t0+8: token expired, key still in grace
    harness.time.advance(secs(1)).await;
    let result = harness.service.validate(&token).await;
    assert!(
        matches!(result, Err(PassError::TokenExpired)),
        "Expected TokenExpired, got {:?}",
        result
    );

    // t0+13: the key's deadline; the key is still found
    harness.time.advance(minutes(3)).await;
    harness.time.advance(minutes(2)).await;
    let result = harness.service.validate(&token).await;
    assert!(
        matches!(result, Err(PassError::TokenExpired)),
        "Key should still verify at its deadline, got {:?}",
        result
    );

    // t0+13:01: past the deadline
    harness.time.advance(secs(1)).await;
    let result = harness.service.validate(&token).await;
    assert!(
        matches!(result, Err(PassError::UnknownKey)),
        "Expected UnknownKey, got {:?}",
        result
    );

    harness.shutdown().await;
    Ok(())
}

/// Passes signed by three different keys all validate during the overlap.
#[tokio::test(start_paused = true)]
async fn test_overlapping_keys_all_verify() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    harness.service.ensure_scheduler_started();

    // t0+2:30, signed by the initial key
    harness.time.advance(minutes(2) + secs(30)).await;
    let first = harness.service.issue(&member_claims("mem-1"), minutes(5))?;

    // t0+5, after the first rotation
    harness.time.advance(secs(30)).await;
    harness.time.advance(minutes(2)).await;
    let second = harness.service.issue(&member_claims("mem-2"), minutes(5))?;

    // t0+6:30, after the second rotation
    harness.time.advance(minutes(1) + secs(30)).await;
    let third = harness.service.issue(&member_claims("mem-3"), minutes(5))?;

    assert_eq!(harness.rotations_completed(), 2);
    let key_ids = [
        token_key_id(&first),
        token_key_id(&second),
        token_key_id(&third),
    ];
    assert_ne!(key_ids[0], key_ids[1]);
    assert_ne!(key_ids[1], key_ids[2]);
    assert_ne!(key_ids[0], key_ids[2]);

    // t0+7
    harness.time.advance(secs(30)).await;
    for (token, member) in [(&first, "mem-1"), (&second, "mem-2"), (&third, "mem-3")] {
        let claims = harness.service.validate(token).await?;
        assert_eq!(claims, member_claims(member));
    }

    assert!(harness.service.key_store().snapshot().len() >= 3);
    harness.assert_single_active_key().await;

    harness.shutdown().await;
    Ok(())
}

/// Key lifetime is fixed at creation; retiring does not extend or shorten it.
#[tokio::test(start_paused = true)]
async fn test_retirement_keeps_original_deadline() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let key_id = harness.active_key_id().await;

    let before = harness
        .backing_store()
        .get_key_by_id(&key_id)
        .await?
        .expect("initial key exists");

    harness.time.advance(minutes(1)).await;
    harness.service.scheduler().rotate().await?;

    let after = harness
        .backing_store()
        .get_key_by_id(&key_id)
        .await?
        .expect("retired key still stored");

    assert_eq!(after.status, KeyStatus::Retired);
    assert_eq!(after.expires_at, before.expires_at);
    assert_eq!(
        after.expires_at - after.activates_at,
        chrono::Duration::minutes(13)
    );
    Ok(())
}
