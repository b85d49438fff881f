//! Fault injection tests for key store failures during rotation
//!
//! Each test switches one store operation to fail and checks that:
//! - A failed rotation leaves the previous key Active and issuing
//! - The next tick after recovery rotates normally
//! - Cleanup failures (retire, purge, snapshot refresh) never fail a rotation

use chrono::Duration as ChronoDuration;
use gatepass_service::errors::PassError;
use gatepass_service::models::KeyStatus;
use gatepass_service::repositories::KeyStore;
use gatepass_test_utils::{
    member_claims, minutes, scenario_settings, t0, token_key_id, StoreOp, TestPassService,
    TokenAssertions,
};

#[tokio::test(start_paused = true)]
async fn test_insert_failure_keeps_previous_key_active() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let interval = harness.settings.rotation_interval();
    let original_key_id = harness.active_key_id().await;
    harness.service.ensure_scheduler_started();

    harness.store.set_failing(StoreOp::Insert, true);
    harness.time.advance(interval).await;

    assert_eq!(harness.rotations_failed(), 1);
    assert_eq!(harness.rotations_completed(), 0);
    assert_eq!(harness.active_key_id().await, original_key_id);
    harness.assert_single_active_key().await;

    // Issuance continues with the old key
    let token = harness.service.issue(&member_claims("mem-4001"), minutes(5))?;
    token.assert_signed_by(&original_key_id);
    harness.service.validate(&token).await?;

    // Next tick after recovery rotates
    harness.store.heal();
    harness.time.advance(interval).await;

    assert_eq!(harness.rotations_completed(), 1);
    assert_ne!(harness.active_key_id().await, original_key_id);
    assert_eq!(
        harness.status_of(&original_key_id).await,
        Some(KeyStatus::Retired)
    );
    harness.service.validate(&token).await?;

    harness.shutdown().await;
    Ok(())
}

/// An activation failure strands the new key as Pending; it never signs
/// or verifies and is purged once past its deadline.
#[tokio::test(start_paused = true)]
async fn test_activate_failure_leaves_orphan_pending_key() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let interval = harness.settings.rotation_interval();
    let original_key_id = harness.active_key_id().await;
    harness.service.ensure_scheduler_started();

    harness.store.set_failing(StoreOp::Activate, true);
    harness.time.advance(interval).await;

    assert_eq!(harness.rotations_failed(), 1);
    assert_eq!(harness.active_key_id().await, original_key_id);
    harness.assert_single_active_key().await;

    // The only key ever eligible for purge right now is the orphan
    let orphans = harness
        .backing_store()
        .list_purgeable(t0() + ChronoDuration::days(1))
        .await?;
    assert_eq!(orphans.len(), 1);
    let orphan_id = orphans.into_iter().next().expect("one orphan");
    assert_eq!(
        harness.status_of(&orphan_id).await,
        Some(KeyStatus::Pending)
    );
    assert!(harness.service.key_store().snapshot().get(&orphan_id).is_none());

    let token = harness.service.issue(&member_claims("mem-4002"), minutes(5))?;
    token.assert_signed_by(&original_key_id);

    // Orphan created at t0+3 expires at t0+16 and goes at the t0+18 tick
    harness.store.heal();
    harness
        .time
        .advance_in_steps(interval * 5, interval)
        .await;

    assert_eq!(harness.rotations_completed(), 5);
    assert_eq!(harness.status_of(&orphan_id).await, Some(KeyStatus::Purged));
    harness.assert_single_active_key().await;

    harness.shutdown().await;
    Ok(())
}

/// Activation already demotes the previous key, so a failed explicit
/// retire is logged and the rotation still counts.
#[tokio::test(start_paused = true)]
async fn test_retire_failure_does_not_fail_rotation() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let interval = harness.settings.rotation_interval();
    let original_key_id = harness.active_key_id().await;
    harness.service.ensure_scheduler_started();

    harness.store.set_failing(StoreOp::Retire, true);
    harness.time.advance(interval).await;

    assert_eq!(harness.rotations_completed(), 1);
    assert_eq!(harness.rotations_failed(), 0);
    assert!(harness.store.call_count(StoreOp::Retire) >= 1);
    assert_eq!(
        harness.status_of(&original_key_id).await,
        Some(KeyStatus::Retired)
    );
    harness.assert_single_active_key().await;

    harness.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_purge_failure_does_not_fail_rotation() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let interval = harness.settings.rotation_interval();
    let original_key_id = harness.active_key_id().await;
    harness.service.ensure_scheduler_started();

    // The first key expires at t0+13 and becomes purgeable at the t0+15 tick
    harness.store.set_failing(StoreOp::Purge, true);
    harness.time.advance_in_steps(interval * 5, interval).await;

    assert_eq!(harness.rotations_completed(), 5);
    assert_eq!(harness.rotations_failed(), 0);
    assert!(harness.store.call_count(StoreOp::Purge) >= 1);
    assert_eq!(
        harness.status_of(&original_key_id).await,
        Some(KeyStatus::Retired)
    );

    // Past its deadline the key is unusable even though it is still stored
    let stale = harness
        .service
        .key_store()
        .verification_key(&original_key_id)
        .await?
        .expect("key still stored");
    assert!(!stale.can_verify_at(harness.time.now()));

    harness.store.heal();
    harness.time.advance(interval).await;

    assert_eq!(
        harness.status_of(&original_key_id).await,
        Some(KeyStatus::Purged)
    );

    harness.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_list_purgeable_failure_does_not_fail_rotation() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let interval = harness.settings.rotation_interval();
    harness.service.ensure_scheduler_started();

    harness.store.set_failing(StoreOp::ListPurgeable, true);
    harness.time.advance_in_steps(interval * 2, interval).await;

    assert_eq!(harness.rotations_completed(), 2);
    assert_eq!(harness.rotations_failed(), 0);
    assert_eq!(harness.store.call_count(StoreOp::ListPurgeable), 2);

    harness.shutdown().await;
    Ok(())
}

/// When the snapshot cannot be refreshed the service keeps serving from
/// the last-known-good one, then catches up after recovery.
#[tokio::test(start_paused = true)]
async fn test_snapshot_refresh_failure_keeps_last_known_good() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let interval = harness.settings.rotation_interval();
    let original_key_id = harness.active_key_id().await;
    harness.service.ensure_scheduler_started();

    harness.store.set_failing(StoreOp::ListVerification, true);
    harness.time.advance(interval).await;

    // The store rotated, the snapshot did not
    assert_eq!(harness.rotations_completed(), 1);
    let stored_active_key_id = harness.active_key_id().await;
    assert_ne!(stored_active_key_id, original_key_id);
    harness.assert_single_active_key().await;

    let token = harness.service.issue(&member_claims("mem-4003"), minutes(5))?;
    token.assert_signed_by(&original_key_id);
    harness.service.validate(&token).await?;

    harness.store.heal();
    harness.time.advance(interval).await;

    assert_eq!(harness.rotations_completed(), 2);
    let current_key_id = harness.active_key_id().await;
    let fresh = harness.service.issue(&member_claims("mem-4004"), minutes(5))?;
    fresh.assert_signed_by(&current_key_id);
    harness.assert_single_active_key().await;

    // The key activated while the snapshot was stale was demoted normally
    assert_eq!(
        harness.status_of(&stored_active_key_id).await,
        Some(KeyStatus::Retired)
    );
    harness.service.validate(&token).await?;

    harness.shutdown().await;
    Ok(())
}

/// A store outage on a snapshot miss is reported as a store error rather
/// than disguised as an unknown key.
#[tokio::test(start_paused = true)]
async fn test_lookup_failure_on_snapshot_miss_is_store_error() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let other = TestPassService::start(scenario_settings()).await?;

    let foreign = other.service.issue(&member_claims("mem-4005"), minutes(5))?;
    let ours = harness.service.issue(&member_claims("mem-4005"), minutes(5))?;

    harness.store.set_failing(StoreOp::GetById, true);

    let result = harness.service.validate(&foreign).await;
    assert!(
        matches!(result, Err(PassError::StoreRead(_))),
        "Expected StoreRead, got {:?}",
        result
    );
    assert!(!result.unwrap_err().is_validation_failure());

    // Keys already in the snapshot never touch the store
    harness.service.validate(&ours).await?;
    assert_eq!(token_key_id(&ours), harness.active_key_id().await);
    Ok(())
}
