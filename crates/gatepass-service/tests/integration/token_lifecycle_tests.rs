//! Token lifecycle across key rotations
//!
//! Runs with R = 3 min, G = 10 min and a 5 min token TTL (see
//! `scenario_settings`), all measured from `t0`.

use gatepass_service::crypto::MAX_TOKEN_SIZE_BYTES;
use gatepass_service::errors::PassError;
use gatepass_service::models::{Claims, KeyStatus};
use gatepass_test_utils::{
    corrupt_last_signature_byte, flip_signature_bit, member_claims, minutes, scenario_settings,
    signature_bit_len, token_key_id, TestPassService, TokenAssertions,
};
use serde_json::json;
use std::time::Duration;

/// A pass issued at t0 validates two minutes later with identical claims.
#[tokio::test(start_paused = true)]
async fn test_issued_pass_validates_within_ttl() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let active_key_id = harness.active_key_id().await;

    let token = harness.service.issue(&member_claims("mem-1001"), minutes(5))?;
    token
        .assert_valid_pass_token()
        .assert_signed_by(&active_key_id)
        .assert_expires_in(300)
        .assert_has_claim("membership_id", "mem-1001");

    harness.time.advance(minutes(2)).await;

    let claims = harness.service.validate(&token).await?;
    assert_eq!(claims, member_claims("mem-1001"));
    Ok(())
}

/// A rotation at t0+3 leaves the t0 pass valid at t0+4, and new passes
/// are signed with the new key.
#[tokio::test(start_paused = true)]
async fn test_pass_survives_rotation() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    harness.service.ensure_scheduler_started();
    let first_key_id = harness.active_key_id().await;

    let token = harness.service.issue(&member_claims("mem-1001"), minutes(5))?;

    harness.time.advance(minutes(3)).await;

    assert_eq!(harness.rotations_completed(), 1);
    let second_key_id = harness.active_key_id().await;
    assert_ne!(second_key_id, first_key_id, "Rotation should activate a new key");
    assert_eq!(
        harness.status_of(&first_key_id).await,
        Some(KeyStatus::Retired)
    );

    harness.time.advance(minutes(1)).await;

    assert_eq!(token_key_id(&token), first_key_id);
    let claims = harness.service.validate(&token).await?;
    assert_eq!(claims, member_claims("mem-1001"));

    let fresh = harness.service.issue(&member_claims("mem-1002"), minutes(5))?;
    fresh.assert_signed_by(&second_key_id);

    harness.shutdown().await;
    Ok(())
}

/// Past the retired key's grace deadline the pass fails as unknown key,
/// before its own expiry is even considered.
#[tokio::test(start_paused = true)]
async fn test_pass_rejected_after_grace_deadline() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    harness.service.ensure_scheduler_started();

    let token = harness.service.issue(&member_claims("mem-1001"), minutes(5))?;

    harness
        .time
        .advance_in_steps(minutes(14), harness.settings.rotation_interval())
        .await;

    let result = harness.service.validate(&token).await;
    assert!(
        matches!(result, Err(PassError::UnknownKey)),
        "Expected UnknownKey, got {:?}",
        result
    );

    // Once purged the answer is the same
    harness.time.advance(minutes(1)).await;
    assert_eq!(
        harness.status_of(&token_key_id(&token)).await,
        Some(KeyStatus::Purged)
    );
    let result = harness.service.validate(&token).await;
    assert!(matches!(result, Err(PassError::UnknownKey)));

    harness.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_corrupted_signature_rejected() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;

    let token = harness.service.issue(&member_claims("mem-1001"), minutes(5))?;
    let tampered = corrupt_last_signature_byte(&token);

    let result = harness.service.validate(&tampered).await;
    assert!(
        matches!(result, Err(PassError::SignatureMismatch)),
        "Expected SignatureMismatch, got {:?}",
        result
    );
    Ok(())
}

/// Flipping any single signature bit yields a signature mismatch.
#[tokio::test(start_paused = true)]
async fn test_every_signature_bit_flip_rejected() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let token = harness.service.issue(&member_claims("mem-1001"), minutes(5))?;

    let bits = signature_bit_len(&token);
    assert_eq!(bits, 256);

    for bit in 0..bits {
        let result = harness
            .service
            .validate(&flip_signature_bit(&token, bit))
            .await;
        assert!(
            matches!(result, Err(PassError::SignatureMismatch)),
            "Flipping bit {} should fail with SignatureMismatch, got {:?}",
            bit,
            result
        );
    }

    // Untampered token still fine
    harness.service.validate(&token).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_ttl_above_maximum_rejected() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;

    let result = harness
        .service
        .issue(&member_claims("mem-1001"), minutes(5) + Duration::from_secs(1));

    match result {
        Err(PassError::TtlTooLong {
            requested_secs,
            max_secs,
        }) => {
            assert_eq!(requested_secs, 301);
            assert_eq!(max_secs, 300);
        }
        other => panic!("Expected TtlTooLong, got {:?}", other),
    }
    Ok(())
}

/// Fractional TTLs round up to whole seconds.
#[tokio::test(start_paused = true)]
async fn test_fractional_ttl_rounds_up() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;

    let token = harness
        .service
        .issue(&member_claims("mem-1001"), Duration::from_millis(59_500))?;

    token.assert_expires_in(60);
    Ok(())
}

/// The expiry instant itself is still valid; one second later is not.
#[tokio::test(start_paused = true)]
async fn test_pass_expiry_boundary() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;
    let token = harness.service.issue(&member_claims("mem-1001"), minutes(1))?;

    harness.time.advance(minutes(1)).await;
    harness.service.validate(&token).await?;

    harness.time.advance(Duration::from_secs(1)).await;
    let result = harness.service.validate(&token).await;
    assert!(
        matches!(result, Err(PassError::TokenExpired)),
        "Expected TokenExpired, got {:?}",
        result
    );
    Ok(())
}

/// Arbitrary JSON claim values come back unchanged, including names that
/// collide with the token's own timestamps.
#[tokio::test(start_paused = true)]
async fn test_claims_round_trip_unchanged() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;

    let claims = Claims::new()
        .with("membership_id", "mem-1001")
        .with("exp", 1)
        .with("iat", "not a timestamp")
        .with("seats", json!(["A12", "A13"]))
        .with("holder", json!({ "name": "Ada", "tier": 3, "guest": null }))
        .with("balance", 12.5)
        .with("vip", true);

    let token = harness.service.issue(&claims, minutes(5))?;
    token.assert_expires_in(300).assert_has_claim("exp", 1);

    let validated = harness.service.validate(&token).await?;
    assert_eq!(validated, claims);

    let empty = harness.service.issue(&Claims::new(), minutes(5))?;
    assert!(harness.service.validate(&empty).await?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_garbage_token_is_malformed() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;

    for token in ["", "abc", "a.b", "a.b.c", "a.b.c.d"] {
        let result = harness.service.validate(token).await;
        assert!(
            matches!(result, Err(PassError::MalformedToken)),
            "Expected MalformedToken for {:?}, got {:?}",
            token,
            result
        );
    }
    Ok(())
}

/// A well-formed token naming a key this service never created.
#[tokio::test(start_paused = true)]
async fn test_token_from_foreign_service_is_unknown_key() -> Result<(), anyhow::Error> {
    let ours = TestPassService::start(scenario_settings()).await?;
    let theirs = TestPassService::start(scenario_settings()).await?;

    let token = theirs.service.issue(&member_claims("mem-1001"), minutes(5))?;

    let result = ours.service.validate(&token).await;
    assert!(
        matches!(result, Err(PassError::UnknownKey)),
        "Expected UnknownKey, got {:?}",
        result
    );
    Ok(())
}

/// The largest pass the service will issue still validates; one claim byte
/// more is refused at issuance instead of producing an unverifiable token.
#[tokio::test(start_paused = true)]
async fn test_largest_issuable_pass_round_trips() -> Result<(), anyhow::Error> {
    let harness = TestPassService::start(scenario_settings()).await?;

    let oversized = Claims::new().with("note", "x".repeat(3500));
    let result = harness.service.issue(&oversized, minutes(1));
    assert!(
        matches!(result, Err(PassError::ClaimsTooLarge { .. })),
        "Expected ClaimsTooLarge, got {:?}",
        result
    );

    let mut len = 3500;
    let (token, claims) = loop {
        len -= 1;
        let claims = Claims::new().with("note", "x".repeat(len));
        match harness.service.issue(&claims, minutes(1)) {
            Ok(token) => break (token, claims),
            Err(PassError::ClaimsTooLarge { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    };

    assert!(token.len() <= MAX_TOKEN_SIZE_BYTES);
    assert!(token.len() > MAX_TOKEN_SIZE_BYTES - 4);
    assert_eq!(harness.service.validate(&token).await?, claims);
    Ok(())
}
