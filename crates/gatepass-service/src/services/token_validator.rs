use crate::crypto;
use crate::errors::PassError;
use crate::models::Claims;
use crate::observability::metrics;
use crate::services::key_cache::CachedKeyStore;
use chrono::DateTime;
use common::clock::Clock;
use common::secret::ExposeSecret;
use std::sync::Arc;
use tracing::instrument;

/// Verifies pass tokens against the active key or any retired key still
/// inside its grace window.
#[derive(Debug)]
pub struct TokenValidator {
    keys: Arc<CachedKeyStore>,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    pub fn new(keys: Arc<CachedKeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    /// Validate `token` and return the caller claims it carries.
    ///
    /// Checks run in a fixed order: decode, key lookup, signature, expiry.
    /// Nothing in the token is trusted until the signature has been verified.
    ///
    /// # Errors
    ///
    /// - `MalformedToken` if the token cannot be decoded
    /// - `UnknownKey` if the key never existed, was purged or is past its
    ///   grace deadline (indistinguishable)
    /// - `SignatureMismatch` if the signature does not verify
    /// - `TokenExpired` if the token's expiry has passed
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<Claims, PassError> {
        let result = self.validate_inner(token).await;

        match &result {
            Ok(_) => metrics::record_token_validation("success", None),
            Err(e) => {
                tracing::debug!(
                    target: "gatepass.token",
                    error_kind = e.kind().as_str(),
                    "Token validation failed"
                );
                metrics::record_token_validation("error", Some(e.kind().as_str()));
            }
        }
        result
    }

    async fn validate_inner(&self, token: &str) -> Result<Claims, PassError> {
        let key_id = crypto::extract_token_kid(token)?;

        let now = self.clock.now();
        let key = self
            .keys
            .verification_key(&key_id)
            .await?
            .filter(|key| key.can_verify_at(now))
            .ok_or(PassError::UnknownKey)?;

        let pass_claims = crypto::verify_token_signature(token, key.secret.expose_secret())?;

        let expires_at =
            DateTime::from_timestamp(pass_claims.exp, 0).ok_or(PassError::MalformedToken)?;
        if now > expires_at {
            return Err(PassError::TokenExpired);
        }

        tracing::debug!(target: "gatepass.token", key_id = %key.key_id, "Token validated");
        Ok(pass_claims.pass)
    }
}
