use crate::config::RotationSettings;
use crate::crypto::{self, PassClaims};
use crate::errors::PassError;
use crate::models::Claims;
use crate::observability::metrics;
use crate::services::key_cache::CachedKeyStore;
use common::clock::Clock;
use common::secret::ExposeSecret;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Issues pass tokens with the current active key.
///
/// Reads only the in-process key snapshot; never touches the store.
#[derive(Debug)]
pub struct TokenSigner {
    keys: Arc<CachedKeyStore>,
    clock: Arc<dyn Clock>,
    max_ttl: Duration,
}

/// TTL in whole seconds, rounded up.
fn ceil_secs(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

impl TokenSigner {
    pub fn new(keys: Arc<CachedKeyStore>, clock: Arc<dyn Clock>, settings: RotationSettings) -> Self {
        Self {
            keys,
            clock,
            max_ttl: settings.max_issuable_ttl(),
        }
    }

    /// Largest TTL accepted by [`TokenSigner::issue`].
    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// Sign `claims` into a token valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// - `TtlTooLong` if `ttl` exceeds [`TokenSigner::max_ttl`]; nothing is
    ///   signed
    /// - `NoActiveKey` if no key has been activated yet
    /// - `ClaimsTooLarge` if the signed token would exceed
    ///   [`crypto::MAX_TOKEN_SIZE_BYTES`]
    #[instrument(skip_all)]
    pub fn issue(&self, claims: &Claims, ttl: Duration) -> Result<String, PassError> {
        let start = Instant::now();
        let result = self.issue_inner(claims, ttl);

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_token_issuance(status, start.elapsed());
        result
    }

    fn issue_inner(&self, claims: &Claims, ttl: Duration) -> Result<String, PassError> {
        if ttl > self.max_ttl {
            tracing::debug!(
                target: "gatepass.token",
                requested_secs = ceil_secs(ttl),
                max_secs = self.max_ttl.as_secs(),
                "Token issuance rejected: TTL too long"
            );
            return Err(PassError::TtlTooLong {
                requested_secs: ceil_secs(ttl),
                max_secs: self.max_ttl.as_secs(),
            });
        }

        let key = self.keys.cached_active_key()?;

        let iat = self.clock.now().timestamp();
        let ttl_secs = i64::try_from(ceil_secs(ttl))
            .map_err(|e| PassError::Internal(format!("TTL out of range: {}", e)))?;
        let exp = iat
            .checked_add(ttl_secs)
            .ok_or_else(|| PassError::Internal("Token expiry out of range".to_string()))?;

        let pass_claims = PassClaims {
            iat,
            exp,
            pass: claims.clone(),
        };

        let token = crypto::sign_token(&pass_claims, key.secret.expose_secret(), &key.key_id)?;

        // The validator refuses anything longer
        if token.len() > crypto::MAX_TOKEN_SIZE_BYTES {
            tracing::debug!(
                target: "gatepass.token",
                token_size = token.len(),
                max_size = crypto::MAX_TOKEN_SIZE_BYTES,
                "Token issuance rejected: signed token too large"
            );
            return Err(PassError::ClaimsTooLarge {
                token_bytes: token.len(),
                max_bytes: crypto::MAX_TOKEN_SIZE_BYTES,
            });
        }

        tracing::debug!(
            target: "gatepass.token",
            key_id = %key.key_id,
            claim_count = claims.len(),
            exp = exp,
            "Token issued"
        );
        Ok(token)
    }
}
