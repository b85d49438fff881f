use crate::errors::PassError;
use crate::models::Claims;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::secret::{ExposeSecret, SecretBox};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM},
    rand::{SecureRandom, SystemRandom},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;
use uuid::Uuid;

/// Length of HMAC-SHA256 key material in bytes.
pub const SIGNING_SECRET_LEN: usize = 32;

/// Length of the AES-256-GCM master key used to encrypt key material at rest.
pub const MASTER_KEY_LEN: usize = 32;

/// Maximum accepted token size in bytes.
///
/// A pass token is roughly 200-300 bytes (header with key id, a handful of
/// claims, 43-character signature). Anything past 4KB cannot have been issued
/// here and is rejected before any base64 decoding or HMAC work.
pub const MAX_TOKEN_SIZE_BYTES: usize = 4096;

/// Signed payload of a pass token.
///
/// `iat`/`exp` are Unix seconds. Caller claims live under `pass` so they can
/// never shadow the timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassClaims {
    pub iat: i64,
    pub exp: i64,
    pub pass: Claims,
}

/// Key material encrypted with AES-256-GCM.
///
/// Debug is manually implemented to redact everything; Clone because
/// `SecretBox` requires explicit cloning.
pub struct EncryptedSecret {
    pub encrypted_data: SecretBox<Vec<u8>>,
    pub nonce: Vec<u8>, // 96-bit (12 bytes)
    pub tag: Vec<u8>,   // 128-bit (16 bytes)
}

impl Clone for EncryptedSecret {
    fn clone(&self) -> Self {
        Self {
            encrypted_data: SecretBox::new(Box::new(self.encrypted_data.expose_secret().clone())),
            nonce: self.nonce.clone(),
            tag: self.tag.clone(),
        }
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("encrypted_data", &"[REDACTED]")
            .field("nonce", &"[REDACTED]")
            .field("tag", &"[REDACTED]")
            .finish()
    }
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, PassError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| PassError::Crypto(format!("Random bytes generation failed: {}", e)))?;
    Ok(bytes)
}

/// Generate fresh HMAC key material from the system CSPRNG.
#[instrument(skip_all)]
pub fn generate_signing_secret() -> Result<SecretBox<Vec<u8>>, PassError> {
    Ok(SecretBox::new(Box::new(generate_random_bytes(
        SIGNING_SECRET_LEN,
    )?)))
}

/// Opaque signing key identifier: `pk-` followed by 32 hex characters.
pub fn generate_key_id() -> String {
    format!("pk-{}", Uuid::new_v4().simple())
}

/// Encrypt key material with AES-256-GCM
///
/// Uses a 96-bit random nonce and produces a 128-bit authentication tag
#[instrument(skip_all)]
pub fn encrypt_secret(secret: &[u8], master_key: &[u8]) -> Result<EncryptedSecret, PassError> {
    if master_key.len() != MASTER_KEY_LEN {
        return Err(PassError::Crypto(format!(
            "Invalid master key length: {} (expected {})",
            master_key.len(),
            MASTER_KEY_LEN
        )));
    }

    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes)
        .map_err(|e| PassError::Crypto(format!("Nonce generation failed: {}", e)))?;

    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| PassError::Crypto(format!("Cipher key creation failed: {}", e)))?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let mut in_out = secret.to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| PassError::Crypto(format!("Encryption operation failed: {}", e)))?;

    // Last 16 bytes are the tag
    let tag_start = in_out
        .len()
        .checked_sub(16)
        .ok_or_else(|| PassError::Crypto("Encryption produced invalid output".to_string()))?;
    let encrypted_data = in_out
        .get(..tag_start)
        .ok_or_else(|| PassError::Crypto("Encryption produced invalid output".to_string()))?
        .to_vec();
    let tag = in_out
        .get(tag_start..)
        .ok_or_else(|| PassError::Crypto("Encryption produced invalid output".to_string()))?
        .to_vec();

    Ok(EncryptedSecret {
        encrypted_data: SecretBox::new(Box::new(encrypted_data)),
        nonce: nonce_bytes.to_vec(),
        tag,
    })
}

/// Decrypt key material with AES-256-GCM
#[instrument(skip_all)]
pub fn decrypt_secret(
    encrypted: &EncryptedSecret,
    master_key: &[u8],
) -> Result<SecretBox<Vec<u8>>, PassError> {
    if master_key.len() != MASTER_KEY_LEN {
        return Err(PassError::Crypto(format!(
            "Invalid master key length: {} (expected {})",
            master_key.len(),
            MASTER_KEY_LEN
        )));
    }

    if encrypted.tag.len() != 16 {
        return Err(PassError::Crypto(format!(
            "Invalid tag length: {} (expected 16)",
            encrypted.tag.len()
        )));
    }

    let nonce_bytes: [u8; 12] = encrypted.nonce.as_slice().try_into().map_err(|_| {
        PassError::Crypto(format!(
            "Invalid nonce length: {} (expected 12)",
            encrypted.nonce.len()
        ))
    })?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = encrypted.encrypted_data.expose_secret().clone();
    in_out.extend_from_slice(&encrypted.tag);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| PassError::Crypto(format!("Cipher key creation failed: {}", e)))?;
    let opening_key = LessSafeKey::new(unbound_key);

    let decrypted = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| PassError::Crypto(format!("Decryption operation failed: {}", e)))?;

    Ok(SecretBox::new(Box::new(decrypted.to_vec())))
}

/// Sign pass claims with HS256 under the given key.
///
/// The key id goes into the JWS header, so the signature covers claims, key
/// id, issue time and expiry together.
#[instrument(skip_all)]
pub fn sign_token(claims: &PassClaims, secret: &[u8], key_id: &str) -> Result<String, PassError> {
    let encoding_key = EncodingKey::from_secret(secret);

    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());
    header.kid = Some(key_id.to_string());

    encode(&header, claims, &encoding_key)
        .map_err(|e| PassError::Crypto(format!("Token signing operation failed: {}", e)))
}

/// Extract the `kid` (key ID) from a token header without verifying it.
///
/// SECURITY NOTE: nothing in the returned value is trusted; it only selects
/// which key the signature is then checked against.
#[instrument(skip_all)]
pub fn extract_token_kid(token: &str) -> Result<String, PassError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "gatepass.crypto",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(PassError::MalformedToken);
    }

    let mut parts = token.split('.');
    let (Some(header_b64), Some(_payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PassError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| PassError::MalformedToken)?;
    let header: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| PassError::MalformedToken)?;

    header
        .get("kid")
        .and_then(|kid| kid.as_str())
        .filter(|kid| !kid.is_empty())
        .map(str::to_string)
        .ok_or(PassError::MalformedToken)
}

/// Verify the HS256 signature of a token and decode its claims.
///
/// Expiry is NOT checked here; the caller compares `exp` against its own
/// clock after the signature has been established. The HMAC comparison is
/// constant time.
#[instrument(skip_all)]
pub fn verify_token_signature(token: &str, secret: &[u8]) -> Result<PassClaims, PassError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        return Err(PassError::MalformedToken);
    }

    let decoding_key = DecodingKey::from_secret(secret);

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let token_data = decode::<PassClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "gatepass.crypto", error = %e, "Token verification failed");
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => PassError::SignatureMismatch,
            _ => PassError::MalformedToken,
        }
    })?;

    Ok(token_data.claims)
}
