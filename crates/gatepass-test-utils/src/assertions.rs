//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for pass tokens plus helpers that tamper
//! with a token's signature.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Pass token header structure
#[derive(Debug, Deserialize)]
struct PassHeader {
    pub alg: String,
    pub typ: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// Pass token payload structure
#[derive(Debug, Deserialize)]
struct PassPayload {
    pub iat: i64,
    pub exp: i64,
    pub pass: BTreeMap<String, Value>,
}

fn segments(token: &str) -> Vec<&str> {
    let parts: Vec<_> = token.split('.').collect();
    assert_eq!(
        parts.len(),
        3,
        "Pass token must have 3 parts (header.payload.signature), got {}",
        parts.len()
    );
    parts
}

fn header(token: &str) -> PassHeader {
    let raw = URL_SAFE_NO_PAD
        .decode(segments(token)[0])
        .expect("Invalid token header");
    serde_json::from_slice(&raw).expect("Failed to parse token header")
}

fn payload(token: &str) -> PassPayload {
    let raw = URL_SAFE_NO_PAD
        .decode(segments(token)[1])
        .expect("Invalid token payload");
    serde_json::from_slice(&raw).expect("Failed to parse token payload")
}

/// Custom assertions for pass tokens
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_pass_token()
///     .assert_signed_by(&key_id)
///     .assert_expires_in(300)
///     .assert_has_claim("membership_id", "mem-1042");
/// ```
pub trait TokenAssertions {
    /// Assert header and payload decode and carry the expected fields
    fn assert_valid_pass_token(&self) -> &Self;

    /// Assert that the token names the specified signing key
    fn assert_signed_by(&self, key_id: &str) -> &Self;

    /// Assert that `exp - iat` equals the specified seconds
    fn assert_expires_in(&self, seconds: i64) -> &Self;

    /// Assert that a caller claim is present with the given value
    fn assert_has_claim(&self, name: &str, value: impl Into<Value>) -> &Self;
}

impl TokenAssertions for String {
    fn assert_valid_pass_token(&self) -> &Self {
        let header = header(self);
        assert_eq!(header.alg, "HS256", "Expected HS256 algorithm");
        assert_eq!(header.typ, "JWT", "Expected JWT type");
        assert!(
            header.kid.as_deref().is_some_and(|kid| !kid.is_empty()),
            "Token header must carry a key id"
        );

        let payload = payload(self);
        assert!(
            payload.exp >= payload.iat,
            "Token expires ({}) before it was issued ({})",
            payload.exp,
            payload.iat
        );

        let signature = URL_SAFE_NO_PAD.decode(segments(self)[2]);
        assert!(
            matches!(&signature, Ok(bytes) if bytes.len() == 32),
            "Expected a 32-byte HMAC-SHA256 signature, got {:?}",
            signature.map(|bytes| bytes.len())
        );

        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header = header(self);
        assert_eq!(
            header.kid.as_deref(),
            Some(key_id),
            "Expected key_id '{}', got {:?}",
            key_id,
            header.kid
        );

        self
    }

    fn assert_expires_in(&self, seconds: i64) -> &Self {
        let payload = payload(self);
        assert_eq!(
            payload.exp - payload.iat,
            seconds,
            "Expected token lifetime of {} seconds, got {}",
            seconds,
            payload.exp - payload.iat
        );

        self
    }

    fn assert_has_claim(&self, name: &str, value: impl Into<Value>) -> &Self {
        let payload = payload(self);
        let expected = value.into();
        assert_eq!(
            payload.pass.get(name),
            Some(&expected),
            "Expected claim '{}' = {}, claims present: {:?}",
            name,
            expected,
            payload.pass.keys().collect::<Vec<_>>()
        );

        self
    }
}

/// Key id named in the token header.
pub fn token_key_id(token: &str) -> String {
    header(token).kid.expect("Token header has no key id")
}

/// Number of bits in the decoded signature.
pub fn signature_bit_len(token: &str) -> usize {
    URL_SAFE_NO_PAD
        .decode(segments(token)[2])
        .expect("Invalid token signature")
        .len()
        * 8
}

/// Copy of `token` with bit `bit` of the decoded signature flipped and the
/// signature re-encoded.
pub fn flip_signature_bit(token: &str, bit: usize) -> String {
    let parts = segments(token);
    let mut signature = URL_SAFE_NO_PAD
        .decode(parts[2])
        .expect("Invalid token signature");
    signature[bit / 8] ^= 1 << (bit % 8);
    format!(
        "{}.{}.{}",
        parts[0],
        parts[1],
        URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Copy of `token` with the last byte of the decoded signature altered.
pub fn corrupt_last_signature_byte(token: &str) -> String {
    flip_signature_bit(token, signature_bit_len(token) - 1)
}
