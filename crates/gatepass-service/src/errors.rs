use thiserror::Error;

/// Message shown to end users for every token-validation failure.
///
/// Which check failed (key lookup, signature, expiry) is not
/// revealed; the detailed [`ErrorKind`] stays in logs and metrics.
pub const PASS_NOT_VALID_MESSAGE: &str = "The pass is not valid";

#[derive(Debug, Error)]
pub enum PassError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Unknown signing key")]
    UnknownKey,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Token expired")]
    TokenExpired,

    #[error("Requested TTL of {requested_secs}s exceeds maximum of {max_secs}s")]
    TtlTooLong { requested_secs: u64, max_secs: u64 },

    #[error("Signed token of {token_bytes} bytes exceeds maximum of {max_bytes} bytes")]
    ClaimsTooLarge { token_bytes: usize, max_bytes: usize },

    #[error("No active signing key")]
    NoActiveKey,

    #[error("Key store write failed: {0}")]
    StoreWrite(String),

    #[error("Key store read failed: {0}")]
    StoreRead(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Bounded-cardinality classification of [`PassError`] for logs and metric
/// labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedToken,
    UnknownKey,
    SignatureMismatch,
    TokenExpired,
    TtlTooLong,
    ClaimsTooLarge,
    NoActiveKey,
    StoreWrite,
    StoreRead,
    Crypto,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedToken => "malformed_token",
            ErrorKind::UnknownKey => "unknown_key",
            ErrorKind::SignatureMismatch => "signature_mismatch",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::TtlTooLong => "ttl_too_long",
            ErrorKind::ClaimsTooLarge => "claims_too_large",
            ErrorKind::NoActiveKey => "no_active_key",
            ErrorKind::StoreWrite => "store_write",
            ErrorKind::StoreRead => "store_read",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Internal => "internal",
        }
    }
}

impl PassError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PassError::MalformedToken => ErrorKind::MalformedToken,
            PassError::UnknownKey => ErrorKind::UnknownKey,
            PassError::SignatureMismatch => ErrorKind::SignatureMismatch,
            PassError::TokenExpired => ErrorKind::TokenExpired,
            PassError::TtlTooLong { .. } => ErrorKind::TtlTooLong,
            PassError::ClaimsTooLarge { .. } => ErrorKind::ClaimsTooLarge,
            PassError::NoActiveKey => ErrorKind::NoActiveKey,
            PassError::StoreWrite(_) => ErrorKind::StoreWrite,
            PassError::StoreRead(_) => ErrorKind::StoreRead,
            PassError::Crypto(_) => ErrorKind::Crypto,
            PassError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for the outcomes a scanner reports as "pass rejected".
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            PassError::MalformedToken
                | PassError::UnknownKey
                | PassError::SignatureMismatch
                | PassError::TokenExpired
        )
    }

    /// Text safe to show to the person holding the pass (or the gate
    /// operator).
    ///
    /// All validation failures collapse into [`PASS_NOT_VALID_MESSAGE`];
    /// internal failures get an equally generic message without store or
    /// crypto details.
    pub fn public_message(&self) -> &'static str {
        match self {
            PassError::MalformedToken
            | PassError::UnknownKey
            | PassError::SignatureMismatch
            | PassError::TokenExpired => PASS_NOT_VALID_MESSAGE,
            PassError::TtlTooLong { .. } => "The requested pass lifetime is too long",
            PassError::ClaimsTooLarge { .. } => "The pass contents are too large",
            PassError::NoActiveKey
            | PassError::StoreWrite(_)
            | PassError::StoreRead(_)
            | PassError::Crypto(_)
            | PassError::Internal(_) => "An internal error occurred",
        }
    }
}
