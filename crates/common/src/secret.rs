//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Signing-key
//! material, the at-rest master key and any other byte string that must never
//! show up in a log line or a `{:?}` dump is held in one of these wrappers.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! struct that derives `Debug` over a secret field gets safe output for free.
//! Reading the value requires an explicit `expose_secret()` call, which keeps
//! every use site greppable.
//!
//! # Memory Safety
//!
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretBox};
//!
//! #[derive(Debug)]
//! struct KeyMaterial {
//!     key_id: String,
//!     secret: SecretBox<Vec<u8>>,
//! }
//!
//! let material = KeyMaterial {
//!     key_id: "pk-0001".to_string(),
//!     secret: SecretBox::new(Box::new(vec![7u8; 32])),
//! };
//!
//! // Debug output never contains the bytes
//! let rendered = format!("{material:?}");
//! assert!(rendered.contains("REDACTED"));
//!
//! // Access is explicit
//! assert_eq!(material.secret.expose_secret().len(), 32);
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretBox<Vec<u8>>` for:
//! - HMAC signing-key material
//! - The AES-256-GCM master key used to encrypt key material at rest
//!
//! Use `SecretString` for:
//! - Database URLs carrying credentials
//! - Base64-encoded keys before they are decoded

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
