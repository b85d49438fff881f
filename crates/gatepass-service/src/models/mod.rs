use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a signing key.
///
/// `Pending -> Active -> Retired -> Purged`. Only an `Active` key signs;
/// `Active` and `Retired` keys verify; `Purged` keys do neither and are
/// indistinguishable from ids that never existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Pending,
    Active,
    Retired,
    Purged,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Pending => "pending",
            KeyStatus::Active => "active",
            KeyStatus::Retired => "retired",
            KeyStatus::Purged => "purged",
        }
    }

    /// Whether keys in this state may be returned by id lookups.
    pub fn is_visible(&self) -> bool {
        matches!(self, KeyStatus::Active | KeyStatus::Retired)
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(KeyStatus::Pending),
            "active" => Ok(KeyStatus::Active),
            "retired" => Ok(KeyStatus::Retired),
            "purged" => Ok(KeyStatus::Purged),
            _ => Err(format!("Invalid key status: {}", s)),
        }
    }
}

/// HMAC signing key and its lifecycle metadata.
///
/// `secret` is wrapped in `SecretBox` so it cannot end up in logs. Debug is
/// implemented by hand for the same reason, and Clone because `SecretBox`
/// requires explicit cloning.
pub struct SigningKey {
    pub key_id: String,
    pub secret: SecretBox<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub activates_at: DateTime<Utc>,
    /// Grace deadline: after this instant a retired key no longer verifies.
    pub expires_at: DateTime<Utc>,
    pub status: KeyStatus,
}

impl SigningKey {
    /// A key may verify tokens while Active, and while Retired up to and
    /// including its grace deadline.
    pub fn can_verify_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            KeyStatus::Active => true,
            KeyStatus::Retired => now <= self.expires_at,
            KeyStatus::Pending | KeyStatus::Purged => false,
        }
    }

    /// Copy of this key with a different status.
    pub fn with_status(&self, status: KeyStatus) -> Self {
        let mut key = self.clone();
        key.status = status;
        key
    }
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self {
            key_id: self.key_id.clone(),
            secret: SecretBox::new(Box::new(self.secret.expose_secret().clone())),
            created_at: self.created_at,
            activates_at: self.activates_at,
            expires_at: self.expires_at,
            status: self.status,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("activates_at", &self.activates_at)
            .field("expires_at", &self.expires_at)
            .field("status", &self.status)
            .finish()
    }
}

/// Caller-supplied pass claims (membership id, scope, venue, ...).
///
/// Ordered map so the serialized form is deterministic. Values typically
/// carry member identifiers, so Debug prints claim names only.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(BTreeMap<String, Value>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for Claims {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Claims {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("names", &self.0.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}
