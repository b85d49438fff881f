use base64::{engine::general_purpose, Engine as _};
use common::secret::{ExposeSecret, SecretBox};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default rotation interval `R` (6 hours).
pub const DEFAULT_ROTATION_INTERVAL_SECONDS: u64 = 6 * 60 * 60;

/// Default grace period `G` (1 hour).
pub const DEFAULT_GRACE_PERIOD_SECONDS: u64 = 60 * 60;

/// Default maximum token TTL accepted by `issue` (15 minutes).
pub const DEFAULT_MAX_TOKEN_TTL_SECONDS: u64 = 15 * 60;

/// Default safety margin subtracted from `R + G` when bounding TTLs.
pub const DEFAULT_TTL_SAFETY_MARGIN_SECONDS: u64 = 60;

/// Upper bound for `R` and `G` (30 days).
pub const MAX_PERIOD_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Timing parameters of key rotation and token issuance.
///
/// Only constructible through [`RotationSettings::new`], which enforces
/// `G >= max_token_ttl + margin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSettings {
    rotation_interval: Duration,
    grace_period: Duration,
    max_token_ttl: Duration,
    ttl_safety_margin: Duration,
}

impl RotationSettings {
    pub fn new(
        rotation_interval: Duration,
        grace_period: Duration,
        max_token_ttl: Duration,
        ttl_safety_margin: Duration,
    ) -> Result<Self, ConfigError> {
        if rotation_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PASS_ROTATION_INTERVAL_SECONDS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if grace_period.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PASS_GRACE_PERIOD_SECONDS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if max_token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PASS_MAX_TOKEN_TTL_SECONDS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let required = max_token_ttl.saturating_add(ttl_safety_margin);
        if grace_period < required {
            return Err(ConfigError::GraceTooShort {
                grace_secs: grace_period.as_secs(),
                required_secs: required.as_secs(),
            });
        }

        Ok(Self {
            rotation_interval,
            grace_period,
            max_token_ttl,
            ttl_safety_margin,
        })
    }

    pub fn rotation_interval(&self) -> Duration {
        self.rotation_interval
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn max_token_ttl(&self) -> Duration {
        self.max_token_ttl
    }

    pub fn ttl_safety_margin(&self) -> Duration {
        self.ttl_safety_margin
    }

    /// Lifetime of a newly activated key: `R + G`.
    pub fn key_lifetime(&self) -> Duration {
        self.rotation_interval.saturating_add(self.grace_period)
    }

    /// Largest TTL `issue` accepts: `min(max_token_ttl, R + G - margin)`.
    pub fn max_issuable_ttl(&self) -> Duration {
        self.max_token_ttl
            .min(self.key_lifetime().saturating_sub(self.ttl_safety_margin))
    }
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(DEFAULT_ROTATION_INTERVAL_SECONDS),
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECONDS),
            max_token_ttl: Duration::from_secs(DEFAULT_MAX_TOKEN_TTL_SECONDS),
            ttl_safety_margin: Duration::from_secs(DEFAULT_TTL_SAFETY_MARGIN_SECONDS),
        }
    }
}

/// Process configuration.
///
/// Not Clone: the master key lives in a `SecretBox`. Debug is manual so the
/// database URL (which may embed a password) and the key stay out of logs.
pub struct Config {
    pub rotation: RotationSettings,
    pub database_url: Option<String>,
    pub master_key: Option<SecretBox<Vec<u8>>>,
    pub metrics_bind_address: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rotation", &self.rotation)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("metrics_bind_address", &self.metrics_bind_address)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Grace period of {grace_secs}s is shorter than max token TTL plus safety margin ({required_secs}s)")]
    GraceTooShort { grace_secs: u64, required_secs: u64 },

    #[error("Invalid master key format: {0}")]
    InvalidMasterKey(String),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let rotation_interval = parse_seconds(
            vars,
            "PASS_ROTATION_INTERVAL_SECONDS",
            DEFAULT_ROTATION_INTERVAL_SECONDS,
            MAX_PERIOD_SECONDS,
        )?;
        let grace_period = parse_seconds(
            vars,
            "PASS_GRACE_PERIOD_SECONDS",
            DEFAULT_GRACE_PERIOD_SECONDS,
            MAX_PERIOD_SECONDS,
        )?;
        let max_token_ttl = parse_seconds(
            vars,
            "PASS_MAX_TOKEN_TTL_SECONDS",
            DEFAULT_MAX_TOKEN_TTL_SECONDS,
            MAX_PERIOD_SECONDS,
        )?;
        let ttl_safety_margin = parse_seconds_allow_zero(
            vars,
            "PASS_TTL_SAFETY_MARGIN_SECONDS",
            DEFAULT_TTL_SAFETY_MARGIN_SECONDS,
            MAX_PERIOD_SECONDS,
        )?;

        let rotation = RotationSettings::new(
            rotation_interval,
            grace_period,
            max_token_ttl,
            ttl_safety_margin,
        )?;

        let database_url = vars
            .get("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .cloned();

        // Key material only ever reaches the database encrypted, so a
        // persistent store needs a master key.
        let master_key = match (&database_url, vars.get("PASS_MASTER_KEY")) {
            (_, Some(encoded)) => Some(decode_master_key(encoded)?),
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("PASS_MASTER_KEY".to_string()))
            }
            (None, None) => None,
        };

        let metrics_bind_address = vars.get("METRICS_BIND_ADDRESS").cloned();

        Ok(Config {
            rotation,
            database_url,
            master_key,
            metrics_bind_address,
        })
    }

    /// Master key bytes, if configured.
    pub fn master_key_bytes(&self) -> Option<&[u8]> {
        self.master_key.as_ref().map(|key| key.expose_secret().as_slice())
    }
}

fn decode_master_key(encoded: &str) -> Result<SecretBox<Vec<u8>>, ConfigError> {
    let master_key = general_purpose::STANDARD
        .decode(encoded)
        .map_err(ConfigError::Base64Error)?;

    if master_key.len() != 32 {
        return Err(ConfigError::InvalidMasterKey(format!(
            "Expected 32 bytes, got {}",
            master_key.len()
        )));
    }

    Ok(SecretBox::new(Box::new(master_key)))
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    max: u64,
) -> Result<Duration, ConfigError> {
    let value = parse_seconds_allow_zero(vars, name, default, max)?;
    if value.is_zero() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

fn parse_seconds_allow_zero(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    max: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let secs: u64 = raw.trim().parse().map_err(|e| {
        ConfigError::InvalidValue(name.to_string(), format!("{raw:?} is not a number: {e}"))
    })?;

    if secs > max {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("{secs} exceeds maximum of {max}"),
        ));
    }

    Ok(Duration::from_secs(secs))
}
