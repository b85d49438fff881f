//! Metrics definitions for the pass service
//!
//! All metrics follow Prometheus naming conventions:
//! - `gatepass_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error)
//! - `error_kind`: bounded by [`crate::errors::ErrorKind`] plus `none`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder with its own HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime, before any metrics are
/// recorded.
///
/// # Errors
///
/// Returns error if the recorder or listener cannot be installed (e.g.,
/// already installed, address in use).
pub fn init_metrics_exporter(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        // Issuance is an in-memory HMAC; buckets are sub-millisecond
        .set_buckets_for_metric(
            Matcher::Full("gatepass_token_issuance_duration_seconds".to_string()),
            &[
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.010, 0.050,
            ],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `gatepass_token_issuance_duration_seconds`, `gatepass_token_issuance_total`
/// Labels: `status`
pub fn record_token_issuance(status: &str, duration: Duration) {
    histogram!("gatepass_token_issuance_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("gatepass_token_issuance_total", "status" => status.to_string()).increment(1);
}

/// Record token validation result
///
/// Metric: `gatepass_token_validations_total`
/// Labels: `status`, `error_kind`
pub fn record_token_validation(status: &str, error_kind: Option<&str>) {
    let kind = error_kind.unwrap_or("none");
    counter!("gatepass_token_validations_total", "status" => status.to_string(), "error_kind" => kind.to_string())
        .increment(1);
}

// ============================================================================
// Key Management Metrics
// ============================================================================

/// Record key rotation attempt
///
/// Metric: `gatepass_key_rotation_total`
/// Labels: `status`
///
/// ALERT: sustained `status="error"` means the active key is ageing past `R`
pub fn record_key_rotation(status: &str) {
    counter!("gatepass_key_rotation_total", "status" => status.to_string()).increment(1);
}

/// Record key rotation last success timestamp
///
/// Metric: `gatepass_key_rotation_last_success_timestamp`
pub fn set_key_rotation_last_success(timestamp_secs: f64) {
    gauge!("gatepass_key_rotation_last_success_timestamp").set(timestamp_secs);
}

/// Record keys moved to Purged
///
/// Metric: `gatepass_keys_purged_total`
pub fn record_keys_purged(count: u64) {
    counter!("gatepass_keys_purged_total").increment(count);
}

/// Update number of keys usable for verification (Active + Retired)
///
/// Metric: `gatepass_verification_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_verification_keys(count: usize) {
    gauge!("gatepass_verification_keys").set(count as f64);
}
