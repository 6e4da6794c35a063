//! Prometheus metrics exposition
//!
//! Gateway-level metrics recorded here:
//!
//! - `gateway_requests_total` (counter): label `outcome`
//! - `gateway_request_duration_seconds` (histogram): label `outcome`
//!
//! The key-pool crate emits `key_pool_attempts_total{outcome}`,
//! `key_pool_rotations_total{reason}` and `key_pool_quarantines_total`
//! through the same recorder.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Buckets span a single fast reply up to a full retry chain of slow attempts.
const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .context("failed to set histogram buckets")
}

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a finished `/v1/generate` request.
pub fn record_request(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}
