//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::notification::BatchResponse;

use super::{
    DELIVERY_ERRORS_TOTAL, DELIVERY_FAILURE_TOTAL, DELIVERY_LATENCY, DELIVERY_SUCCESS_TOTAL,
    DISPATCHES_TOTAL, DISPATCH_OUTCOMES_TOTAL, TOKENS_SUBMITTED_TOTAL, TRIGGER_CATCH_UP_RECORDS,
    TRIGGER_MESSAGES_INVALID, TRIGGER_MESSAGES_RECEIVED, TRIGGER_RECONNECTIONS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording dispatcher metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a dispatcher invocation
    pub fn record_invocation(entry_point: &str) {
        DISPATCHES_TOTAL.with_label_values(&[entry_point]).inc();
    }

    /// Record how a dispatcher invocation ended
    pub fn record_outcome(entry_point: &str, outcome: &str) {
        DISPATCH_OUTCOMES_TOTAL
            .with_label_values(&[entry_point, outcome])
            .inc();
    }
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record the counts of a completed multicast
    pub fn record_batch(tokens: usize, response: &BatchResponse) {
        TOKENS_SUBMITTED_TOTAL.inc_by(tokens as u64);
        DELIVERY_SUCCESS_TOTAL.inc_by(response.success_count as u64);
        DELIVERY_FAILURE_TOTAL.inc_by(response.failure_count as u64);
    }

    /// Record a multicast that failed as a whole
    pub fn record_error() {
        DELIVERY_ERRORS_TOTAL.inc();
    }

    pub fn observe_latency(elapsed: Duration) {
        DELIVERY_LATENCY.observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for recording queue trigger metrics
pub struct TriggerMetrics;

impl TriggerMetrics {
    pub fn record_received() {
        TRIGGER_MESSAGES_RECEIVED.inc();
    }

    pub fn record_invalid() {
        TRIGGER_MESSAGES_INVALID.inc();
    }

    pub fn record_reconnection() {
        TRIGGER_RECONNECTIONS_TOTAL.inc();
    }

    pub fn record_catch_up(records: usize) {
        TRIGGER_CATCH_UP_RECORDS.inc_by(records as u64);
    }
}
