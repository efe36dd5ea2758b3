//! Prometheus metrics for the dispatch service.
//!
//! - Dispatch metrics (invocations by entry point, outcomes)
//! - Delivery metrics (tokens submitted, successes, failures, latency)
//! - Queue trigger metrics (pub/sub messages, reconnections)

mod helpers;

pub use helpers::{encode_metrics, DeliveryMetrics, DispatchMetrics, TriggerMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "regala";

lazy_static! {
    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Dispatcher invocations by entry point (queue, users, all)
    pub static ref DISPATCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatches_total", METRIC_PREFIX),
        "Total dispatcher invocations",
        &["entry_point"]
    ).unwrap();

    /// Dispatch outcomes by entry point and outcome
    pub static ref DISPATCH_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_outcomes_total", METRIC_PREFIX),
        "Dispatcher outcomes",
        &["entry_point", "outcome"]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Device tokens submitted to the delivery API
    pub static ref TOKENS_SUBMITTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_tokens_submitted_total", METRIC_PREFIX),
        "Total device tokens submitted to the delivery API"
    ).unwrap();

    /// Per-token successes reported by the delivery API
    pub static ref DELIVERY_SUCCESS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_success_total", METRIC_PREFIX),
        "Total per-token delivery successes"
    ).unwrap();

    /// Per-token failures reported by the delivery API
    pub static ref DELIVERY_FAILURE_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_failure_total", METRIC_PREFIX),
        "Total per-token delivery failures"
    ).unwrap();

    /// Whole-call delivery errors (transport, authorization)
    pub static ref DELIVERY_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_errors_total", METRIC_PREFIX),
        "Total multicast calls that failed as a whole"
    ).unwrap();

    /// Multicast send latency
    pub static ref DELIVERY_LATENCY: Histogram = register_histogram!(
        format!("{}_delivery_latency_seconds", METRIC_PREFIX),
        "Multicast send latency in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // ============================================================================
    // Queue Trigger Metrics
    // ============================================================================

    /// Queue trigger messages received over pub/sub
    pub static ref TRIGGER_MESSAGES_RECEIVED: IntCounter = register_int_counter!(
        format!("{}_trigger_messages_received_total", METRIC_PREFIX),
        "Total queue trigger messages received from Redis pub/sub"
    ).unwrap();

    /// Queue trigger messages that could not be parsed
    pub static ref TRIGGER_MESSAGES_INVALID: IntCounter = register_int_counter!(
        format!("{}_trigger_messages_invalid_total", METRIC_PREFIX),
        "Total queue trigger messages that could not be parsed"
    ).unwrap();

    /// Redis reconnection attempts of the trigger subscriber
    pub static ref TRIGGER_RECONNECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_trigger_reconnections_total", METRIC_PREFIX),
        "Total Redis reconnection attempts"
    ).unwrap();

    /// Queue records picked up by the catch-up sweep rather than an announcement
    pub static ref TRIGGER_CATCH_UP_RECORDS: IntCounter = register_int_counter!(
        format!("{}_trigger_catch_up_records_total", METRIC_PREFIX),
        "Total queued notifications drained by the subscription catch-up sweep"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        // lazy_static metrics register on first access
        TOKENS_SUBMITTED_TOTAL.inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("regala_tokens_submitted_total"));
    }

    #[test]
    fn test_dispatch_metrics() {
        DISPATCHES_TOTAL.with_label_values(&["queue"]).inc();
        DISPATCH_OUTCOMES_TOTAL
            .with_label_values(&["queue", "sent"])
            .inc();
        // Just verify no panics
    }

    #[test]
    fn test_trigger_metrics() {
        TRIGGER_MESSAGES_RECEIVED.inc();
        TRIGGER_MESSAGES_INVALID.inc();
        TRIGGER_RECONNECTIONS_TOTAL.inc();
        TRIGGER_CATCH_UP_RECORDS.inc_by(2);
        // Just verify no panics
    }
}
