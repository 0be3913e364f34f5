//! Metric groups registered lazily in the default Prometheus registry.
//!
//! Services touch only the group they need; a group registers on first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter, IntCounterVec,
};

pub struct DetectionMetrics {
    pub readings_total: IntCounter,
    /// label `method`: zscore | iqr | change_rate | threshold
    pub findings_total: IntCounterVec,
    /// label `severity`: normal | medium | high | critical
    pub severity_total: IntCounterVec,
    pub escalations_total: IntCounter,
    pub evaluate_latency_ms: Histogram,
}

pub struct IngestMetrics {
    pub payloads_total: IntCounter,
    /// label `reason`
    pub rejected_total: IntCounterVec,
    pub forwarded_total: IntCounter,
    pub delivery_failures_total: IntCounter,
}

const LATENCY_BUCKETS_MS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

// Registration only fails on duplicate names, which the Lazy rules out.
pub static DETECTION_METRICS: Lazy<DetectionMetrics> = Lazy::new(|| DetectionMetrics {
    readings_total: register_int_counter!("sentinel_readings_evaluated_total", "Readings evaluated by the detector")
        .expect("register sentinel_readings_evaluated_total"),
    findings_total: register_int_counter_vec!("sentinel_findings_total", "Positive findings per detection method", &["method"])
        .expect("register sentinel_findings_total"),
    severity_total: register_int_counter_vec!("sentinel_severity_total", "Anomaly reports per severity tier", &["severity"])
        .expect("register sentinel_severity_total"),
    escalations_total: register_int_counter!("sentinel_escalations_total", "Reports escalated by the forwarding policy")
        .expect("register sentinel_escalations_total"),
    evaluate_latency_ms: register_histogram!(
        "sentinel_evaluate_latency_ms",
        "Read-evaluate-write latency per parameter (ms)",
        LATENCY_BUCKETS_MS.to_vec()
    )
    .expect("register sentinel_evaluate_latency_ms"),
});

pub static INGEST_METRICS: Lazy<IngestMetrics> = Lazy::new(|| IngestMetrics {
    payloads_total: register_int_counter!("sentinel_ingest_payloads_total", "Payloads received from the broker")
        .expect("register sentinel_ingest_payloads_total"),
    rejected_total: register_int_counter_vec!("sentinel_ingest_rejected_total", "Payloads rejected before detection", &["reason"])
        .expect("register sentinel_ingest_rejected_total"),
    forwarded_total: register_int_counter!("sentinel_alerts_forwarded_total", "Enriched payloads delivered to the alert sink")
        .expect("register sentinel_alerts_forwarded_total"),
    delivery_failures_total: register_int_counter!("sentinel_alert_delivery_failures_total", "Alert deliveries that failed")
        .expect("register sentinel_alert_delivery_failures_total"),
});
