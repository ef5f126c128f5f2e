//! Prometheus metrics for mimic-proxy.
//!
//! Tracks action decisions, control-plane traffic, upstream latency and the
//! size of the event log.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Data-plane decisions taken by the action handler
    pub static ref ACTIONS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_actions_total",
        "Total number of data-plane action decisions",
        &["action"]  // action: response|callback|forward|error|not_found|loop_detected|failure
    )
    .expect("mimic_actions_total registers once");

    /// Control-plane operations served
    pub static ref CONTROL_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_control_requests_total",
        "Total number of control-plane requests served",
        &["operation"]
    )
    .expect("mimic_control_requests_total registers once");

    /// Upstream forward duration
    pub static ref FORWARD_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mimic_forward_duration_ms",
        "Duration of upstream forwards in milliseconds",
        &["outcome"],  // outcome: ok|timeout|error
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 30000.0]
    )
    .expect("mimic_forward_duration_ms registers once");

    /// Entries currently held by the event log
    pub static ref LOG_ENTRIES: IntGauge = register_int_gauge!(
        "mimic_log_entries",
        "Number of entries in the event log"
    )
    .expect("mimic_log_entries registers once");
}

/// Collect all metrics in Prometheus text format.
pub fn collect_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
}

pub fn record_action(action: &str) {
    ACTIONS_TOTAL.with_label_values(&[action]).inc();
}

pub fn record_control_request(operation: &str) {
    CONTROL_REQUESTS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_forward(outcome: &str, duration_ms: f64) {
    FORWARD_DURATION_MS
        .with_label_values(&[outcome])
        .observe(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_metrics_includes_registered_families() {
        record_action("response");
        record_control_request("reset");
        record_forward("ok", 12.0);
        LOG_ENTRIES.set(3);

        let text = collect_metrics().unwrap();
        assert!(text.contains("mimic_actions_total"));
        assert!(text.contains("mimic_control_requests_total"));
        assert!(text.contains("mimic_forward_duration_ms"));
        assert!(text.contains("mimic_log_entries"));
    }
}
