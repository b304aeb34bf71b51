//! Prometheus metrics for the log monitor
//!
//! Process-wide counters covering ingestion, store failures, alert
//! transitions and reporting, plus a latency histogram for aggregation
//! queries.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // === Ingestion ===

    /// Lines parsed and stored
    pub static ref LINES_INGESTED: IntCounter = register_int_counter!(
        "logmon_lines_ingested_total",
        "Access-log lines parsed and stored"
    ).unwrap();

    /// Lines skipped because they failed to parse
    pub static ref LINES_REJECTED: IntCounter = register_int_counter!(
        "logmon_lines_rejected_total",
        "Access-log lines that failed to parse"
    ).unwrap();

    // === Store ===

    /// Store operation failures by operation
    pub static ref STORE_FAILURES: IntCounterVec = register_int_counter_vec!(
        "logmon_store_failures_total",
        "Store operation failures",
        &["operation"]
    ).unwrap();

    /// Points dropped by retention, pruned or appended behind the cutoff
    pub static ref POINTS_EXPIRED: IntCounter = register_int_counter!(
        "logmon_points_expired_total",
        "Points dropped by store retention"
    ).unwrap();

    /// Aggregation query latency
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "logmon_query_duration_seconds",
        "Aggregation query latency in seconds",
        &["label"],
        vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0]
    ).unwrap();

    // === Alerting / Reporting ===

    /// Alert state transitions
    pub static ref ALERT_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "logmon_alert_transitions_total",
        "Alert state transitions by alert and new state",
        &["alert", "state"]
    ).unwrap();

    /// Alerts currently critical
    pub static ref ALERTS_CRITICAL: IntGauge = register_int_gauge!(
        "logmon_alerts_critical",
        "Number of alerts currently in the critical state"
    ).unwrap();

    /// Stats summaries emitted
    pub static ref STATS_REPORTS: IntCounter = register_int_counter!(
        "logmon_stats_reports_total",
        "Traffic summaries emitted"
    ).unwrap();
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a failed store operation
#[inline]
pub fn record_store_failure(operation: &str) {
    STORE_FAILURES.with_label_values(&[operation]).inc();
}

/// Record points dropped by retention
#[inline]
pub fn record_points_expired(count: u64) {
    POINTS_EXPIRED.inc_by(count);
}

/// Record an aggregation query on `label`
#[inline]
pub fn record_query(label: &str, duration_secs: f64) {
    QUERY_DURATION
        .with_label_values(&[label])
        .observe(duration_secs);
}

/// Record an alert entering `state`
#[inline]
pub fn record_alert_transition(alert: &str, state: &str, critical: bool) {
    ALERT_TRANSITIONS.with_label_values(&[alert, state]).inc();
    if critical {
        ALERTS_CRITICAL.inc();
    } else {
        ALERTS_CRITICAL.dec();
    }
}

/// One-line summary of the ingestion counters
pub fn summary() -> String {
    format!(
        "lines_ingested={} lines_rejected={} points_expired={} stats_reports={} alerts_critical={}",
        LINES_INGESTED.get(),
        LINES_REJECTED.get(),
        POINTS_EXPIRED.get(),
        STATS_REPORTS.get(),
        ALERTS_CRITICAL.get()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_store_failure() {
        record_store_failure("add");
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("logmon_store_failures_total"));
    }

    #[test]
    fn test_record_query() {
        record_query("host", 0.002);
        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("logmon_query_duration_seconds"));
    }

    #[test]
    fn test_record_points_expired() {
        let before = POINTS_EXPIRED.get();
        record_points_expired(3);
        assert!(POINTS_EXPIRED.get() >= before + 3);
        assert!(summary().contains("points_expired="));
    }

    #[test]
    fn test_summary_lists_counters() {
        LINES_INGESTED.inc();
        let line = summary();
        assert!(line.contains("lines_ingested="));
        assert!(line.contains("alerts_critical="));
    }
}
