//! Prometheus metrics for monitoring the gateway.

use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by endpoint and status code
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Rate limit rejections by endpoint
    pub rate_limit_rejections: IntCounterVec,

    /// Unified gateway response latency in seconds, by model
    pub upstream_latency: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Called once at startup; subsequent calls return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "genie_gateway_requests_total",
            "Total number of requests",
            &["endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "genie_gateway_request_duration_seconds",
            "Request duration in seconds",
            &["endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
        )
        .expect("Failed to register request_duration metric");

        let rate_limit_rejections = register_int_counter_vec!(
            "genie_gateway_rate_limit_rejections_total",
            "Requests rejected by the rate limiter",
            &["endpoint"]
        )
        .expect("Failed to register rate_limit_rejections metric");

        let upstream_latency = register_histogram_vec!(
            "genie_gateway_upstream_latency_seconds",
            "Unified gateway response latency in seconds",
            &["model"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
        )
        .expect("Failed to register upstream_latency metric");

        Metrics {
            request_count,
            request_duration,
            rate_limit_rejections,
            upstream_latency,
        }
    })
}

/// Get the metrics instance, initializing on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialize_once() {
        let first = init_metrics() as *const Metrics;
        let second = get_metrics() as *const Metrics;
        assert_eq!(first, second);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = get_metrics();
        let before = metrics
            .request_count
            .with_label_values(&["ai-chat", "200"])
            .get();
        metrics
            .request_count
            .with_label_values(&["ai-chat", "200"])
            .inc();
        let after = metrics
            .request_count
            .with_label_values(&["ai-chat", "200"])
            .get();
        assert_eq!(after, before + 1);
    }
}
