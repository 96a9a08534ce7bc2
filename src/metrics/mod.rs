//! Prometheus metrics for the consort coordination layer
//!
//! This module provides metrics tracking for:
//! - Coordination: backend requests, leadership state, observer polls and callback failures
//! - Tracing: finished spans by operation and error flag
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all coordination metrics
struct CoordinationMetrics {
    backend_requests: CounterVec,
    backend_duration: HistogramVec,
    is_leader: GaugeVec,
    observer_polls: CounterVec,
    observer_callback_failures: CounterVec,
    discovery_rounds: CounterVec,
}

/// Container for all trace metrics
struct TraceMetrics {
    spans_finished: CounterVec,
    span_duration: HistogramVec,
}

/// Global storage for coordination metrics
static COORDINATION_METRICS: OnceLock<CoordinationMetrics> = OnceLock::new();

/// Global storage for trace metrics
static TRACE_METRICS: OnceLock<TraceMetrics> = OnceLock::new();

/// Outcome of the first initialization; later callers block on it and share it
static METRICS_INIT: OnceLock<Result<(), String>> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = consort::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    METRICS_INIT
        .get_or_init(|| register_metrics().map_err(|e| e.to_string()))
        .clone()
        .map_err(Into::into)
}

fn register_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let coordination = CoordinationMetrics {
        backend_requests: register_counter_vec!(
            "consort_backend_requests_total",
            "Total coordination backend requests by operation and outcome",
            &["operation", "outcome"]
        )?,
        backend_duration: register_histogram_vec!(
            "consort_backend_request_duration_seconds",
            "Coordination backend request duration in seconds",
            &["operation"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
        is_leader: register_gauge_vec!(
            "consort_is_leader",
            "Whether this instance holds the leader key (1 = yes, 0 = no)",
            &["service"]
        )?,
        observer_polls: register_counter_vec!(
            "consort_observer_polls_total",
            "Total leadership observer polls by service and result",
            &["service", "holder"]
        )?,
        observer_callback_failures: register_counter_vec!(
            "consort_observer_callback_failures_total",
            "Total leadership change callbacks that failed or panicked",
            &["service", "kind"]
        )?,
        discovery_rounds: register_counter_vec!(
            "consort_discovery_rounds_total",
            "Total dependency discovery rounds by dependency and result",
            &["dependency", "result"]
        )?,
    };

    let trace = TraceMetrics {
        spans_finished: register_counter_vec!(
            "consort_spans_finished_total",
            "Total finished spans by operation and error flag",
            &["operation", "error"]
        )?,
        span_duration: register_histogram_vec!(
            "consort_span_duration_seconds",
            "Finished span duration in seconds",
            &["operation"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
    };

    COORDINATION_METRICS
        .set(coordination)
        .map_err(|_| "Coordination metrics already initialized")?;
    TRACE_METRICS
        .set(trace)
        .map_err(|_| "Trace metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    COORDINATION_METRICS.get().is_some() && TRACE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a backend request
///
/// `outcome` is `"ok"` or an [`ErrorCategory`](crate::error::ErrorCategory) label.
pub fn record_backend_request(operation: &str, outcome: &str, duration_secs: f64) {
    let Some(m) = COORDINATION_METRICS.get() else {
        return;
    };

    m.backend_requests
        .with_label_values(&[operation, outcome])
        .inc();
    m.backend_duration
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Update the leadership gauge for a service
pub fn set_leader(service: &str, is_leader: bool) {
    if let Some(m) = COORDINATION_METRICS.get() {
        m.is_leader
            .with_label_values(&[service])
            .set(if is_leader { 1.0 } else { 0.0 });
    }
}

/// Record one observer poll
pub fn record_observer_poll(service: &str, holder_present: bool) {
    if let Some(m) = COORDINATION_METRICS.get() {
        let holder = if holder_present { "held" } else { "vacant" };
        m.observer_polls.with_label_values(&[service, holder]).inc();
    }
}

/// Record a failed leadership change callback (`kind` is `error` or `panic`)
pub fn record_callback_failure(service: &str, kind: &str) {
    if let Some(m) = COORDINATION_METRICS.get() {
        m.observer_callback_failures
            .with_label_values(&[service, kind])
            .inc();
    }
}

/// Record a discovery lookup for one dependency
pub fn record_discovery_lookup(dependency: &str, found: bool) {
    if let Some(m) = COORDINATION_METRICS.get() {
        let result = if found { "found" } else { "missing" };
        m.discovery_rounds
            .with_label_values(&[dependency, result])
            .inc();
    }
}

/// Record a finished span
pub fn record_span(operation: &str, error: bool, duration_secs: f64) {
    let Some(m) = TRACE_METRICS.get() else {
        return;
    };

    let error_str = if error { "true" } else { "false" };
    m.spans_finished
        .with_label_values(&[operation, error_str])
        .inc();
    m.span_duration
        .with_label_values(&[operation])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================
