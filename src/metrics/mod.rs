//! Prometheus metrics for the hub
//!
//! Service metrics live in [`PROMETHEUS_REGISTRY`] and are namespaced
//! `avatar_live_hub`. WebSocket transport metrics are registered in the
//! process default registry by `websocket::metrics`; [`gather_metrics`]
//! renders both.
//!
//! # Example
//! ```no_run
//! use avatar_live_hub::metrics;
//!
//! metrics::init_metrics().unwrap();
//! metrics::record_event_published("viewer_count");
//! println!("{}", metrics::gather_metrics());
//! ```

pub mod middleware;

pub use middleware::track_metrics;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, CounterVec, GaugeVec, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, Opts, Registry,
};

const NAMESPACE: &str = "avatar_live_hub";

lazy_static! {
    /// Registry for all service metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    pub static ref HTTP_CONNECTIONS_ACTIVE: IntGauge = IntGauge::with_opts(
        Opts::new("http_connections_active", "In-flight HTTP requests").namespace(NAMESPACE)
    ).expect("Failed to create HTTP_CONNECTIONS_ACTIVE metric");

    // ============================================================================
    // Presence Metrics
    // ============================================================================

    /// Streams with at least one viewer, as of the last count sweep
    pub static ref STREAMS_TRACKED: IntGauge = IntGauge::with_opts(
        Opts::new("streams_tracked", "Streams with at least one viewer").namespace(NAMESPACE)
    ).expect("Failed to create STREAMS_TRACKED metric");

    /// Connections watching a stream, as of the last count sweep
    pub static ref VIEWERS_ACTIVE: IntGauge = IntGauge::with_opts(
        Opts::new("viewers_active", "Connections currently watching a stream").namespace(NAMESPACE)
    ).expect("Failed to create VIEWERS_ACTIVE metric");

    /// Labels: kind
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("events_published_total", "Events published through the broadcaster")
            .namespace(NAMESPACE),
        &["kind"]
    ).expect("Failed to create EVENTS_PUBLISHED_TOTAL metric");

    // ============================================================================
    // Sweep Metrics
    // ============================================================================

    /// Labels: sweep
    pub static ref SWEEPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sweeps_total", "Completed periodic sweeps").namespace(NAMESPACE),
        &["sweep"]
    ).expect("Failed to create SWEEPS_TOTAL metric");

    /// Labels: sweep
    pub static ref SWEEP_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sweep_failures_total", "Periodic sweeps that returned an error")
            .namespace(NAMESPACE),
        &["sweep"]
    ).expect("Failed to create SWEEP_FAILURES_TOTAL metric");

    /// Labels: sweep
    pub static ref SWEEP_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("sweep_duration_seconds", "Time spent in one sweep")
            .namespace(NAMESPACE)
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["sweep"]
    ).expect("Failed to create SWEEP_DURATION_SECONDS metric");

    pub static ref STREAM_DEMOTIONS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("stream_demotions_total", "Streams flipped offline by the liveness monitor")
            .namespace(NAMESPACE)
    ).expect("Failed to create STREAM_DEMOTIONS_TOTAL metric");

    /// Demotions skipped because a heartbeat arrived after the stale query
    pub static ref DEMOTION_CONFLICTS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("demotion_conflicts_total", "Demotions rejected by the conditional update")
            .namespace(NAMESPACE)
    ).expect("Failed to create DEMOTION_CONFLICTS_TOTAL metric");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Labels: component, error_type
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("errors_total", "Errors by component").namespace(NAMESPACE),
        &["component", "error_type"]
    ).expect("Failed to create ERRORS_TOTAL metric");

    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Build information").namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

/// Register a collector, tolerating a previous registration
fn register<C: Collector + 'static>(collector: C) -> Result<(), prometheus::Error> {
    match PROMETHEUS_REGISTRY.register(Box::new(collector)) {
        Err(prometheus::Error::AlreadyReg) => Ok(()),
        other => other,
    }
}

/// Register all service metrics; safe to call more than once
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(HTTP_REQUESTS_TOTAL.clone())?;
    register(HTTP_REQUEST_DURATION_SECONDS.clone())?;
    register(HTTP_CONNECTIONS_ACTIVE.clone())?;

    register(STREAMS_TRACKED.clone())?;
    register(VIEWERS_ACTIVE.clone())?;
    register(EVENTS_PUBLISHED_TOTAL.clone())?;

    register(SWEEPS_TOTAL.clone())?;
    register(SWEEP_FAILURES_TOTAL.clone())?;
    register(SWEEP_DURATION_SECONDS.clone())?;
    register(STREAM_DEMOTIONS_TOTAL.clone())?;
    register(DEMOTION_CONFLICTS_TOTAL.clone())?;

    register(ERRORS_TOTAL.clone())?;
    register(BUILD_INFO.clone())?;

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

pub fn record_event_published(kind: &str) {
    EVENTS_PUBLISHED_TOTAL.with_label_values(&[kind]).inc();
}

/// Record one sweep run and its outcome
pub fn record_sweep(sweep: &str, duration_secs: f64, succeeded: bool) {
    SWEEPS_TOTAL.with_label_values(&[sweep]).inc();
    SWEEP_DURATION_SECONDS
        .with_label_values(&[sweep])
        .observe(duration_secs);
    if !succeeded {
        SWEEP_FAILURES_TOTAL.with_label_values(&[sweep]).inc();
        ERRORS_TOTAL.with_label_values(&[sweep, "sweep_failed"]).inc();
    }
}

pub fn record_demotion() {
    STREAM_DEMOTIONS_TOTAL.inc();
}

pub fn record_demotion_conflict() {
    DEMOTION_CONFLICTS_TOTAL.inc();
}

pub fn set_presence_gauges(streams: usize, viewers: usize) {
    STREAMS_TRACKED.set(streams as i64);
    VIEWERS_ACTIVE.set(viewers as i64);
}

/// Render service and transport metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut metric_families = PROMETHEUS_REGISTRY.gather();
    metric_families.extend(prometheus::gather());
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
