//! Prometheus metrics collection for filemetrics
//!
//! This module provides request instrumentation metrics:
//! - `requests_total`: requests by route template
//! - `response_status_total`: responses by status code
//! - `response_duration_seconds`: handling latency by route template
//!
//! Metrics are exposed in Prometheus text format by
//! [`crate::handlers::metrics::MetricsHandler`].

use axum::http::StatusCode;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Name of the per-route request counter
pub const REQUESTS_TOTAL: &str = "requests_total";
/// Name of the per-status response counter
pub const RESPONSE_STATUS_TOTAL: &str = "response_status_total";
/// Name of the per-route latency histogram
pub const RESPONSE_DURATION_SECONDS: &str = "response_duration_seconds";

/// Metrics registry shared by every in-flight request
///
/// Cloning is cheap: the registry and the metric vectors are reference counted,
/// so all clones update the same series. Each vector synchronises internally,
/// so callers never lock.
#[derive(Clone, Debug)]
pub struct Metrics {
    registry: Arc<Registry>,
    requests_total: IntCounterVec,
    response_status_total: IntCounterVec,
    response_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry and the default
    /// Prometheus latency buckets
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new(), prometheus::DEFAULT_BUCKETS.to_vec())
    }

    /// Register the three request metrics into `registry`
    ///
    /// # Errors
    ///
    /// Returns `prometheus::Error::AlreadyReg` if the registry already holds
    /// these metrics, and an error if `buckets` is not strictly increasing.
    pub fn with_registry(registry: Registry, buckets: Vec<f64>) -> Result<Self, prometheus::Error> {
        // Cardinality: one series per registered route template plus "" for
        // unmatched requests. Templates, not raw paths, keep this bounded.
        let requests_total = IntCounterVec::new(
            Opts::new(REQUESTS_TOTAL, "Total number of HTTP requests by route path"),
            &["path"],
        )?;

        // Cardinality: bounded by the number of distinct status codes written
        let response_status_total = IntCounterVec::new(
            Opts::new(
                RESPONSE_STATUS_TOTAL,
                "Total number of HTTP responses by status code",
            ),
            &["status"],
        )?;

        let duration_opts = HistogramOpts::new(
            RESPONSE_DURATION_SECONDS,
            "Duration of HTTP request handling in seconds",
        )
        .buckets(buckets);

        // Buckets are only checked when a labelled child is created, and
        // with_label_values panics on error. Check them here instead.
        Histogram::with_opts(duration_opts.clone())?;

        let response_duration_seconds = HistogramVec::new(duration_opts, &["path"])?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(response_status_total.clone()))?;
        registry.register(Box::new(response_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            response_status_total,
            response_duration_seconds,
        })
    }

    /// The registry holding the request metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count one request for the route template `path`
    pub fn increment_request_count(&self, path: &str) {
        self.requests_total.with_label_values(&[path]).inc();
    }

    /// Count one response with `status`
    pub fn increment_status_count(&self, status: StatusCode) {
        self.response_status_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    /// Record how long a request for `path` took
    pub fn observe_duration(&self, path: &str, elapsed: Duration) {
        self.response_duration_seconds
            .with_label_values(&[path])
            .observe(elapsed.as_secs_f64());
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            e
        })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }
}
