//! Prometheus metrics endpoint
//!
//! Exposes metrics in Prometheus text format for scraping.

use crate::handlers::Handler;
use crate::metrics::Metrics;
use crate::response::{ResponseWriter, write_error};
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode, header},
};
use prometheus::{Encoder, TextEncoder};

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if metrics collection fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:9000/metrics
/// # HELP requests_total Total number of HTTP requests by route path
/// # TYPE requests_total counter
/// requests_total{path="/"} 42
/// ```
pub struct MetricsHandler {
    metrics: Metrics,
}

impl MetricsHandler {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Handler for MetricsHandler {
    async fn serve(&self, _request: Request, response: &mut dyn ResponseWriter) {
        match self.metrics.gather() {
            Ok(output) => {
                if let Ok(value) = HeaderValue::from_str(TextEncoder::new().format_type()) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response.write_status(StatusCode::OK);
                response.write_body(output.as_bytes()).await;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to gather metrics for Prometheus scraping"
                );
                write_error(
                    response,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("Failed to gather metrics: {}", e),
                )
                .await;
            }
        }
    }
}
