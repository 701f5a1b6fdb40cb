//! Request instrumentation middleware
//!
//! [`Instrumented`] wraps a downstream [`Handler`] and, for every request,
//! records exactly one value in each of the three request metrics: the
//! request count and latency for the matched route template, and the
//! response count for the status the handler sent.
//!
//! The handler finishes once its whole body has been handed to the client, so
//! the recorded latency covers the transfer as well.

use crate::handlers::Handler;
use crate::metrics::Metrics;
use crate::middleware::observer::ResponseObserver;
use crate::response::ResponseWriter;
use crate::router::MatchedRoute;
use async_trait::async_trait;
use axum::extract::Request;
use std::time::Instant;

/// Handler wrapper that measures every request passing through it
pub struct Instrumented<H> {
    inner: H,
    metrics: Metrics,
}

impl<H: Handler> Instrumented<H> {
    pub fn new(inner: H, metrics: Metrics) -> Self {
        Self { inner, metrics }
    }
}

/// Path label for `request`: the matched route template, or `""` when no
/// route matched
pub fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedRoute>()
        .map(|matched| matched.template().to_string())
        .unwrap_or_default()
}

/// One in-flight measurement
///
/// Commits on drop, so the three metrics are written exactly once whether the
/// handler returns normally or the request future is dropped part-way.
struct Measurement<'a, W: ResponseWriter> {
    metrics: &'a Metrics,
    path: String,
    started: Instant,
    observer: ResponseObserver<W>,
}

impl<'a, W: ResponseWriter> Measurement<'a, W> {
    fn start(metrics: &'a Metrics, path: String, response: W) -> Self {
        Self {
            metrics,
            path,
            started: Instant::now(),
            observer: ResponseObserver::new(response),
        }
    }
}

impl<W: ResponseWriter> Drop for Measurement<'_, W> {
    fn drop(&mut self) {
        // A panicking handler never produced a response
        if std::thread::panicking() {
            return;
        }

        let elapsed = self.started.elapsed();
        let status = self.observer.status();

        self.metrics.increment_request_count(&self.path);
        self.metrics.increment_status_count(status);
        self.metrics.observe_duration(&self.path, elapsed);

        tracing::debug!(
            path = %self.path,
            status = status.as_u16(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Request completed"
        );
    }
}

#[async_trait]
impl<H: Handler> Handler for Instrumented<H> {
    async fn serve(&self, request: Request, response: &mut dyn ResponseWriter) {
        let path = route_label(&request);
        let mut measurement = Measurement::start(&self.metrics, path, response);

        self.inner.serve(request, &mut measurement.observer).await;

        drop(measurement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::sample;
    use crate::metrics::{REQUESTS_TOTAL, RESPONSE_DURATION_SECONDS, RESPONSE_STATUS_TOTAL};
    use crate::response::{BODY_CHANNEL_CAPACITY, ResponseBuffer};
    use crate::router::{RequestRouter, RouteTable};
    use axum::body::Body;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;

    /// Writes each status in order, then a body
    struct Scripted(Vec<StatusCode>);

    #[async_trait]
    impl Handler for Scripted {
        async fn serve(&self, _request: Request, response: &mut dyn ResponseWriter) {
            for status in &self.0 {
                response.write_status(*status);
            }
            response.write_body(b"done").await;
        }
    }

    /// Writes a status, then more body chunks than the response channel holds
    struct Chunked(StatusCode);

    #[async_trait]
    impl Handler for Chunked {
        async fn serve(&self, _request: Request, response: &mut dyn ResponseWriter) {
            response.write_status(self.0);
            for _ in 0..BODY_CHANNEL_CAPACITY * 2 {
                response.write_body(b"chunk").await;
            }
        }
    }

    struct Sleepy(Duration);

    #[async_trait]
    impl Handler for Sleepy {
        async fn serve(&self, _request: Request, response: &mut dyn ResponseWriter) {
            tokio::time::sleep(self.0).await;
            response.write_body(b"late").await;
        }
    }

    fn instrumented_router(handler: impl Handler + 'static, metrics: &Metrics) -> RequestRouter {
        let metrics = metrics.clone();
        RequestRouter::new(RouteTable::new().nest("/", handler).unwrap())
            .layer(move |inner| Instrumented::new(inner, metrics))
    }

    fn request(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    /// Read the whole body, letting the handler run to completion
    async fn finish(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn status_count(metrics: &Metrics, status: &str) -> Option<f64> {
        sample(&metrics.gather().unwrap(), RESPONSE_STATUS_TOTAL, "status", status)
    }

    fn request_count(metrics: &Metrics, path: &str) -> Option<f64> {
        sample(&metrics.gather().unwrap(), REQUESTS_TOTAL, "path", path)
    }

    fn duration_count(metrics: &Metrics, path: &str) -> Option<f64> {
        sample(
            &metrics.gather().unwrap(),
            &format!("{}_count", RESPONSE_DURATION_SECONDS),
            "path",
            path,
        )
    }

    #[tokio::test]
    async fn test_default_status_recorded_as_200() {
        let metrics = Metrics::new().unwrap();
        let router = instrumented_router(Scripted(vec![]), &metrics);

        let response = router.handle(request("/file.txt")).await;

        assert_eq!(response.status(), StatusCode::OK);
        finish(response).await;
        assert_eq!(status_count(&metrics, "200"), Some(1.0));
        assert_eq!(request_count(&metrics, "/"), Some(1.0));
        assert_eq!(duration_count(&metrics, "/"), Some(1.0));
    }

    #[tokio::test]
    async fn test_explicit_status_counted_once_and_no_other() {
        let metrics = Metrics::new().unwrap();
        let router = instrumented_router(Scripted(vec![StatusCode::NOT_FOUND]), &metrics);

        let response = router.handle(request("/missing")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        finish(response).await;
        assert_eq!(status_count(&metrics, "404"), Some(1.0));
        assert_eq!(status_count(&metrics, "200"), None);
    }

    #[tokio::test]
    async fn test_last_status_write_wins() {
        let metrics = Metrics::new().unwrap();
        let router = instrumented_router(
            Scripted(vec![
                StatusCode::OK,
                StatusCode::FORBIDDEN,
                StatusCode::INTERNAL_SERVER_ERROR,
            ]),
            &metrics,
        );

        let response = router.handle(request("/x")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        finish(response).await;
        assert_eq!(status_count(&metrics, "500"), Some(1.0));
        assert_eq!(status_count(&metrics, "403"), None);
        assert_eq!(status_count(&metrics, "200"), None);
    }

    #[tokio::test]
    async fn test_unmatched_request_uses_empty_label() {
        let metrics = Metrics::new().unwrap();
        let m = metrics.clone();
        let router = RequestRouter::new(
            RouteTable::new()
                .route("/metrics", Scripted(vec![]))
                .unwrap(),
        )
        .layer(move |inner| Instrumented::new(inner, m));

        let response = router.handle(request("/nowhere")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        finish(response).await;
        assert_eq!(request_count(&metrics, ""), Some(1.0));
        assert_eq!(status_count(&metrics, "404"), Some(1.0));
    }

    #[tokio::test]
    async fn test_response_passes_through_unchanged() {
        let metrics = Metrics::new().unwrap();
        let router = instrumented_router(Scripted(vec![StatusCode::ACCEPTED]), &metrics);

        let response = router.handle(request("/")).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(finish(response).await, b"done");
    }

    #[tokio::test]
    async fn test_recorded_once_body_is_delivered() {
        let metrics = Metrics::new().unwrap();
        let router = instrumented_router(Chunked(StatusCode::CREATED), &metrics);

        let response = router.handle(request("/")).await;
        assert_eq!(request_count(&metrics, "/"), None, "body not read yet");

        assert_eq!(finish(response).await.len(), BODY_CHANNEL_CAPACITY * 2 * 5);
        assert_eq!(request_count(&metrics, "/"), Some(1.0));
        assert_eq!(status_count(&metrics, "201"), Some(1.0));
    }

    #[tokio::test]
    async fn test_abandoned_response_is_recorded_once() {
        let metrics = Metrics::new().unwrap();
        let router = instrumented_router(Chunked(StatusCode::PARTIAL_CONTENT), &metrics);

        let response = router.handle(request("/")).await;
        assert_eq!(request_count(&metrics, "/"), None);
        drop(response);

        assert_eq!(request_count(&metrics, "/"), Some(1.0));
        assert_eq!(status_count(&metrics, "206"), Some(1.0));
        assert_eq!(duration_count(&metrics, "/"), Some(1.0));
    }

    #[tokio::test]
    async fn test_duration_covers_handler_time() {
        let metrics = Metrics::new().unwrap();
        let router = instrumented_router(Sleepy(Duration::from_millis(20)), &metrics);

        finish(router.handle(request("/slow")).await).await;

        let output = metrics.gather().unwrap();
        let sum = sample(
            &output,
            &format!("{}_sum", RESPONSE_DURATION_SECONDS),
            "path",
            "/",
        )
        .unwrap();
        assert!(sum >= 0.02, "expected at least 20ms, got {}s", sum);
    }

    #[tokio::test]
    async fn test_dropped_request_is_recorded_once() {
        let metrics = Metrics::new().unwrap();
        let handler = Instrumented::new(Sleepy(Duration::from_secs(60)), metrics.clone());

        let mut buffer = ResponseBuffer::new();
        let mut request = request("/slow");
        request.extensions_mut().insert(
            RouteTable::new()
                .nest("/", Scripted(vec![]))
                .unwrap()
                .resolve("/slow")
                .unwrap(),
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            handler.serve(request, &mut buffer),
        )
        .await;
        assert!(outcome.is_err(), "handler should still be sleeping");

        assert_eq!(request_count(&metrics, "/"), Some(1.0));
        assert_eq!(status_count(&metrics, "200"), Some(1.0));
        assert_eq!(duration_count(&metrics, "/"), Some(1.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_counted_exactly() {
        const N: usize = 500;

        let metrics = Metrics::new().unwrap();
        let router = Arc::new(instrumented_router(
            Sleepy(Duration::from_millis(1)),
            &metrics,
        ));

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let response = router.handle(request(&format!("/f{}", i))).await;
                    let status = response.status();
                    finish(response).await;
                    status
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap(), StatusCode::OK);
        }

        assert_eq!(request_count(&metrics, "/"), Some(N as f64));
        assert_eq!(status_count(&metrics, "200"), Some(N as f64));
        assert_eq!(duration_count(&metrics, "/"), Some(N as f64));
    }

    #[test]
    fn test_route_label_defaults_to_empty() {
        assert_eq!(route_label(&request("/x")), "");
    }
}
