//! Instrumentation overhead benchmarks
//!
//! Compares serving a trivial handler bare and wrapped in request metrics,
//! and measures route resolution on its own.
//!
//! Run with: `cargo bench`

use async_trait::async_trait;
use axum::{body::Body, extract::Request, http::StatusCode};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use filemetrics::{
    handlers::Handler,
    metrics::Metrics,
    middleware::Instrumented,
    response::ResponseWriter,
    router::{RequestRouter, RouteTable},
};
use std::hint::black_box;

/// Handler that does no work beyond writing a status and a short body
struct Noop;

#[async_trait]
impl Handler for Noop {
    async fn serve(&self, _request: Request, response: &mut dyn ResponseWriter) {
        response.write_status(StatusCode::NO_CONTENT);
        response.write_body(b"ok").await;
    }
}

fn table() -> RouteTable {
    RouteTable::new()
        .route("/metrics", Noop)
        .and_then(|t| t.route("/users/{id}", Noop))
        .and_then(|t| t.nest("/static/", Noop))
        .and_then(|t| t.nest("/", Noop))
        .expect("valid routes")
}

fn request(path: &str) -> Request {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("valid request")
}

/// Per-request cost of the metrics middleware
fn bench_instrumented_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let metrics = Metrics::new().expect("metrics");

    let bare = RequestRouter::new(table());
    let instrumented = RequestRouter::new(table())
        .layer(move |inner| Instrumented::new(inner, metrics));

    let mut group = c.benchmark_group("dispatch");
    for (name, router) in [("bare", &bare), ("instrumented", &instrumented)] {
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.to_async(&runtime)
                .iter(|| async move { black_box(router.handle(request("/static/app.js")).await) });
        });
    }
    group.finish();
}

/// Route resolution for each kind of template
fn bench_resolve(c: &mut Criterion) {
    let table = table();
    let mut group = c.benchmark_group("resolve");

    for path in ["/metrics", "/users/42", "/static/css/site.css", "/index.html"] {
        group.bench_with_input(BenchmarkId::from_parameter(path), path, |b, p| {
            b.iter(|| table.resolve(black_box(p)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_instrumented_dispatch, bench_resolve);
criterion_main!(benches);
