//! Server assembly
//!
//! Builds the instrumented route tree from configuration and mounts it in an
//! axum application, then runs it until shutdown.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::handlers::{files::FileServer, metrics::MetricsHandler};
use crate::metrics::Metrics;
use crate::middleware::{Instrumented, request_id::request_id_middleware};
use crate::router::{RequestRouter, RouteTable};
use axum::{
    Router,
    extract::{Request, State},
    middleware,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the route tree: the metrics endpoint and the file server, with the
/// whole tree wrapped in request instrumentation
pub fn build_router(config: &Config, metrics: Metrics) -> AppResult<RequestRouter> {
    let files = FileServer::new(&config.files.root)?;

    let root = files.root().display().to_string();

    let table = RouteTable::new()
        .route(&config.metrics.path, MetricsHandler::new(metrics.clone()))?
        .nest(&config.files.mount, files)?;

    tracing::info!(
        root = %root,
        mount = %config.files.mount,
        metrics_path = %config.metrics.path,
        routes = table.len(),
        "Routes built"
    );

    Ok(RequestRouter::new(table).layer(move |inner| Instrumented::new(inner, metrics)))
}

/// Mount `router` in an axum application
///
/// Every request reaches the router through a single fallback, so path
/// matching (and the template used as the metrics label) is owned by
/// [`RequestRouter`].
pub fn app(router: RequestRouter) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(Arc::new(router))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(router): State<Arc<RequestRouter>>, request: Request) -> Response {
    router.handle(request).await
}

/// Socket address for the configured host and port
///
/// An unparseable host falls back to all interfaces.
pub fn socket_addr(config: &Config) -> SocketAddr {
    let ip = config.server.host.parse::<IpAddr>().unwrap_or_else(|_| {
        tracing::warn!(
            host = %config.server.host,
            "Invalid host address, binding to 0.0.0.0"
        );
        IpAddr::from([0, 0, 0, 0])
    });
    SocketAddr::from((ip, config.server.port))
}

/// Bind the configured address and serve until Ctrl-C or SIGTERM
pub async fn run(config: &Config, metrics: Metrics) -> AppResult<()> {
    let router = build_router(config, metrics)?;
    let addr = socket_addr(config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    tracing::info!("Listening on {}", addr);
    tracing::info!(
        "Metrics available at http://{}{}",
        addr,
        config.metrics.path
    );

    axum::serve(listener, app(router))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
