//! filemetrics - static file server with Prometheus request metrics
//!
//! Every request passing through the server is counted by route, counted by
//! response status and timed into a latency histogram. The metrics are exposed
//! in the Prometheus text format on a scrape endpoint.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod router;
pub mod server;
pub mod telemetry;
