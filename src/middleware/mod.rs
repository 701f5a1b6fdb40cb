//! Request middleware
//!
//! - [`instrument`]: per-request metrics around the route tree
//! - [`observer`]: the status-capturing response decorator it relies on
//! - [`request_id`]: axum layer tagging requests with an ID

pub mod instrument;
pub mod observer;
pub mod request_id;

pub use instrument::Instrumented;
pub use observer::ResponseObserver;
