//! HTTP request handlers for filemetrics

use crate::response::ResponseWriter;
use async_trait::async_trait;
use axum::extract::Request;
use std::sync::Arc;

pub mod files;
pub mod metrics;

/// A downstream request handler
///
/// Handlers write their response through `response` and never return an
/// error: a failure is expressed only by the status code written.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, request: Request, response: &mut dyn ResponseWriter);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve(&self, request: Request, response: &mut dyn ResponseWriter) {
        (**self).serve(request, response).await
    }
}
