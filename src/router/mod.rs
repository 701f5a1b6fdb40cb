//! Request routing
//!
//! [`RouteTable`] maps route templates to handlers. [`RequestRouter`] resolves
//! each request against the table, records the match in the request
//! extensions as a [`MatchedRoute`], and then runs the entry handler: the
//! table itself, usually wrapped in middleware via [`RequestRouter::layer`].

pub mod template;

use crate::error::AppResult;
use crate::handlers::Handler;
use crate::response::{ResponseWriter, stream_response, write_error};
use async_trait::async_trait;
use axum::{extract::Request, http::StatusCode, response::Response};
use std::sync::Arc;

pub use template::RouteTemplate;

/// The route a request resolved to
///
/// Inserted into the request extensions by [`RequestRouter`]. Unmatched
/// requests carry no `MatchedRoute`.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    template: String,
    params: Vec<(String, String)>,
    remainder: String,
    index: usize,
}

impl MatchedRoute {
    /// The template that matched, e.g. `/files/{name}`
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Value of the `{name}` parameter, if the template has one
    #[cfg(test)]
    pub(crate) fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Path below a prefix route (`/` for exact routes)
    pub fn remainder(&self) -> &str {
        &self.remainder
    }
}

struct Route {
    template: RouteTemplate,
    handler: Arc<dyn Handler>,
}

/// Ordered set of routes; the first registered match wins
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for paths matching `template` exactly
    pub fn route<H: Handler + 'static>(mut self, template: &str, handler: H) -> AppResult<Self> {
        self.routes.push(Route {
            template: RouteTemplate::exact(template)?,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    /// Register `handler` for every path starting with `template`
    pub fn nest<H: Handler + 'static>(mut self, template: &str, handler: H) -> AppResult<Self> {
        self.routes.push(Route {
            template: RouteTemplate::prefix(template)?,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    /// Find the first route matching `path`
    pub fn resolve(&self, path: &str) -> Option<MatchedRoute> {
        self.routes.iter().enumerate().find_map(|(index, route)| {
            route.template.matches(path).map(|m| MatchedRoute {
                template: route.template.as_str().to_string(),
                params: m.params,
                remainder: m.remainder,
                index,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Handler for RouteTable {
    async fn serve(&self, request: Request, response: &mut dyn ResponseWriter) {
        let route = request
            .extensions()
            .get::<MatchedRoute>()
            .and_then(|matched| self.routes.get(matched.index));

        match route {
            Some(route) => route.handler.serve(request, response).await,
            None => {
                tracing::debug!(path = %request.uri().path(), "No route matched");
                write_error(response, StatusCode::NOT_FOUND, "404 page not found").await;
            }
        }
    }
}

/// Resolves routes and runs the (possibly wrapped) route table
pub struct RequestRouter {
    table: Arc<RouteTable>,
    entry: Arc<dyn Handler>,
}

impl RequestRouter {
    pub fn new(table: RouteTable) -> Self {
        if table.is_empty() {
            tracing::warn!("No routes registered, every request will get 404");
        }
        let table = Arc::new(table);
        Self {
            entry: table.clone(),
            table,
        }
    }

    /// Wrap the whole route tree in middleware
    ///
    /// The middleware sees every request, matched or not, with
    /// [`MatchedRoute`] already present in the extensions when a route matched.
    pub fn layer<L, F>(self, wrap: F) -> Self
    where
        F: FnOnce(Arc<dyn Handler>) -> L,
        L: Handler + 'static,
    {
        Self {
            entry: Arc::new(wrap(self.entry)),
            table: self.table,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    fn resolve(&self, mut request: Request) -> Request {
        if let Some(matched) = self.table.resolve(request.uri().path()) {
            tracing::trace!(
                template = %matched.template,
                params = ?matched.params,
                "Route matched"
            );
            request.extensions_mut().insert(matched);
        }
        request
    }

    /// Serve one request into `response`
    pub async fn dispatch(&self, request: Request, response: &mut dyn ResponseWriter) {
        let request = self.resolve(request);
        self.entry.serve(request, response).await;
    }

    /// Serve one request as a streamed axum response
    ///
    /// Returns once the handler has committed the head. The handler keeps
    /// running as the body is read.
    pub async fn handle(&self, request: Request) -> Response {
        let request = self.resolve(request);
        let entry = Arc::clone(&self.entry);
        stream_response(move |mut response| async move {
            entry.serve(request, &mut response).await;
        })
        .await
    }
}
