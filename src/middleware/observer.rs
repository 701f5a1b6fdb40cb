//! Status-capturing response decorator
//!
//! Wraps a [`ResponseWriter`] and remembers the status code that was sent.
//! Everything else passes through untouched.

use crate::response::ResponseWriter;
use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};

/// Decorator that records the status code written through it
///
/// The recorded status starts at `200 OK`, which is what the wrapped writer
/// sends when the handler never sets one. A status write that reaches the
/// writer after the head was committed is dropped by the writer, so the
/// observer does not record it either: [`status`](Self::status) always
/// reports what was actually sent.
#[derive(Debug)]
pub struct ResponseObserver<W> {
    inner: W,
    status: StatusCode,
}

impl<W: ResponseWriter> ResponseObserver<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            status: StatusCode::OK,
        }
    }

    /// The status code that was, or will be, sent
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: ResponseWriter> ResponseWriter for ResponseObserver<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if !self.inner.headers_sent() {
            self.status = status;
        }
        self.inner.write_status(status);
    }

    async fn write_body(&mut self, chunk: &[u8]) {
        self.inner.write_body(chunk).await;
    }

    fn headers_sent(&self) -> bool {
        self.inner.headers_sent()
    }
}
