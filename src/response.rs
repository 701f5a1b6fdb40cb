//! Outbound response channel
//!
//! Handlers never build an `axum::response::Response` directly. They write
//! through a [`ResponseWriter`]: set headers, optionally set a status, then
//! write body bytes. The first body write commits the head (status + headers);
//! later status writes are ignored, matching ordinary HTTP server semantics.
//!
//! [`stream_response`] runs a handler against a [`ResponseStream`] and hands
//! the response to the client as soon as its head is committed. The body then
//! flows through a small bounded channel, so a handler can never get more
//! than a few chunks ahead of the client.

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::stream;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};

/// Body chunks that may be queued ahead of the client
pub const BODY_CHANNEL_CAPACITY: usize = 4;

/// The capability set a downstream handler writes through
#[async_trait]
pub trait ResponseWriter: Send {
    /// Mutable access to the response headers
    ///
    /// Changes made after the head was committed are not sent.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the response status
    ///
    /// Has no effect once the head has been committed.
    fn write_status(&mut self, status: StatusCode);

    /// Append bytes to the response body, committing the head on first use
    ///
    /// Waits while the client is behind.
    async fn write_body(&mut self, chunk: &[u8]);

    /// Whether the status and headers have already been committed
    fn headers_sent(&self) -> bool;
}

#[async_trait]
impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    async fn write_body(&mut self, chunk: &[u8]) {
        (**self).write_body(chunk).await
    }

    fn headers_sent(&self) -> bool {
        (**self).headers_sent()
    }
}

struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

fn warn_late_status(sent: StatusCode, ignored: StatusCode) {
    tracing::warn!(
        sent = sent.as_u16(),
        ignored = ignored.as_u16(),
        "Superfluous status write after body was started"
    );
}

/// [`ResponseWriter`] whose body is streamed to the client as it is written
///
/// The head is handed over on the first body write, or when the writer is
/// dropped without having written a body.
pub struct ResponseStream {
    status: StatusCode,
    headers: HeaderMap,
    head: Option<oneshot::Sender<Head>>,
    chunks: mpsc::Sender<Bytes>,
}

impl ResponseStream {
    fn commit(&mut self) {
        if let Some(head) = self.head.take() {
            let sent = head.send(Head {
                status: self.status,
                headers: self.headers.clone(),
            });
            if sent.is_err() {
                tracing::debug!("Response abandoned before its head was sent");
            }
        }
    }
}

#[async_trait]
impl ResponseWriter for ResponseStream {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.headers_sent() {
            warn_late_status(self.status, status);
            return;
        }
        self.status = status;
    }

    async fn write_body(&mut self, chunk: &[u8]) {
        self.commit();
        if chunk.is_empty() {
            return;
        }
        if self.chunks.send(Bytes::copy_from_slice(chunk)).await.is_err() {
            tracing::debug!("Client went away, discarding response body");
        }
    }

    fn headers_sent(&self) -> bool {
        self.head.is_none()
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.commit();
    }
}

type Serving = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Drives the rest of the handler while the client reads the body
struct Pump {
    serving: Option<Serving>,
    chunks: mpsc::Receiver<Bytes>,
}

impl Pump {
    async fn next(mut self) -> Option<(Result<Bytes, Infallible>, Self)> {
        if let Some(serving) = self.serving.as_mut() {
            tokio::select! {
                chunk = self.chunks.recv() => match chunk {
                    Some(chunk) => return Some((Ok(chunk), self)),
                    // The writer is gone, so the handler is about to return
                    None => {
                        serving.await;
                        return None;
                    }
                },
                () = &mut *serving => {
                    self.serving = None;
                }
            }
        }
        self.chunks.recv().await.map(|chunk| (Ok(chunk), self))
    }
}

/// Run `serve` against a fresh [`ResponseStream`] and return the response as
/// soon as its head is committed
///
/// The returned body drives the remainder of `serve`: the handler finishes
/// when the client has read the whole body, and dropping the response part
/// way drops the handler with it.
pub async fn stream_response<F, Fut>(serve: F) -> Response
where
    F: FnOnce(ResponseStream) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (head_tx, mut head_rx) = oneshot::channel();
    let (chunk_tx, chunk_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    let writer = ResponseStream {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        head: Some(head_tx),
        chunks: chunk_tx,
    };
    let mut serving: Serving = Box::pin(serve(writer));

    let (head, finished) = tokio::select! {
        head = &mut head_rx => (head, false),
        () = &mut serving => (head_rx.await, true),
    };

    let Ok(head) = head else {
        tracing::error!("Handler dropped its response without a head");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return response;
    };

    let pump = Pump {
        serving: (!finished).then_some(serving),
        chunks: chunk_rx,
    };
    let mut response = Response::new(Body::from_stream(stream::unfold(pump, Pump::next)));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}

/// Write a plain-text error response
///
/// The body is `message` followed by a newline. Content sniffing is disabled so
/// browsers render it as text.
pub async fn write_error(response: &mut dyn ResponseWriter, status: StatusCode, message: &str) {
    let headers = response.headers_mut();
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::LAST_MODIFIED);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.write_status(status);
    response.write_body(format!("{}\n", message).as_bytes()).await;
}

/// In-memory [`ResponseWriter`] for inspecting what a handler wrote
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ResponseBuffer {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    committed: bool,
}

#[cfg(test)]
impl ResponseBuffer {
    pub(crate) fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            committed: false,
        }
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
#[async_trait]
impl ResponseWriter for ResponseBuffer {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.committed {
            warn_late_status(self.status, status);
            return;
        }
        self.status = status;
    }

    async fn write_body(&mut self, chunk: &[u8]) {
        self.committed = true;
        self.body.extend_from_slice(chunk);
    }

    fn headers_sent(&self) -> bool {
        self.committed
    }
}
