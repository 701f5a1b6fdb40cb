//! Static file handler
//!
//! Serves files and directory listings below a root directory. Request paths
//! are percent-decoded and cleaned so they can never leave the root.

use crate::error::{AppError, AppResult};
use crate::handlers::Handler;
use crate::response::{ResponseWriter, write_error};
use crate::router::MatchedRoute;
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header, request::Parts},
};
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncReadExt;

/// Bytes inspected when guessing the type of a file with an unknown extension
const SNIFF_LEN: usize = 512;

/// Largest read handed to the response in one piece
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Handler serving the contents of a directory tree
#[derive(Debug, Clone)]
pub struct FileServer {
    root: PathBuf,
}

impl FileServer {
    /// Create a file server for `root`
    ///
    /// # Errors
    ///
    /// Returns `AppError::FileRoot` if `root` does not exist or is not a
    /// directory.
    pub fn new(root: impl AsRef<Path>) -> AppResult<Self> {
        let root = root.as_ref();
        let file_root_error = |source| AppError::FileRoot {
            path: root.display().to_string(),
            source,
        };

        let canonical = std::fs::canonicalize(root).map_err(file_root_error)?;
        if !canonical.is_dir() {
            return Err(file_root_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }

        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn serve_path(&self, url_path: &str, request: &Parts, response: &mut dyn ResponseWriter) {
        let query = request.uri.query();

        if url_path.ends_with("/index.html") {
            redirect(response, "./", query).await;
            return;
        }

        let cleaned = clean_path(url_path);
        let full = self.root.join(cleaned.trim_start_matches('/'));

        let metadata = match tokio::fs::metadata(&full).await {
            Ok(metadata) => metadata,
            Err(e) => {
                write_io_error(response, &full, &e).await;
                return;
            }
        };

        if metadata.is_dir() {
            if !url_path.ends_with('/') {
                let target = format!("{}/", urlencoding::encode(base_name(url_path)));
                redirect(response, &target, query).await;
                return;
            }

            let index = full.join("index.html");
            match tokio::fs::metadata(&index).await {
                Ok(index_meta) if index_meta.is_file() => {
                    serve_file(response, &index, &index_meta, request).await
                }
                _ => list_directory(response, &full).await,
            }
        } else {
            if url_path.ends_with('/') {
                let target = format!("../{}", urlencoding::encode(base_name(url_path)));
                redirect(response, &target, query).await;
                return;
            }
            serve_file(response, &full, &metadata, request).await;
        }
    }
}

#[async_trait]
impl Handler for FileServer {
    async fn serve(&self, request: Request, response: &mut dyn ResponseWriter) {
        let raw = request
            .extensions()
            .get::<MatchedRoute>()
            .map(|matched| matched.remainder().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        let url_path = match urlencoding::decode(&raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(e) => {
                tracing::debug!(path = %raw, error = %e, "Request path is not valid UTF-8");
                write_error(response, StatusCode::BAD_REQUEST, "400 Bad Request").await;
                return;
            }
        };

        let (parts, _body) = request.into_parts();
        self.serve_path(&url_path, &parts, response).await;
    }
}

/// Normalise a URL path the way a file server resolves it
///
/// Collapses duplicate slashes, drops `.` segments and resolves `..` without
/// ever climbing above `/`. The result always starts with `/`.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Last non-empty segment of `path`
fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

async fn redirect(response: &mut dyn ResponseWriter, target: &str, query: Option<&str>) {
    let location = match query {
        Some(q) if !q.is_empty() => format!("{}?{}", target, q),
        _ => target.to_string(),
    };
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
            response.write_status(StatusCode::MOVED_PERMANENTLY);
        }
        Err(e) => {
            tracing::warn!(location = %location, error = %e, "Redirect target is not a valid header");
            write_error(
                response,
                StatusCode::INTERNAL_SERVER_ERROR,
                "500 Internal Server Error",
            )
            .await;
        }
    }
}

async fn write_io_error(response: &mut dyn ResponseWriter, path: &Path, error: &io::Error) {
    let (status, message) = match error.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
            (StatusCode::NOT_FOUND, "404 page not found")
        }
        io::ErrorKind::PermissionDenied => (StatusCode::FORBIDDEN, "403 Forbidden"),
        _ => {
            tracing::warn!(path = %path.display(), error = %error, "Failed to access file");
            (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error")
        }
    };
    write_error(response, status, message).await;
}

/// Format `time` as an HTTP date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Whether a conditional GET can be answered with `304 Not Modified`
///
/// Modification times compare at whole-second precision, the resolution of
/// HTTP dates.
fn not_modified(request: &Parts, modified: SystemTime) -> bool {
    if request.method != Method::GET && request.method != Method::HEAD {
        return false;
    }
    let Some(since) = request
        .headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
    else {
        return false;
    };
    DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
}

/// Read into `buf` until it is full or the file ends
async fn fill(file: &mut tokio::fs::File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

async fn serve_file(
    response: &mut dyn ResponseWriter,
    path: &Path,
    metadata: &Metadata,
    request: &Parts,
) {
    let modified = metadata
        .modified()
        .ok()
        .filter(|modified| *modified > SystemTime::UNIX_EPOCH);

    if let Some(modified) = modified {
        if let Ok(value) = HeaderValue::from_str(&http_date(modified)) {
            response.headers_mut().insert(header::LAST_MODIFIED, value);
        }
        if not_modified(request, modified) {
            response.write_status(StatusCode::NOT_MODIFIED);
            return;
        }
    }

    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            write_io_error(response, path, &e).await;
            return;
        }
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = match fill(&mut file, &mut buf).await {
        Ok(filled) => filled,
        Err(e) => {
            write_io_error(response, path, &e).await;
            return;
        }
    };

    let headers = response.headers_mut();
    if !headers.contains_key(header::CONTENT_TYPE) {
        let content_type = content_type_for(path, &buf[..filled]);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    response.write_status(StatusCode::OK);

    if request.method == Method::HEAD {
        return;
    }

    loop {
        response.write_body(&buf[..filled]).await;
        if filled < buf.len() {
            return;
        }
        filled = match fill(&mut file, &mut buf).await {
            Ok(0) => return,
            Ok(filled) => filled,
            Err(e) => {
                // The head is already on its way; all we can do is stop
                tracing::warn!(path = %path.display(), error = %e, "Failed while streaming file");
                return;
            }
        };
    }
}

async fn list_directory(response: &mut dyn ResponseWriter, dir: &Path) {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) => {
            write_io_error(response, dir, &e).await;
            return;
        }
    };

    let mut entries = Vec::new();
    loop {
        match reader.next_entry().await {
            Ok(Some(entry)) => {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                let is_dir = entry
                    .file_type()
                    .await
                    .map(|file_type| file_type.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    name.push('/');
                }
                entries.push(name);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Error reading directory");
                write_error(
                    response,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error reading directory",
                )
                .await;
                return;
            }
        }
    }
    entries.sort();

    let mut html = String::from(
        "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n",
    );
    for name in &entries {
        let (stem, slash) = match name.strip_suffix('/') {
            Some(stem) => (stem, "/"),
            None => (name.as_str(), ""),
        };
        html.push_str(&format!(
            "<a href=\"{}{}\">{}</a>\n",
            urlencoding::encode(stem),
            slash,
            escape_html(name)
        ));
    }
    html.push_str("</pre>\n");

    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response.write_status(StatusCode::OK);
    response.write_body(html.as_bytes()).await;
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Content type for `path`, from its extension or, failing that, its bytes
pub fn content_type_for(path: &Path, contents: &[u8]) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let by_extension = match extension.as_deref() {
        Some("html" | "htm") => Some("text/html; charset=utf-8"),
        Some("css") => Some("text/css; charset=utf-8"),
        Some("js" | "mjs") => Some("text/javascript; charset=utf-8"),
        Some("json") => Some("application/json"),
        Some("xml") => Some("text/xml; charset=utf-8"),
        Some("txt") => Some("text/plain; charset=utf-8"),
        Some("csv") => Some("text/csv; charset=utf-8"),
        Some("md") => Some("text/markdown; charset=utf-8"),
        Some("pdf") => Some("application/pdf"),
        Some("wasm") => Some("application/wasm"),
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("svg") => Some("image/svg+xml"),
        Some("webp") => Some("image/webp"),
        Some("avif") => Some("image/avif"),
        Some("ico") => Some("image/vnd.microsoft.icon"),
        Some("woff2") => Some("font/woff2"),
        _ => None,
    };

    by_extension.unwrap_or_else(|| sniff(contents))
}

fn sniff(contents: &[u8]) -> &'static str {
    let head = &contents[..contents.len().min(SNIFF_LEN)];
    if head.contains(&0) {
        return "application/octet-stream";
    }
    match std::str::from_utf8(head) {
        Ok(_) => "text/plain; charset=utf-8",
        // A multi-byte character cut off by the sniff window is still text
        Err(e) if e.error_len().is_none() => "text/plain; charset=utf-8",
        Err(_) => "application/octet-stream",
    }
}
