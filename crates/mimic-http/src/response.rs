//! HTTP response wrapper shared by every backend
//!
//! A [`Response`] is either *unread* (the body is still on the wire and is
//! pulled on demand) or *materialized* (the body is buffered and the network
//! handle has been released). Release happens at most once: on `close()`, at
//! the end of an iteration, when an iteration is abandoned, or on drop.

use crate::error::{HttpError, HttpResult};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use http::HeaderMap;
use mimic_common::HttpStatus;
use serde::de::DeserializeOwned;
use std::fmt;

/// Chunk size used when callers have no preference.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Live body handle. Dropping it releases the underlying connection.
type LiveBody = BoxStream<'static, HttpResult<Bytes>>;

enum Body {
    Unread(LiveBody),
    Materialized(Bytes),
    /// Handle released without the body being buffered.
    Released,
}

impl Body {
    fn take_live(&mut self) -> Option<LiveBody> {
        match std::mem::replace(self, Body::Released) {
            Body::Unread(live) => Some(live),
            other => {
                *self = other;
                None
            }
        }
    }
}

/// HTTP response with buffered or streamed body access
pub struct Response {
    /// HTTP status code
    pub status_code: u16,

    /// Response headers (case-insensitive)
    pub headers: HeaderMap,

    /// Final URL (may differ from request URL due to redirects)
    pub url: String,

    body: Body,
    /// Temporary engine session created for this request alone
    owned_session: Option<reqwest::Client>,
    closed: bool,
}

impl Response {
    /// Response whose body is already in memory.
    pub fn buffered(
        status_code: u16,
        headers: HeaderMap,
        url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status_code,
            headers,
            url: url.into(),
            body: Body::Materialized(body.into()),
            owned_session: None,
            closed: true,
        }
    }

    /// Response backed by a live chunk stream. Dropping the stream must
    /// release whatever resource it reads from.
    pub fn streaming<S>(status_code: u16, headers: HeaderMap, url: impl Into<String>, body: S) -> Self
    where
        S: Stream<Item = HttpResult<Bytes>> + Send + 'static,
    {
        Self {
            status_code,
            headers,
            url: url.into(),
            body: Body::Unread(body.boxed()),
            owned_session: None,
            closed: false,
        }
    }

    /// Wrap a live engine response.
    pub(crate) fn from_engine(response: reqwest::Response, owned_session: Option<reqwest::Client>) -> Self {
        let status_code = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.bytes_stream().map_err(HttpError::from_engine);

        let mut wrapped = Self::streaming(status_code, headers, url, body);
        wrapped.owned_session = owned_session;
        wrapped
    }

    /// Read the whole body and release the handle.
    pub(crate) async fn materialize(mut self) -> HttpResult<Self> {
        self.read_body().await?;
        Ok(self)
    }

    pub fn status(&self) -> HttpStatus {
        HttpStatus(self.status_code)
    }

    /// Check if status is success (2xx)
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Buffered body, or empty if the body was never materialized.
    pub fn content(&self) -> &[u8] {
        match &self.body {
            Body::Materialized(bytes) => bytes,
            _ => &[],
        }
    }

    /// True once the body has been read into memory.
    pub fn is_materialized(&self) -> bool {
        matches!(self.body, Body::Materialized(_))
    }

    /// True once the network handle and any temporary session are released.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True while this response owns a per-request engine session.
    pub fn owns_session(&self) -> bool {
        self.owned_session.is_some()
    }

    /// Body decoded as UTF-8, invalid sequences replaced. Reads the stream
    /// first if the body is still unread.
    pub async fn text(&mut self) -> HttpResult<String> {
        let body = self.read_body().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Parsed JSON body. An empty body parses as an empty object.
    ///
    /// Fails with [`HttpError::Usage`] while the body is still unread; call
    /// [`text`](Self::text) first on streamed responses.
    pub fn json(&self) -> HttpResult<serde_json::Value> {
        let body = self.require_materialized()?;
        if body.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        Ok(mimic_common::json::loads(&utf8_lossy_bytes(body))?)
    }

    /// Deserialize the buffered body into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> HttpResult<T> {
        serde_json::from_value(self.json()?)
            .map_err(|e| HttpError::Json(format!("Failed to deserialize JSON: {}", e)))
    }

    /// Lazy sequence of body chunks.
    ///
    /// A materialized body is yielded once as a whole. A live body is yielded
    /// at the engine's chunk granularity; the requested size is advisory. The
    /// handle is released when the sequence ends or is dropped early, and the
    /// sequence cannot be restarted.
    pub fn aiter_content(
        &mut self,
        _chunk_size: usize,
    ) -> impl Stream<Item = HttpResult<Bytes>> + Send + '_ {
        async_stream::try_stream! {
            let mut guard = ReleaseGuard(self);
            match guard.0.body.take_live() {
                Some(mut live) => {
                    while let Some(chunk) = live.next().await {
                        let chunk = chunk?;
                        if !chunk.is_empty() {
                            yield chunk;
                        }
                    }
                }
                None => {
                    let buffered = guard.0.materialized_bytes();
                    if let Some(bytes) = buffered.filter(|b| !b.is_empty()) {
                        yield bytes;
                    }
                }
            }
        }
    }

    /// Lazy sequence of text lines.
    ///
    /// Lines split on `\n` with any trailing `\r` stripped; a partial line is
    /// carried across chunks and flushed when the stream ends. Release
    /// semantics match [`aiter_content`](Self::aiter_content).
    pub fn aiter_lines(&mut self) -> impl Stream<Item = HttpResult<String>> + Send + '_ {
        async_stream::try_stream! {
            let mut guard = ReleaseGuard(self);
            match guard.0.body.take_live() {
                Some(mut live) => {
                    let mut splitter = LineSplitter::default();
                    while let Some(chunk) = live.next().await {
                        let chunk = chunk?;
                        for line in splitter.push(&chunk) {
                            yield line;
                        }
                    }
                    if let Some(rest) = splitter.finish() {
                        yield rest;
                    }
                }
                None => {
                    let mut splitter = LineSplitter::default();
                    let mut lines = guard
                        .0
                        .materialized_bytes()
                        .map(|b| splitter.push(&b))
                        .unwrap_or_default();
                    lines.extend(splitter.finish());
                    for line in lines {
                        yield line;
                    }
                }
            }
        }
    }

    /// Release the live handle and any owned session. Idempotent.
    pub async fn close(&mut self) {
        self.release();
        tokio::task::yield_now().await;
    }

    /// Run `f` with this response, closing it on every exit path.
    pub async fn scoped<T, F>(mut self, f: F) -> T
    where
        F: for<'a> FnOnce(&'a mut Response) -> BoxFuture<'a, T>,
    {
        let out = f(&mut self).await;
        self.close().await;
        out
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(live) = self.body.take_live() {
            drop(live);
        }
        if let Some(session) = self.owned_session.take() {
            drop(session);
        }
    }

    async fn read_body(&mut self) -> HttpResult<Bytes> {
        if let Body::Materialized(bytes) = &self.body {
            return Ok(bytes.clone());
        }
        // Released on every exit, including cancellation mid-read.
        let mut guard = ReleaseGuard(self);
        let mut live = guard.0.body.take_live().ok_or_else(|| {
            HttpError::Usage("response body was already consumed or closed".to_string())
        })?;

        let mut buf = Vec::new();
        while let Some(chunk) = live.next().await {
            buf.extend_from_slice(&chunk?);
        }
        drop(live);

        let bytes = Bytes::from(buf);
        guard.0.body = Body::Materialized(bytes.clone());
        drop(guard);
        tokio::task::yield_now().await;
        Ok(bytes)
    }

    fn require_materialized(&self) -> HttpResult<&Bytes> {
        match &self.body {
            Body::Materialized(bytes) => Ok(bytes),
            _ => Err(HttpError::Usage(
                "JSON body not available yet. Read stream content first.".to_string(),
            )),
        }
    }

    fn materialized_bytes(&self) -> Option<Bytes> {
        match &self.body {
            Body::Materialized(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if matches!(self.body, Body::Unread(_)) {
            tracing::warn!(url = %crate::error::sanitize(&self.url), "response dropped with unread body");
        }
        self.release();
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.body {
            Body::Unread(_) => "unread",
            Body::Materialized(_) => "materialized",
            Body::Released => "released",
        };
        f.debug_struct("Response")
            .field("status_code", &self.status_code)
            .field("url", &self.url)
            .field("body", &state)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Releases the response when an iteration ends or is dropped mid-way.
struct ReleaseGuard<'a>(&'a mut Response);

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Splits a byte stream into `\n`-terminated lines.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline
    scanned: usize,
}

impl LineSplitter {
    /// Feed a chunk; returns the lines it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + pos;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
            self.scanned = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Whatever partial line is left once the stream ends.
    pub(crate) fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches('\r').to_string()
}

fn utf8_lossy_bytes(body: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    match String::from_utf8_lossy(body) {
        std::borrow::Cow::Borrowed(s) => std::borrow::Cow::Borrowed(s.as_bytes()),
        std::borrow::Cow::Owned(s) => std::borrow::Cow::Owned(s.into_bytes()),
    }
}
