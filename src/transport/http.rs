use super::{HttpResponse, StreamResponse, Transport, TransportError, WireRequest};
use crate::pipeline::{decode_lines_with_limit, DEFAULT_MAX_LINE_BYTES};
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use std::env;
use std::time::Duration;

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    max_line_bytes: usize,
    /// Longest gap between two body chunks of a stream. `None` reuses the
    /// request timeout.
    stream_idle_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(
                env::var("AI_EXEC_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(10),
            ))
            .pool_max_idle_per_host(
                env::var("AI_EXEC_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("AI_EXEC_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        let mut transport = Self::with_client(client);
        if let Some(n) = env::var("AI_EXEC_MAX_LINE_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            transport = transport.with_max_line_bytes(n);
        }
        if let Some(secs) = env::var("AI_EXEC_STREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            transport = transport.with_stream_idle_timeout(Duration::from_secs(secs));
        }
        Ok(transport)
    }

    /// Wrap an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            stream_idle_timeout: None,
        }
    }

    /// Cap on one streamed line. Zero is treated as one byte.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    pub fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.stream_idle_timeout = Some(idle);
        self
    }

    fn build(&self, request: &WireRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&request.url)
            .header("content-type", "application/json")
            .header("x-request-id", &request.request_id)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req
    }

    /// Best-effort parsing of `Retry-After` header.
    ///
    /// Only the `Retry-After: <seconds>` form is understood; HTTP-date values are ignored.
    fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        let raw = headers.get("retry-after")?.to_str().ok()?.trim();
        let secs: u64 = raw.parse().ok()?;
        Some(Duration::from_secs(secs))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &WireRequest, timeout: Duration) -> Result<HttpResponse> {
        let resp = self
            .build(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = resp.status().as_u16();
        let retry_after = Self::retry_after(resp.headers());
        let body = resp.text().await.map_err(TransportError::from)?;

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }

    async fn send_stream(
        &self,
        request: &WireRequest,
        timeout: Duration,
    ) -> Result<StreamResponse> {
        let pending = self
            .build(request)
            .header("accept", "text/event-stream")
            .send();

        let resp = tokio::time::timeout(timeout, pending)
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "no response head within {}ms",
                    timeout.as_millis()
                ))
            })?
            .map_err(TransportError::from)?;

        let status = resp.status().as_u16();
        let bytes = resp
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::from(e)));
        let idle = self.stream_idle_timeout.unwrap_or(timeout);

        Ok(StreamResponse {
            status,
            lines: decode_lines_with_limit(idle_timeout(Box::pin(bytes), idle), self.max_line_bytes),
        })
    }
}

/// Fail with `TransportError::Timeout` when no chunk arrives within `idle`.
/// The first error ends the stream.
pub(crate) fn idle_timeout(
    input: BoxStream<'static, Bytes>,
    idle: Duration,
) -> BoxStream<'static, Bytes> {
    let chunks = stream::unfold(Some(input), move |state| async move {
        let mut input = state?;
        match tokio::time::timeout(idle, input.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(input))),
            Ok(Some(Err(e))) => Some((Err(e), None)),
            Ok(None) => None,
            Err(_) => Some((
                Err(Error::Transport(TransportError::Timeout(format!(
                    "no body data within {}ms",
                    idle.as_millis()
                )))),
                None,
            )),
        }
    });
    Box::pin(chunks)
}
