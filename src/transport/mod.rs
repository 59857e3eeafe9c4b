//! 传输层：定义执行核心所依赖的 HTTP 传输契约。
//!
//! Transport contract consumed by the execution core.
//!
//! The core never talks to the network directly. It hands a fully prepared
//! [`WireRequest`] (canonical body, resolved headers) to a [`Transport`] and
//! gets back either a complete [`HttpResponse`] or, for streaming calls, a
//! status plus a stream of text lines. [`HttpTransport`] is the production
//! implementation; tests substitute scripted transports.

pub mod http;

pub use http::HttpTransport;

use crate::{BoxStream, Result};
use async_trait::async_trait;
use std::time::Duration;

/// A request ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub url: String,
    /// Already-resolved headers (credentials included); attached verbatim.
    pub headers: Vec<(String, String)>,
    /// Canonical JSON body. Also the input of the cache key.
    pub body: String,
    /// Correlation id sent as `x-request-id`.
    pub request_id: String,
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After: <seconds>` header, if present
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Line-oriented streaming response. Lines carry no terminator.
pub struct StreamResponse {
    pub status: u16,
    pub lines: BoxStream<'static, String>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one complete request/response exchange bounded by `timeout`.
    async fn send(&self, request: &WireRequest, timeout: Duration) -> Result<HttpResponse>;

    /// Open a streaming exchange. `timeout` bounds the time until the
    /// response head arrives, not the lifetime of the stream.
    async fn send_stream(&self, request: &WireRequest, timeout: Duration)
        -> Result<StreamResponse>;
}

/// Connection-level failure: no usable HTTP status was received.
///
/// Stores messages rather than the underlying client error so that
/// [`crate::Error`] stays `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed reading response body: {0}")]
    Body(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}
