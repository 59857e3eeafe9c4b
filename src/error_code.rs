//! 错误分类码：定义终端错误类型及其 HTTP 状态映射。
//!
//! Terminal error kinds and their HTTP status mapping.
//!
//! Every failure that reaches a caller is classified into exactly one
//! [`ErrorKind`]. Upstream (non-200) failures are classified by status code,
//! except that a content-safety rejection always wins (see
//! [`crate::client::error_classification`]).
//!
//! | Status | Kind |
//! |--------|------|
//! | 401, 403 | [`ErrorKind::AccessDenied`] |
//! | 400 | [`ErrorKind::BadRequest`] |
//! | 404 | [`ErrorKind::NotFound`] |
//! | 408, 502, 504 | [`ErrorKind::Timeout`] |
//! | 429 | [`ErrorKind::RateLimitExceeded`] |
//! | 503 | [`ErrorKind::ServiceUnavailable`] |
//! | 529 | [`ErrorKind::ServiceOverloaded`] |
//! | other | [`ErrorKind::Service`] |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_exec::error_code::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(429);
//! assert_eq!(kind, ErrorKind::RateLimitExceeded);
//! assert_eq!(kind.name(), "rate_limit_exceeded");
//! assert!(kind.transient());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401/403: missing, invalid or insufficient credentials
    AccessDenied,
    /// 400: malformed request
    BadRequest,
    /// 404: unknown endpoint or model
    NotFound,
    /// 408/502/504, or a transport-level timeout
    Timeout,
    /// 429
    RateLimitExceeded,
    /// 503
    ServiceUnavailable,
    /// 529
    ServiceOverloaded,
    /// Provider rejected the content on safety grounds (any status)
    ContentFiltered,
    /// Any other upstream failure
    Service,
    /// Connection-level failure before a status was received
    Transport,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 10] = [
        Self::AccessDenied,
        Self::BadRequest,
        Self::NotFound,
        Self::Timeout,
        Self::RateLimitExceeded,
        Self::ServiceUnavailable,
        Self::ServiceOverloaded,
        Self::ContentFiltered,
        Self::Service,
        Self::Transport,
    ];

    /// Maps an HTTP status code to its kind, ignoring any body content.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AccessDenied,
            400 => Self::BadRequest,
            404 => Self::NotFound,
            408 | 502 | 504 => Self::Timeout,
            429 => Self::RateLimitExceeded,
            503 => Self::ServiceUnavailable,
            529 => Self::ServiceOverloaded,
            _ => Self::Service,
        }
    }

    /// Stable snake-case name (e.g. `"rate_limit_exceeded"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ServiceOverloaded => "service_overloaded",
            Self::ContentFiltered => "content_filtered",
            Self::Service => "service",
            Self::Transport => "transport",
        }
    }

    /// Human-readable label used as the prefix of display messages.
    #[inline]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Access denied",
            Self::BadRequest => "Bad request",
            Self::NotFound => "Not found",
            Self::Timeout => "Timeout",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::ServiceUnavailable => "Service unavailable",
            Self::ServiceOverloaded => "Service overloaded",
            Self::ContentFiltered => "Content safety violation",
            Self::Service => "HTTP failure",
            Self::Transport => "Transport failure",
        }
    }

    /// Whether this kind usually clears up on its own.
    ///
    /// Informational only: the retry decision is made by
    /// [`crate::resilience::retry::RetryPolicy`], not by this flag.
    #[inline]
    pub fn transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::RateLimitExceeded
                | Self::ServiceUnavailable
                | Self::ServiceOverloaded
                | Self::Transport
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown error kind: {}", s.trim()))
    }
}
