//! Error classification logic
//!
//! Turns a non-200 status plus raw body into a typed [`ApiError`]. Never
//! fails: bodies that are not JSON, or JSON of an unknown shape, simply
//! yield no extracted message.

use crate::error::ApiError;
use crate::error_code::ErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Phrases providers use when rejecting content on safety grounds.
static CONTENT_FILTER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)content filter|safety|safety_check|content policy|violates|usage guidelines|moderation|responsible ai",
    )
    .ok()
});

/// Message and type pulled out of a provider error body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParsedBody {
    pub message: Option<String>,
    pub error_type: Option<String>,
}

/// Extract `(message, type)` from the error body shapes providers use:
///
/// - `{"error": {"message": .., "type": ..}}` (`status` accepted in place of `type`)
/// - `{"error": "..", "code": ".."}`
/// - `{"message": ".."}`
pub(crate) fn parse_body(body: &str) -> ParsedBody {
    if body.trim().is_empty() {
        return ParsedBody::default();
    }
    let Ok(Value::Object(root)) = serde_json::from_str::<Value>(body) else {
        return ParsedBody::default();
    };
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    match root.get("error") {
        Some(Value::Object(err)) => ParsedBody {
            message: text(err.get("message")),
            error_type: text(err.get("type")).or_else(|| text(err.get("status"))),
        },
        Some(Value::String(msg)) => ParsedBody {
            message: Some(msg.clone()),
            error_type: text(root.get("code")),
        },
        _ => ParsedBody {
            message: text(root.get("message")),
            error_type: None,
        },
    }
}

pub(crate) fn is_content_filtered(parsed: &ParsedBody) -> bool {
    let combined = format!(
        "{} {}",
        parsed.message.as_deref().unwrap_or(""),
        parsed.error_type.as_deref().unwrap_or("")
    );
    match CONTENT_FILTER.as_ref() {
        Some(re) => re.is_match(&combined),
        None => false,
    }
}

fn display_message(kind: ErrorKind, status: u16, parsed: &ParsedBody, raw_body: &str) -> String {
    let label = kind.label();
    match &parsed.message {
        Some(msg) => match &parsed.error_type {
            Some(t) => format!("{} (HTTP {}): {} [{}]", label, status, msg, t),
            None => format!("{} (HTTP {}): {}", label, status, msg),
        },
        None if raw_body.is_empty() => format!("{}: {}", label, status),
        None => format!("{}: {} - {}", label, status, raw_body),
    }
}

/// Translate a failed response into a typed error.
///
/// A content-safety match wins over the status mapping.
pub fn translate(status: u16, raw_body: &str) -> ApiError {
    let parsed = parse_body(raw_body);
    let kind = if is_content_filtered(&parsed) {
        ErrorKind::ContentFiltered
    } else {
        ErrorKind::from_http_status(status)
    };
    ApiError {
        kind,
        status,
        message: display_message(kind, status, &parsed, raw_body),
        provider_message: parsed.message,
        error_type: parsed.error_type,
        raw_body: raw_body.to_string(),
        retry_after: None,
    }
}
