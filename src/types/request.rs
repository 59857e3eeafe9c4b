//! Outbound request description.

use crate::cache::canonical_json;
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use url::Url;

/// A JSON POST the execution core can send, cache and deduplicate.
///
/// Headers are already resolved (credentials included) and attached
/// verbatim; they do not take part in the cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    url: Url,
    headers: Vec<(String, String)>,
    body: Value,
}

impl OutboundRequest {
    /// `url` must be an absolute `http`/`https` URL.
    pub fn post(url: &str, body: Value) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| {
            Error::validation_with_context(
                format!("invalid request URL '{}': {}", url, e),
                ErrorContext::new()
                    .with_field_path("request.url")
                    .with_source("outbound_request"),
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation_with_context(
                format!("unsupported URL scheme '{}'", parsed.scheme()),
                ErrorContext::new()
                    .with_field_path("request.url")
                    .with_details("expected http or https")
                    .with_source("outbound_request"),
            ));
        }
        Ok(Self {
            url: parsed,
            headers: Vec::new(),
            body,
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `Authorization: Bearer <token>`
    pub fn with_bearer(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.with_header("authorization", value)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Wire payload and cache-key input.
    pub fn canonical_body(&self) -> String {
        canonical_json(&self.body)
    }
}
