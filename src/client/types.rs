use serde::Serialize;
use std::time::Duration;

/// Outcome of a successful non-streaming call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    pub body: String,
    pub status: u16,
    /// Served from the response cache without a network call.
    pub cached: bool,
    /// Time from the call until this value was ready. Zero for cache hits.
    pub elapsed: Duration,
    /// Correlation id of this call (also sent as `x-request-id`).
    pub request_id: String,
}

impl ApiResponse {
    /// Parse the body as JSON.
    pub fn json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }
}
