//! Server-Sent Event value type.

use serde::{Deserialize, Serialize};

/// One dispatched server-push event.
///
/// `event` is the last `event:` label seen before dispatch, or empty.
/// `data` is every `data:` value of the event joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// The label, if the server sent one.
    pub fn label(&self) -> Option<&str> {
        if self.event.is_empty() {
            None
        } else {
            Some(&self.event)
        }
    }

    /// Parse `data` as JSON.
    pub fn json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.data)?)
    }
}
