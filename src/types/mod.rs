//! 类型系统模块：定义执行核心的请求与事件类型。
//!
//! # Types Module
//!
//! | Type | Description |
//! |------|-------------|
//! | [`OutboundRequest`] | JSON POST with resolved headers |
//! | [`SseEvent`] | One dispatched server-push event |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_exec::types::OutboundRequest;
//! use serde_json::json;
//!
//! let req = OutboundRequest::post(
//!     "https://api.example.com/v1/chat/completions",
//!     json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
//! )
//! .unwrap()
//! .with_bearer("sk-test");
//!
//! assert!(req.canonical_body().starts_with(r#"{"messages":"#));
//! ```

pub mod events;
pub mod request;

pub use events::SseEvent;
pub use request::OutboundRequest;
