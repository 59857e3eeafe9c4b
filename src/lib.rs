//! # ai-lib-exec
//!
//! 面向 AI 服务 HTTP 调用的弹性请求执行核心：响应缓存、请求去重、重试退避、错误翻译与 SSE 流解析。
//!
//! Resilient request-execution core for calling AI service endpoints over
//! HTTP.
//!
//! ## Overview
//!
//! A single [`ExecutionClient`] sits between application code and the
//! network. Non-streaming calls are served from a TTL-bounded LRU cache when
//! possible; identical concurrent calls share one network operation; failed
//! attempts are retried with configurable backoff; non-200 responses are
//! translated into typed [`ApiError`]s. Streaming calls bypass the cache and
//! are decoded from Server-Sent Events.
//!
//! ## Key Features
//!
//! - **Response cache**: LRU + TTL keyed by SHA-256 of the canonical body, see [`cache`]
//! - **Deduplication**: one network operation per key at a time, see [`client::inflight`]
//! - **Retry**: fixed, linear or exponential backoff with jitter, see [`resilience`]
//! - **Error translation**: status + body to [`ErrorKind`], see [`client::translate`]
//! - **Streaming**: SSE decoding with `[DONE]` handling, see [`pipeline`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_exec::{ExecutionClient, OutboundRequest};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_exec::Result<()> {
//!     let client = ExecutionClient::builder()
//!         .with_cache_max_entries(500)
//!         .build()?;
//!
//!     let request = OutboundRequest::post(
//!         "https://api.example.com/v1/chat/completions",
//!         json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
//!     )?
//!     .with_bearer("sk-...");
//!
//!     let response = client.execute_async(&request).await?;
//!     println!("{} (cached: {})", response.body, response.cached);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Execution façade, in-flight registry, error translation |
//! | [`cache`] | Response cache, key derivation, TTL sweeper |
//! | [`resilience`] | Retry policy and backoff |
//! | [`pipeline`] | SSE stream decoding |
//! | [`transport`] | Transport trait and the `reqwest` implementation |
//! | [`types`] | Outbound requests and stream events |
//! | [`config`] | YAML and environment configuration |

pub mod cache;
pub mod client;
pub mod config;
pub mod error_code;
pub mod pipeline;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ApiResponse, ExecutionClient, ExecutionClientBuilder, SignalsSnapshot};
pub use config::{ExecutionConfig, RetryConfig};
pub use error_code::ErrorKind;
pub use resilience::{BackoffStrategy, RetryPolicy};
pub use types::{OutboundRequest, SseEvent};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{ApiError, Error, ErrorContext};
