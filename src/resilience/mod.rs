//! 弹性模式模块：提供重试策略与退避计算。
//!
//! # Resilience Primitives Module
//!
//! Retry configuration for the execution core. The policy is pure data plus
//! the arithmetic of backoff; the asynchronous retry loop that consumes it
//! lives in the client.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry::RetryPolicy`] | Immutable retry limits, backoff and retryable classes |
//! | [`retry::RetryPolicyBuilder`] | Validating builder for [`retry::RetryPolicy`] |
//! | [`retry::BackoffStrategy`] | Fixed, linear or exponential growth |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_exec::resilience::retry::{BackoffStrategy, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .backoff(BackoffStrategy::Exponential)
//!     .delay(Duration::from_millis(200))
//!     .jitter(Duration::ZERO)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(policy.base_delay(0), Duration::from_millis(200));
//! assert_eq!(policy.base_delay(2), Duration::from_millis(800));
//! ```

pub mod retry;

pub use retry::{BackoffStrategy, RetryPolicy, RetryPolicyBuilder, TRANSIENT_STATUSES};
