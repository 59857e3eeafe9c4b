//! Request-execution client: cache, in-flight dedup, retry and streaming.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod error_classification;
mod execution;
pub mod inflight;
mod policy;
pub mod signals;
pub mod types;

pub use builder::ExecutionClientBuilder;
pub use core::ExecutionClient;
pub use error_classification::translate;
pub use signals::SignalsSnapshot;
pub use types::ApiResponse;
