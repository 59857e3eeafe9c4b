//! 响应缓存模块：基于请求哈希的 LRU + TTL 响应缓存。
//!
//! # Response Caching Module
//!
//! Successful responses are stored under the SHA-256 of the canonical request
//! body, so a repeated identical request is answered without touching the
//! network.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Bounded LRU store with per-entry TTL |
//! | [`CacheEntry`] | Immutable cached response (`body`, `status`, `created_at`) |
//! | [`CacheStats`] | Hit/miss/insert/eviction/expiration counters |
//! | [`CacheSweeper`] | Background task that purges expired entries |
//! | [`CacheKey`] | Hex SHA-256 request identity |
//! | [`CacheKeyGenerator`] | Canonical body to key, with optional salt |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_exec::cache::{CacheEntry, CacheKeyGenerator, ResponseCache};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let cache = ResponseCache::new(1000, Duration::from_secs(3600));
//! let key = CacheKeyGenerator::new().generate_from_json(&json!({"model": "m", "n": 1}));
//! cache.put(key.clone(), CacheEntry::new(r#"{"ok":true}"#, 200));
//! assert_eq!(cache.get(&key).unwrap().body, r#"{"ok":true}"#);
//! ```
//!
//! ## Eviction
//!
//! - Capacity: inserting beyond `max_entries` evicts the least recently
//!   *accessed* entry.
//! - Expiry: an entry older than `ttl` is a miss on read and is removed; the
//!   sweeper purges the ones nobody reads.

mod backend;
mod key;
mod manager;

pub use backend::{CacheEntry, ResponseCache};
pub use key::{canonical_json, CacheKey, CacheKeyGenerator};
pub use manager::{CacheStats, CacheSweeper};
