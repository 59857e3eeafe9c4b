use crate::cache::CacheStats;
use serde::Serialize;

/// A lightweight snapshot of runtime "signals" for observability.
///
/// This is intentionally *facts only* (no policy).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalsSnapshot {
    pub cache: CacheSnapshot,
    pub inflight: InflightSnapshot,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSnapshot {
    pub enabled: bool,
    pub entries: usize,
    pub capacity: usize,
    pub stats: CacheStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InflightSnapshot {
    /// Distinct request keys with a network operation in progress.
    pub keys: usize,
}
