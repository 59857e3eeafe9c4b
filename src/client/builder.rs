use crate::cache::{CacheKeyGenerator, CacheSweeper, ResponseCache};
use crate::client::core::{ClientInner, ExecutionClient, WorkerPool};
use crate::client::inflight::InFlightRegistry;
use crate::config::ExecutionConfig;
use crate::resilience::RetryPolicy;
use crate::transport::{HttpTransport, Transport};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable (developer-friendly).
pub struct ExecutionClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    policy: RetryPolicy,
    cache_ttl: Duration,
    cache_max_entries: usize,
    timeout: Duration,
    sweep_interval: Duration,
    worker_threads: Option<usize>,
    handle: Option<Handle>,
    key_salt: Option<String>,
}

impl ExecutionClientBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            policy: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(3600),
            cache_max_entries: 1000,
            timeout: Duration::from_millis(60_000),
            sweep_interval: Duration::from_secs(60),
            worker_threads: None,
            handle: None,
            key_salt: None,
        }
    }

    /// Start from a loaded configuration. Fails if the retry section does
    /// not validate.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self> {
        let policy = config.retry_policy()?;
        Ok(Self::new()
            .with_retry_policy(policy)
            .with_cache_ttl(Duration::from_secs(config.cache_ttl_secs))
            .with_cache_max_entries(config.cache_max_entries)
            .with_timeout(Duration::from_millis(config.timeout_ms))
            .with_sweep_interval(Duration::from_secs(config.sweep_interval_secs))
            .with_worker_threads_opt(config.worker_threads))
    }

    /// Replace the default `reqwest` transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Zero disables response caching.
    pub fn with_cache_max_entries(mut self, n: usize) -> Self {
        self.cache_max_entries = n;
        self
    }

    /// Per-attempt network timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Period of the background TTL sweep. Zero disables the sweeper;
    /// expired entries are then only dropped when read.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Worker count for a client-owned pool. Ignored with [`with_handle`](Self::with_handle).
    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = Some(n.max(1));
        self
    }

    fn with_worker_threads_opt(mut self, n: Option<usize>) -> Self {
        self.worker_threads = n.map(|n| n.max(1));
        self
    }

    /// Run network work on an existing runtime instead of a private pool.
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Partition cache/dedup keys, e.g. per tenant.
    pub fn with_key_salt(mut self, salt: impl Into<String>) -> Self {
        self.key_salt = Some(salt.into());
        self
    }

    /// `min(4, max(2, cpus - 2))`
    pub fn default_worker_threads() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        cpus.saturating_sub(2).max(2).min(4)
    }

    /// Build the client.
    pub fn build(self) -> Result<ExecutionClient> {
        if self.timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "timeout must be greater than zero",
                ErrorContext::new()
                    .with_field_path("timeout_ms")
                    .with_source("execution_client_builder"),
            ));
        }

        let pool = match self.handle {
            Some(handle) => WorkerPool::shared(handle),
            None => {
                let workers = self
                    .worker_threads
                    .unwrap_or_else(Self::default_worker_threads);
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(workers)
                    .thread_name("ai-exec-worker")
                    .enable_all()
                    .build()
                    .map_err(|e| {
                        Error::runtime_with_context(
                            format!("failed to start worker pool: {}", e),
                            ErrorContext::new()
                                .with_details(format!("worker_threads={}", workers))
                                .with_source("execution_client_builder"),
                        )
                    })?;
                WorkerPool::owned(runtime)
            }
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };

        let cache = Arc::new(ResponseCache::new(self.cache_max_entries, self.cache_ttl));
        let sweeper = (cache.is_enabled() && !self.sweep_interval.is_zero())
            .then(|| CacheSweeper::spawn(cache.clone(), self.sweep_interval, pool.handle()));

        let keys = match self.key_salt {
            Some(salt) => CacheKeyGenerator::new().with_salt(salt),
            None => CacheKeyGenerator::new(),
        };

        info!(
            cache_max_entries = self.cache_max_entries,
            cache_ttl_secs = self.cache_ttl.as_secs(),
            timeout_ms = self.timeout.as_millis() as u64,
            max_retries = self.policy.max_retries(),
            "execution client ready"
        );

        Ok(ExecutionClient {
            inner: Arc::new(ClientInner {
                transport,
                cache,
                inflight: InFlightRegistry::new(),
                policy: Arc::new(self.policy),
                timeout: self.timeout,
                keys,
                sweeper,
                pool,
            }),
        })
    }
}

impl Default for ExecutionClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
