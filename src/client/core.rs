use crate::cache::{CacheEntry, CacheKey, CacheKeyGenerator, CacheSweeper, ResponseCache};
use crate::resilience::RetryPolicy;
use crate::transport::{Transport, WireRequest};
use crate::types::{OutboundRequest, SseEvent};
use crate::{BoxStream, Error, ErrorContext, Result};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::execution::{open_event_stream, send_once, wire_request};
use super::inflight::{Admission, InFlightRegistry};
use super::policy::{run_with_retry, AttemptState};
use super::signals::{CacheSnapshot, InflightSnapshot, SignalsSnapshot};
use super::types::ApiResponse;

/// Events buffered between the network task and a slow stream consumer.
const STREAM_BUFFER: usize = 64;

/// What a deduplicated operation hands to every waiting caller.
#[derive(Debug, Clone)]
pub(crate) struct Delivered {
    pub body: String,
    pub status: u16,
    pub cached: bool,
}

/// Worker pool the client runs network work on.
pub(crate) struct WorkerPool {
    handle: Handle,
    // Present only when the client built the runtime itself.
    owned: Mutex<Option<Runtime>>,
}

impl WorkerPool {
    pub fn owned(runtime: Runtime) -> Self {
        Self {
            handle: runtime.handle().clone(),
            owned: Mutex::new(Some(runtime)),
        }
    }

    pub fn shared(handle: Handle) -> Self {
        Self {
            handle,
            owned: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Shut an owned runtime down without waiting for its tasks. No-op for
    /// an injected handle.
    fn shutdown(&self) {
        let runtime = self
            .owned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(rt) = runtime {
            rt.shutdown_background();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) struct ClientInner {
    pub transport: Arc<dyn Transport>,
    pub cache: Arc<ResponseCache>,
    pub inflight: InFlightRegistry<Delivered>,
    pub policy: Arc<RetryPolicy>,
    pub timeout: Duration,
    pub keys: CacheKeyGenerator,
    pub sweeper: Option<CacheSweeper>,
    // Declared last: dropped after the sweeper is cancelled.
    pub pool: WorkerPool,
}

/// Resilient request-execution client.
///
/// Every non-streaming call goes through the same pipeline:
///
/// ```text
/// cache lookup ─hit──────────────────────────────────────────▶ response (cached)
///      │miss
///      ▼
/// in-flight registry ─join──▶ await the running operation ──▶ response
///      │start
///      ▼
/// retry loop ⟲ transport ──200──▶ cache store ──▶ release key ──▶ response
/// ```
///
/// Streaming calls bypass both the cache and the registry.
///
/// Cloning is cheap; clones share the cache, the registry and the pool.
#[derive(Clone)]
pub struct ExecutionClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ExecutionClient {
    /// Client with default settings over the `reqwest` transport.
    pub fn new() -> Result<Self> {
        crate::client::builder::ExecutionClientBuilder::new().build()
    }

    pub fn builder() -> crate::client::builder::ExecutionClientBuilder {
        crate::client::builder::ExecutionClientBuilder::new()
    }

    /// Key under which `request`'s response is cached and deduplicated.
    pub fn cache_key(&self, request: &OutboundRequest) -> CacheKey {
        self.inner.keys.generate(&request.canonical_body())
    }

    /// Execute a request, consulting the cache and joining identical
    /// in-flight requests.
    ///
    /// A cache hit resolves immediately with `cached = true` and zero
    /// elapsed time. On a miss, the network work runs on the worker pool; a
    /// successful response is cached before other callers can miss on it.
    pub async fn execute_async(&self, request: &OutboundRequest) -> Result<ApiResponse> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let body = request.canonical_body();
        let key = self.inner.keys.generate(&body);

        if let Some(hit) = self.inner.cache.get(&key) {
            debug!(request_id = %request_id, cache_key = key.short(), "cache hit");
            return Ok(Self::from_cache(hit, request_id));
        }

        let wire = wire_request(request, body, request_id.clone());
        let cache = self.inner.cache.clone();
        let admission = self.inner.inflight.join_or_start_with(
            key.clone(),
            self.inner.pool.handle(),
            || {
                cache.get(&key).map(|hit| Delivered {
                    body: hit.body,
                    status: hit.status,
                    cached: true,
                })
            },
            || self.operation(key.clone(), wire),
        );

        let delivered = match admission {
            Admission::Ready(delivered) => delivered,
            Admission::Joined(outcome) => {
                debug!(request_id = %request_id, cache_key = key.short(), "joined in-flight request");
                outcome.await?
            }
            Admission::Started(outcome) => outcome.await?,
        };

        let elapsed = if delivered.cached {
            Duration::ZERO
        } else {
            started.elapsed()
        };
        Ok(ApiResponse {
            body: delivered.body,
            status: delivered.status,
            cached: delivered.cached,
            elapsed,
            request_id,
        })
    }

    /// Blocking form of [`execute_async`](Self::execute_async).
    ///
    /// Parks the calling thread until the outcome is ready. Do not call it
    /// from inside an async task.
    pub fn execute(&self, request: &OutboundRequest) -> Result<ApiResponse> {
        futures::executor::block_on(self.execute_async(request))
    }

    /// The network half of a cache miss: retry loop, then cache store.
    fn operation(
        &self,
        key: CacheKey,
        wire: WireRequest,
    ) -> impl std::future::Future<Output = Result<Delivered>> + Send + 'static {
        let transport = self.inner.transport.clone();
        let cache = self.inner.cache.clone();
        let policy = self.inner.policy.clone();
        let timeout = self.inner.timeout;

        async move {
            let started = Instant::now();
            let attempt = |state: AttemptState| send_once(transport.as_ref(), &wire, timeout, state);
            let resp = run_with_retry(
                policy.as_ref(),
                &wire.request_id,
                &attempt,
                AttemptState::first(),
            )
            .await?;

            cache.put(key.clone(), CacheEntry::new(resp.body.clone(), resp.status));
            info!(
                request_id = %wire.request_id,
                cache_key = key.short(),
                http_status = resp.status,
                duration_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );
            Ok(Delivered {
                body: resp.body,
                status: resp.status,
                cached: false,
            })
        }
    }

    fn from_cache(hit: CacheEntry, request_id: String) -> ApiResponse {
        ApiResponse {
            body: hit.body,
            status: hit.status,
            cached: true,
            elapsed: Duration::ZERO,
            request_id,
        }
    }

    /// Open a streaming request and return its events as a stream.
    ///
    /// Bypasses the cache and the in-flight registry. Network reads happen
    /// on the worker pool; dropping the returned stream cancels them. A
    /// non-200 response fails here with the translated error; a failure
    /// mid-stream arrives as the stream's last item.
    pub async fn open_stream(&self, request: &OutboundRequest) -> Result<BoxStream<'static, SseEvent>> {
        let request_id = Uuid::new_v4().to_string();
        let wire = wire_request(request, request.canonical_body(), request_id);
        let transport = self.inner.transport.clone();
        let timeout = self.inner.timeout;

        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (tx, rx) = mpsc::channel::<Result<SseEvent>>(STREAM_BUFFER);

        self.inner.pool.handle().spawn(async move {
            let mut events = match open_event_stream(transport.as_ref(), &wire, timeout).await {
                Ok(events) => {
                    let _ = ready_tx.send(Ok(()));
                    events
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let mut forwarded = 0usize;
            while let Some(item) = events.next().await {
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!(request_id = %wire.request_id, "stream consumer went away");
                    return;
                }
                if failed {
                    return;
                }
                forwarded += 1;
            }
            debug!(request_id = %wire.request_id, events = forwarded, "stream finished");
        });

        ready_rx.await.map_err(|_| {
            Error::runtime_with_context(
                "stream task ended before the response arrived",
                ErrorContext::new().with_source("execution_client"),
            )
        })??;

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(events))
    }

    /// Stream a request through callbacks.
    ///
    /// `on_token` receives each event's data in order. Exactly one of
    /// `on_complete` or `on_error` is called, once: a non-200 status or a
    /// transport failure (before or during the stream) goes to `on_error`.
    pub async fn execute_stream<T, C, E>(
        &self,
        request: &OutboundRequest,
        mut on_token: T,
        on_complete: C,
        on_error: E,
    ) where
        T: FnMut(String),
        C: FnOnce(),
        E: FnOnce(Error),
    {
        let mut events = match self.open_stream(request).await {
            Ok(events) => events,
            Err(e) => return on_error(e),
        };
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => on_token(event.data),
                Err(e) => return on_error(e),
            }
        }
        on_complete();
    }

    /// Drop the cached response for `request`, if any.
    pub fn invalidate(&self, request: &OutboundRequest) -> bool {
        self.inner.cache.remove(&self.cache_key(request))
    }

    /// Snapshot current runtime signals (facts only).
    pub fn signals(&self) -> SignalsSnapshot {
        let cache = &self.inner.cache;
        SignalsSnapshot {
            cache: CacheSnapshot {
                enabled: cache.is_enabled(),
                entries: cache.len(),
                capacity: cache.capacity(),
                stats: cache.stats(),
            },
            inflight: InflightSnapshot {
                keys: self.inner.inflight.len(),
            },
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Stop the TTL sweeper and, if the client owns its worker pool, shut
    /// the pool down without waiting. Affects every clone. Calls made after
    /// shutdown on an owned pool fail with a runtime error.
    pub fn shutdown(&self) {
        if let Some(sweeper) = &self.inner.sweeper {
            sweeper.stop();
        }
        self.inner.pool.shutdown();
        info!("execution client shut down");
    }
}

impl std::fmt::Debug for ExecutionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionClient")
            .field("timeout", &self.inner.timeout)
            .field("policy", &self.inner.policy)
            .field("cache_capacity", &self.inner.cache.capacity())
            .finish_non_exhaustive()
    }
}
