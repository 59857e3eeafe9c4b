//! Thundering-herd protection: at most one live operation per key.

use crate::cache::CacheKey;
use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Handle to an operation's outcome. Cloneable; every clone resolves to the
/// same value.
pub type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T>>>;

/// How a caller was admitted by [`InFlightRegistry::join_or_start_with`].
pub enum Admission<T: Clone> {
    /// The lookup produced a value under the registry lock; nothing started.
    Ready(T),
    /// Another caller's operation was already running for this key.
    Joined(SharedOutcome<T>),
    /// This caller started the operation.
    Started(SharedOutcome<T>),
}

struct Slot<T: Clone> {
    generation: u64,
    outcome: SharedOutcome<T>,
}

type Slots<T> = Arc<Mutex<HashMap<CacheKey, Slot<T>>>>;

fn lock<T: Clone>(slots: &Mutex<HashMap<CacheKey, Slot<T>>>) -> MutexGuard<'_, HashMap<CacheKey, Slot<T>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frees a slot when the operation task finishes, panics or is cancelled.
struct SlotGuard<T: Clone> {
    slots: Slots<T>,
    key: CacheKey,
    generation: u64,
}

impl<T: Clone> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        // A later operation may already own the key; leave its slot alone.
        if slots.get(&self.key).map(|s| s.generation) == Some(self.generation) {
            slots.remove(&self.key);
        }
    }
}

/// Registry of in-progress operations keyed by request hash.
///
/// Started operations run as detached tasks on the given runtime handle, so
/// no single caller dropping its future can cancel work others are waiting on.
pub struct InFlightRegistry<T: Clone> {
    slots: Slots<T>,
    next_generation: AtomicU64,
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Join the running operation for `key`, or start one with `start`.
    ///
    /// Returns the shared outcome and whether this call started it.
    pub fn join_or_start<F, Fut>(&self, key: CacheKey, handle: &Handle, start: F) -> (SharedOutcome<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        match self.join_or_start_with(key, handle, || None, start) {
            Admission::Started(outcome) => (outcome, true),
            Admission::Joined(outcome) => (outcome, false),
            // the lookup above never yields a value
            Admission::Ready(value) => (futures::future::ready(Ok(value)).boxed().shared(), false),
        }
    }

    /// Like [`join_or_start`](Self::join_or_start), but first consults
    /// `lookup` while holding the registry lock.
    ///
    /// Passing a cache lookup here closes the window in which a caller
    /// misses the cache just before the previous owner stores its result
    /// and releases the key.
    pub fn join_or_start_with<L, F, Fut>(
        &self,
        key: CacheKey,
        handle: &Handle,
        lookup: L,
        start: F,
    ) -> Admission<T>
    where
        L: FnOnce() -> Option<T>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut slots = lock(&self.slots);
        if let Some(slot) = slots.get(&key) {
            return Admission::Joined(slot.outcome.clone());
        }
        if let Some(value) = lookup() {
            return Admission::Ready(value);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<Result<T>>();
        let outcome: SharedOutcome<T> = async move {
            rx.await.unwrap_or_else(|_| {
                Err(Error::runtime_with_context(
                    "in-flight operation ended without a result",
                    ErrorContext::new()
                        .with_details("the task panicked or its runtime shut down")
                        .with_source("inflight_registry"),
                ))
            })
        }
        .boxed()
        .shared();
        slots.insert(
            key.clone(),
            Slot {
                generation,
                outcome: outcome.clone(),
            },
        );
        drop(slots);

        // Spawn outside the lock: a closed runtime drops the task (and its
        // guard) synchronously.
        let guard = SlotGuard {
            slots: self.slots.clone(),
            key,
            generation,
        };
        let operation = start();
        handle.spawn(async move {
            let result = operation.await;
            // Outcome first, then the slot; joiners never see a freed key
            // before the result is published.
            let _ = tx.send(result);
            drop(guard);
        });
        Admission::Started(outcome)
    }

    /// Number of keys with a live operation.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.slots).contains_key(key)
    }
}
