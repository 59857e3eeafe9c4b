use crate::resilience::RetryPolicy;
use crate::{Error, Result};
use async_recursion::async_recursion;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry { delay: Duration },
    /// The failure class is not retryable.
    Fail,
    /// Retryable, but the attempt or elapsed-time budget is spent.
    Exhausted,
}

/// Per-request retry bookkeeping. Dropped when the request settles.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptState {
    /// 0-based; also the number of failures seen so far.
    pub attempt: u32,
    pub first_attempt: Instant,
}

impl AttemptState {
    pub fn first() -> Self {
        Self {
            attempt: 0,
            first_attempt: Instant::now(),
        }
    }

    fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Decide what to do next after an attempt failed.
///
/// - `state.attempt` is 0-based (first failure => attempt=0).
/// - Keep this deterministic apart from the jitter in the delay.
pub(crate) fn decide(policy: &RetryPolicy, err: &Error, state: AttemptState) -> Decision {
    if !policy.is_retryable(err) {
        return Decision::Fail;
    }
    if !policy.allows_attempt(state.attempt, state.first_attempt.elapsed()) {
        return Decision::Exhausted;
    }
    let retry_after = err.as_api().and_then(|api| api.retry_after);
    Decision::Retry {
        delay: policy.delay_for(state.attempt, retry_after),
    }
}

/// Run `attempt_fn` until it succeeds or the policy gives up.
///
/// Waits between attempts with `tokio::time::sleep`, never blocking a
/// worker thread. The last failure is returned unchanged.
#[async_recursion]
pub(crate) async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    request_id: &str,
    attempt_fn: &F,
    state: AttemptState,
) -> Result<T>
where
    T: Send + 'static,
    F: Fn(AttemptState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    let err = match attempt_fn(state).await {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    match decide(policy, &err, state) {
        Decision::Retry { delay } => {
            info!(
                request_id,
                attempt = state.attempt + 1,
                delay_ms = delay.as_millis() as u64,
                http_status = err.status(),
                error_kind = %err.kind(),
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            run_with_retry(policy, request_id, attempt_fn, state.next()).await
        }
        Decision::Exhausted => {
            warn!(
                request_id,
                attempts = state.attempt + 1,
                duration_ms = state.first_attempt.elapsed().as_millis() as u64,
                error_kind = %err.kind(),
                "retries exhausted"
            );
            Err(err)
        }
        Decision::Fail => {
            info!(
                request_id,
                attempt = state.attempt + 1,
                http_status = err.status(),
                error_kind = %err.kind(),
                "non-retryable failure"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error_classification::translate;
    use crate::error_code::ErrorKind;
    use crate::transport::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .delay(Duration::from_millis(100))
            .jitter(Duration::ZERO)
            .max_elapsed(Duration::ZERO)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_success_is_four_attempts() {
        let calls = AtomicU32::new(0);
        let attempt = |_s: AttemptState| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(Error::Api(translate(503, "")))
                } else {
                    Ok("done")
                }
            }
        };
        let out = run_with_retry(&policy(3), "req", &attempt, AttemptState::first()).await;
        assert_eq!(out.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_failure() {
        let calls = AtomicU32::new(0);
        let attempt = |_s: AttemptState| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let status = if n < 3 { 503 } else { 429 };
                Err::<(), _>(Error::Api(translate(status, "")))
            }
        };
        let err = run_with_retry(&policy(3), "req", &attempt, AttemptState::first())
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_fails_immediately() {
        let calls = AtomicU32::new(0);
        let attempt = |_s: AttemptState| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::Api(translate(401, ""))) }
        };
        let err = run_with_retry(&policy(5), "req", &attempt, AttemptState::first())
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_accumulate() {
        let start = Instant::now();
        let attempt = |_s: AttemptState| async {
            Err::<(), _>(Error::Transport(TransportError::Connect("refused".into())))
        };
        let _ = run_with_retry(&policy(3), "req", &attempt, AttemptState::first()).await;
        // 100 + 200 + 400
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(700) && waited < Duration::from_millis(710));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_budget_stops_retries() {
        let p = RetryPolicy::builder()
            .max_retries(10)
            .backoff(crate::resilience::BackoffStrategy::Fixed)
            .delay(Duration::from_secs(1))
            .jitter(Duration::ZERO)
            .max_elapsed(Duration::from_millis(2500))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);
        let attempt = |_s: AttemptState| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::Api(translate(500, ""))) }
        };
        let _ = run_with_retry(&p, "req", &attempt, AttemptState::first()).await;
        // attempts at t=0,1,2,3; at t=3 the budget is spent
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_retry_after_drives_decision() {
        let p = policy(2);
        let err = Error::Api(translate(429, "").with_retry_after(Some(Duration::from_secs(4))));
        let state = AttemptState::first();
        assert_eq!(
            decide(&p, &err, state),
            Decision::Retry {
                delay: Duration::from_secs(4)
            }
        );
        assert_eq!(decide(&p, &Error::runtime("local"), state), Decision::Fail);
    }
}
