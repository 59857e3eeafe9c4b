//! Retry policy: which failures are retried, how often, and how long to wait.

use crate::error_code::ErrorKind;
use crate::{Error, ErrorContext, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MAX_RETRIES: u32 = 10;
const MAX_BASE_DELAY: Duration = Duration::from_secs(60);
const MAX_JITTER: Duration = Duration::from_secs(60);
const MAX_MAX_DELAY: Duration = Duration::from_secs(5 * 60);
const MAX_MAX_ELAPSED: Duration = Duration::from_secs(15 * 60);

/// Statuses that usually clear up on their own. Opt in with
/// [`RetryPolicyBuilder::retry_on_transient_statuses`].
pub const TRANSIENT_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Growth of the wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `delay` every time
    Fixed,
    /// `delay * (n + 1)`
    Linear,
    /// `delay * 2^n`
    Exponential,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
        }
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackoffStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(Error::configuration_with_context(
                format!("unknown backoff strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("retry.backoff")
                    .with_details("expected one of: fixed, linear, exponential")
                    .with_source("retry_policy"),
            )),
        }
    }
}

/// Immutable retry configuration, shared read-only by every request.
///
/// `attempt` arguments below are 0-based counts of failures so far: the
/// wait after the first failure is `delay_for(0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffStrategy,
    delay: Duration,
    jitter: Duration,
    max_delay: Duration,
    max_elapsed: Duration,
    retry_on_status: Option<BTreeSet<u16>>,
    retry_on_kinds: Option<BTreeSet<ErrorKind>>,
    respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffStrategy::Exponential,
            delay: Duration::from_millis(500),
            jitter: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(20),
            retry_on_status: None,
            retry_on_kinds: None,
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> BackoffStrategy {
        self.backoff
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Upper bound on any single wait. Zero means uncapped.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Budget measured from the first attempt. Zero means unbounded.
    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    pub fn retry_on_status(&self) -> Option<&BTreeSet<u16>> {
        self.retry_on_status.as_ref()
    }

    pub fn retry_on_kinds(&self) -> Option<&BTreeSet<ErrorKind>> {
        self.retry_on_kinds.as_ref()
    }

    pub fn respect_retry_after(&self) -> bool {
        self.respect_retry_after
    }

    /// Whether `err` belongs to a retryable class.
    ///
    /// Upstream failures are matched by status against `retry_on_status`;
    /// transport failures by kind against `retry_on_kinds`. An absent list
    /// admits everything. Local errors are never retried.
    pub fn is_retryable(&self, err: &Error) -> bool {
        match err {
            Error::Api(api) => self
                .retry_on_status
                .as_ref()
                .map_or(true, |set| set.contains(&api.status)),
            Error::Transport(_) => self
                .retry_on_kinds
                .as_ref()
                .map_or(true, |set| set.contains(&err.kind())),
            _ => false,
        }
    }

    /// Whether another attempt is allowed after `attempt + 1` failures that
    /// took `elapsed` since the first attempt started.
    pub fn allows_attempt(&self, attempt: u32, elapsed: Duration) -> bool {
        attempt < self.max_retries && (self.max_elapsed.is_zero() || elapsed < self.max_elapsed)
    }

    /// Backoff for the given attempt before jitter, capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base = self.delay.as_millis().min(u64::MAX as u128) as u64;
        let ms = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(attempt)),
        };
        self.cap(Duration::from_millis(ms))
    }

    /// Full wait before the next attempt.
    ///
    /// A server-advertised `Retry-After` replaces the computed backoff when
    /// `respect_retry_after` is set. Otherwise up to `jitter` of random
    /// delay is added to the base delay. Either way the result is capped.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if self.respect_retry_after {
            if let Some(advertised) = retry_after {
                return self.cap(advertised);
            }
        }
        let base = self.base_delay(attempt);
        let jitter_ms = self.jitter.as_millis().min(u64::MAX as u128) as u64;
        if jitter_ms == 0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.cap(base + Duration::from_millis(extra))
    }

    fn cap(&self, d: Duration) -> Duration {
        if self.max_delay.is_zero() {
            d
        } else {
            d.min(self.max_delay)
        }
    }
}

/// Builder for [`RetryPolicy`]; unset fields take the defaults.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    max_retries: Option<u32>,
    backoff: Option<BackoffStrategy>,
    delay: Option<Duration>,
    jitter: Option<Duration>,
    max_delay: Option<Duration>,
    max_elapsed: Option<Duration>,
    retry_on_status: Option<BTreeSet<u16>>,
    retry_on_kinds: Option<BTreeSet<ErrorKind>>,
    any_status: bool,
    respect_retry_after: Option<bool>,
}

impl RetryPolicyBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = Some(strategy);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Retry only these statuses. Duplicates collapse.
    pub fn retry_on_status(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on_status = Some(statuses.into_iter().collect());
        self.any_status = false;
        self
    }

    /// Retry only [`TRANSIENT_STATUSES`].
    pub fn retry_on_transient_statuses(self) -> Self {
        self.retry_on_status(TRANSIENT_STATUSES)
    }

    /// Retry every non-200 status (the default).
    pub fn retry_on_any_status(mut self) -> Self {
        self.retry_on_status = None;
        self.any_status = true;
        self
    }

    /// Retry transport failures only of these kinds.
    pub fn retry_on_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on_kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = Some(respect);
        self
    }

    pub fn build(self) -> Result<RetryPolicy> {
        let defaults = RetryPolicy::default();
        let retry_on_status = if self.any_status {
            None
        } else {
            self.retry_on_status.or(defaults.retry_on_status)
        };
        let policy = RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            backoff: self.backoff.unwrap_or(defaults.backoff),
            delay: self.delay.unwrap_or(defaults.delay),
            jitter: self.jitter.unwrap_or(defaults.jitter),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            max_elapsed: self.max_elapsed.unwrap_or(defaults.max_elapsed),
            retry_on_status,
            retry_on_kinds: self.retry_on_kinds.or(defaults.retry_on_kinds),
            respect_retry_after: self.respect_retry_after.unwrap_or(defaults.respect_retry_after),
        };
        validate(&policy)?;
        Ok(policy)
    }
}

fn invalid(field: &str, message: String) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(format!("retry.{}", field))
            .with_source("retry_policy"),
    )
}

fn validate(p: &RetryPolicy) -> Result<()> {
    if p.max_retries > MAX_RETRIES {
        return Err(invalid(
            "max_retries",
            format!("max_retries must be <= {}", MAX_RETRIES),
        ));
    }
    if p.delay > MAX_BASE_DELAY {
        return Err(invalid(
            "delay_ms",
            format!("delay must be <= {}ms", MAX_BASE_DELAY.as_millis()),
        ));
    }
    if p.jitter > MAX_JITTER {
        return Err(invalid(
            "jitter_ms",
            format!("jitter must be <= {}ms", MAX_JITTER.as_millis()),
        ));
    }
    if p.max_delay > MAX_MAX_DELAY {
        return Err(invalid(
            "max_delay_ms",
            format!("max_delay must be <= {}ms", MAX_MAX_DELAY.as_millis()),
        ));
    }
    if p.max_elapsed > MAX_MAX_ELAPSED {
        return Err(invalid(
            "max_elapsed_ms",
            format!("max_elapsed must be <= {}ms", MAX_MAX_ELAPSED.as_millis()),
        ));
    }
    if !p.max_delay.is_zero() {
        if p.delay > p.max_delay {
            return Err(invalid("delay_ms", "delay must be <= max_delay".into()));
        }
        if p.jitter > p.max_delay {
            return Err(invalid("jitter_ms", "jitter must be <= max_delay".into()));
        }
    }
    if let Some(statuses) = &p.retry_on_status {
        if let Some(bad) = statuses.iter().find(|s| !(100..=599).contains(*s)) {
            return Err(invalid(
                "retry_on_status",
                format!("invalid HTTP status code {}", bad),
            ));
        }
    }
    if p.max_retries > 0 {
        if !p.max_elapsed.is_zero() && p.max_elapsed < p.delay {
            return Err(invalid(
                "max_elapsed_ms",
                "max_elapsed must be >= delay when retries are enabled".into(),
            ));
        }
        let no_status = p.retry_on_status.as_ref().is_some_and(|s| s.is_empty());
        let no_kinds = p.retry_on_kinds.as_ref().is_some_and(|k| k.is_empty());
        if no_status && no_kinds {
            return Err(invalid(
                "retry_on_status",
                "retries are enabled but no failure is retryable".into(),
            ));
        }
    }
    Ok(())
}
