//! 配置模块：执行核心的 YAML 配置与环境变量覆盖。
//!
//! # Configuration
//!
//! [`ExecutionConfig`] is plain serde data. It is loaded from YAML, then
//! optionally overridden from `AI_EXEC_*` environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AI_EXEC_CACHE_TTL_SECS` | `cache_ttl_secs` |
//! | `AI_EXEC_CACHE_MAX_ENTRIES` | `cache_max_entries` |
//! | `AI_EXEC_TIMEOUT_MS` | `timeout_ms` |
//! | `AI_EXEC_SWEEP_INTERVAL_SECS` | `sweep_interval_secs` |
//! | `AI_EXEC_WORKER_THREADS` | `worker_threads` |
//! | `AI_EXEC_RETRY_MAX_RETRIES` | `retry.max_retries` |
//! | `AI_EXEC_RETRY_BACKOFF` | `retry.backoff` |
//! | `AI_EXEC_RETRY_DELAY_MS` | `retry.delay_ms` |
//! | `AI_EXEC_RETRY_JITTER_MS` | `retry.jitter_ms` |
//! | `AI_EXEC_RETRY_MAX_DELAY_MS` | `retry.max_delay_ms` |
//! | `AI_EXEC_RETRY_MAX_ELAPSED_MS` | `retry.max_elapsed_ms` |
//! | `AI_EXEC_RETRY_ON_STATUS` | `retry.retry_on_status` (comma list, `*` for any) |
//! | `AI_EXEC_RETRY_RESPECT_RETRY_AFTER` | `retry.respect_retry_after` |
//!
//! ```yaml
//! cache_ttl_secs: 600
//! timeout_ms: 30000
//! retry:
//!   max_retries: 3
//!   backoff: linear
//!   retry_on_status: [429, 503]
//! ```

use crate::error_code::ErrorKind;
use crate::resilience::{BackoffStrategy, RetryPolicy};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "AI_EXEC_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub cache_ttl_secs: u64,
    /// 0 disables the response cache
    pub cache_max_entries: usize,
    pub timeout_ms: u64,
    /// 0 disables the background sweep
    pub sweep_interval_secs: u64,
    /// `None`: size the pool from the CPU count
    pub worker_threads: Option<usize>,
    pub retry: RetryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            cache_max_entries: 1000,
            timeout_ms: 60_000,
            sweep_interval_secs: 60,
            worker_threads: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Serializable mirror of [`RetryPolicy`] with millisecond integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// `fixed`, `linear` or `exponential` (case-insensitive)
    pub backoff: String,
    pub delay_ms: u64,
    pub jitter_ms: u64,
    pub max_delay_ms: u64,
    pub max_elapsed_ms: u64,
    /// `null` retries every non-200 status
    pub retry_on_status: Option<Vec<u16>>,
    /// `null` retries every transport failure
    pub retry_on_kinds: Option<Vec<ErrorKind>>,
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries(),
            backoff: policy.backoff().to_string(),
            delay_ms: policy.delay().as_millis() as u64,
            jitter_ms: policy.jitter().as_millis() as u64,
            max_delay_ms: policy.max_delay().as_millis() as u64,
            max_elapsed_ms: policy.max_elapsed().as_millis() as u64,
            retry_on_status: policy
                .retry_on_status()
                .map(|s| s.iter().copied().collect()),
            retry_on_kinds: policy
                .retry_on_kinds()
                .map(|k| k.iter().copied().collect()),
            respect_retry_after: policy.respect_retry_after(),
        }
    }
}

impl RetryConfig {
    /// Validate and convert into an immutable policy.
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let mut builder = RetryPolicy::builder()
            .max_retries(self.max_retries)
            .backoff(BackoffStrategy::from_str(&self.backoff)?)
            .delay(Duration::from_millis(self.delay_ms))
            .jitter(Duration::from_millis(self.jitter_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .max_elapsed(Duration::from_millis(self.max_elapsed_ms))
            .respect_retry_after(self.respect_retry_after);
        builder = match &self.retry_on_status {
            Some(statuses) => builder.retry_on_status(statuses.iter().copied()),
            None => builder.retry_on_any_status(),
        };
        if let Some(kinds) = &self.retry_on_kinds {
            builder = builder.retry_on_kinds(kinds.iter().copied());
        }
        builder.build()
    }
}

fn config_error(message: String, field: &str, source: &str) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source(source),
    )
}

fn parse_env<T: FromStr>(var: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        config_error(
            format!("invalid value '{}' for {}", raw, var),
            var,
            "config_env",
        )
    })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(config_error(
            format!("invalid boolean '{}' for {}", raw, var),
            var,
            "config_env",
        )),
    }
}

fn parse_status_list(var: &str, raw: &str) -> Result<Option<Vec<u16>>> {
    let raw = raw.trim();
    if raw == "*" {
        return Ok(None);
    }
    let mut statuses = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let status: u16 = parse_env(var, part)?;
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    Ok(Some(statuses))
}

impl ExecutionConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str::<Self>(content).map_err(|e| {
            config_error(
                format!("invalid execution config: {}", e),
                "<root>",
                "config_yaml",
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_yaml"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `AI_EXEC_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply `AI_EXEC_*` overrides from an arbitrary lookup. Unset
    /// variables leave the field alone; malformed ones are errors.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((var, v)) = get("CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("CACHE_MAX_ENTRIES") {
            self.cache_max_entries = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("TIMEOUT_MS") {
            self.timeout_ms = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("WORKER_THREADS") {
            self.worker_threads = Some(parse_env(&var, &v)?);
        }
        if let Some((var, v)) = get("RETRY_MAX_RETRIES") {
            self.retry.max_retries = parse_env(&var, &v)?;
        }
        if let Some((_, v)) = get("RETRY_BACKOFF") {
            // validated when the policy is built
            self.retry.backoff = v.trim().to_string();
        }
        if let Some((var, v)) = get("RETRY_DELAY_MS") {
            self.retry.delay_ms = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("RETRY_JITTER_MS") {
            self.retry.jitter_ms = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("RETRY_MAX_ELAPSED_MS") {
            self.retry.max_elapsed_ms = parse_env(&var, &v)?;
        }
        if let Some((var, v)) = get("RETRY_ON_STATUS") {
            self.retry.retry_on_status = parse_status_list(&var, &v)?;
        }
        if let Some((var, v)) = get("RETRY_RESPECT_RETRY_AFTER") {
            self.retry.respect_retry_after = parse_bool(&var, &v)?;
        }
        Ok(self)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        self.retry.to_policy()
    }
}
