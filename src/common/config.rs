//! Runtime configuration loaded from the environment.
//!
//! CLI flags override individual values after loading.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::inference::domain::RetryPolicy;
use crate::inference::workers::DEFAULT_WORKERS;

/// Public STAR validation endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "https://demo.insilicare.com/api/star/REALM/validation";

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalCfg {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub workers: usize,
    pub log_level: String,
}

impl Default for EvalCfg {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 5,
            max_retries: 2,
            retry_base_delay_ms: 2_000,
            workers: DEFAULT_WORKERS,
            log_level: "info".to_string(),
        }
    }
}

impl EvalCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup; unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            endpoint: lookup("POSTMARKET_ENDPOINT").unwrap_or(defaults.endpoint),
            timeout_secs: parsed(&lookup, "POSTMARKET_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            max_retries: parsed(&lookup, "POSTMARKET_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_base_delay_ms: parsed(&lookup, "POSTMARKET_RETRY_BASE_DELAY_MS")
                .unwrap_or(defaults.retry_base_delay_ms),
            workers: parsed::<usize>(&lookup, "POSTMARKET_WORKERS")
                .filter(|w| *w > 0)
                .unwrap_or(defaults.workers),
            log_level: lookup("POSTMARKET_LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Retry policy derived from the retry settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

fn parsed<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
