//! Domain definitions for prediction requests, intervals and transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::data::domain::RawRecord;

/// Response key of the 5th percentile bound.
pub const LOWER_BOUND_KEY: &str = "BG5TH";
/// Response key of the 95th percentile bound.
pub const UPPER_BOUND_KEY: &str = "BG95TH";

/// Predicted glucose range. Always `low <= high`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    pub low: f64,
    pub high: f64,
}

impl PredictionInterval {
    /// `None` unless both bounds are finite and ordered.
    pub fn new(low: f64, high: f64) -> Option<Self> {
        (low.is_finite() && high.is_finite() && low <= high).then_some(Self { low, high })
    }

    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    /// Inclusive on both ends.
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Body posted to the prediction endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct PredictionRequest<'a> {
    pub patient: &'a RawRecord,
    #[serde(rename = "predictionTime")]
    pub prediction_time: i64,
}

/// Failure of a single network exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("response body is not valid JSON: {0}")]
    Body(String),
}

impl TransportError {
    /// Transient failures are retried; a garbled body is a contract violation.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Body(_))
    }
}

/// One request/response exchange with the scoring endpoint.
pub trait PredictionTransport: Send + Sync {
    fn post(&self, request: &PredictionRequest<'_>) -> Result<Value, TransportError>;
}

/// Bounded exponential backoff: one initial attempt plus up to `max_retries` retries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay slept before retry number `retry` (0-based): `base_delay * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_requires_ordered_finite_bounds() {
        assert!(PredictionInterval::new(5.0, 10.0).is_some());
        assert!(PredictionInterval::new(5.0, 5.0).is_some());
        assert!(PredictionInterval::new(10.0, 5.0).is_none());
        assert!(PredictionInterval::new(f64::NAN, 5.0).is_none());
    }

    #[test]
    fn midpoint_and_containment() {
        let interval = PredictionInterval::new(5.0, 10.0).unwrap();
        assert_eq!(interval.midpoint(), 7.5);
        assert!(interval.contains(5.0));
        assert!(interval.contains(10.0));
        assert!(!interval.contains(10.01));
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for(40), Duration::from_secs(u32::MAX as u64));
    }

    #[test]
    fn only_body_errors_are_permanent() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Status(503).is_transient());
        assert!(!TransportError::Body("eof".into()).is_transient());
    }
}
