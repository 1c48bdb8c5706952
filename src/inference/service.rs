//! Prediction client: input validation, retried transport calls and response checks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::common::error::{EvalError, EvalResult};
use crate::data::domain::{Channel, RawRecord};

use super::domain::{
    PredictionInterval, PredictionRequest, PredictionTransport, RetryPolicy, TransportError,
    LOWER_BOUND_KEY, UPPER_BOUND_KEY,
};
use super::retry::{retry_with_backoff, RetryFailure};

/// How far past `updateTime` a prediction may be requested.
pub const PREDICTION_HORIZON_MS: i64 = 180 * 60 * 1000;

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Stateless wrapper around a remote scoring endpoint.
///
/// Every call returns its full result; nothing from a previous call is kept.
pub struct PredictionClient<T> {
    transport: T,
    policy: RetryPolicy,
    sleep: Sleeper,
}

impl<T: PredictionTransport> PredictionClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            sleep: Arc::new(std::thread::sleep),
        }
    }

    /// Replace the backoff sleep, e.g. to observe delays without waiting.
    pub fn with_sleeper<F>(mut self, sleep: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleep = Arc::new(sleep);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Predict the glucose range at `prediction_time` (epoch ms) with the configured policy.
    pub fn predict(&self, record: &RawRecord, prediction_time: i64) -> EvalResult<PredictionInterval> {
        self.predict_with(record, prediction_time, &self.policy)
    }

    /// Predict with an explicit retry policy for this call.
    pub fn predict_with(
        &self,
        record: &RawRecord,
        prediction_time: i64,
        policy: &RetryPolicy,
    ) -> EvalResult<PredictionInterval> {
        validate_record(record)?;
        validate_prediction_time(record, prediction_time)?;

        let request = PredictionRequest {
            patient: record,
            prediction_time,
        };
        let body = retry_with_backoff(
            policy,
            |delay| (self.sleep)(delay),
            |attempt| {
                self.transport.post(&request).map_err(|err| {
                    tracing::warn!(attempt, error = %err, "prediction request failed");
                    err
                })
            },
            TransportError::is_transient,
        )
        .map_err(|failure| match failure {
            RetryFailure::Exhausted { attempts, last } => EvalError::UpstreamUnavailable {
                attempts,
                detail: last.to_string(),
            },
            RetryFailure::Aborted { error, .. } => EvalError::invalid_response(error.to_string()),
        })?;

        parse_interval(&body)
    }
}

/// True iff `ground_truth` lies within the interval, bounds included.
pub fn is_inside(interval: &PredictionInterval, ground_truth: f64) -> bool {
    interval.contains(ground_truth)
}

/// Shape checks the endpoint requires before a record may be sent.
///
/// Keys only have to be present; an explicit `null` passes through to the endpoint.
pub fn validate_record(record: &RawRecord) -> EvalResult<()> {
    for (key, present) in [
        ("__class", record.class.is_some()),
        ("hospitalID", record.hospital_id.is_some()),
        ("updateTime", record.update_time.is_some()),
    ] {
        if !present {
            return Err(EvalError::invalid(format!("missing required field in patient data: {key}")));
        }
    }
    let episode = record
        .episodes()
        .first()
        .ok_or_else(|| EvalError::invalid("patient data must contain at least one episode"))?;

    for channel in [
        Channel::BloodGlucose,
        Channel::InsulinInfusion,
        Channel::NutritionInfusion,
    ] {
        if !episode.has_field(channel.field_name()) {
            return Err(EvalError::invalid(format!(
                "missing required field in episode: {channel}"
            )));
        }
    }
    Ok(())
}

/// `prediction_time` must fall within `[updateTime, updateTime + 180 min]`.
pub fn validate_prediction_time(record: &RawRecord, prediction_time: i64) -> EvalResult<()> {
    let update_time = record
        .update_time_ms()
        .ok_or_else(|| EvalError::invalid("updateTime must be an epoch-millisecond integer"))?;
    let latest = update_time.saturating_add(PREDICTION_HORIZON_MS);

    if prediction_time < update_time {
        return Err(EvalError::invalid(format!(
            "prediction time ({prediction_time}) must be >= updateTime ({update_time})"
        )));
    }
    if prediction_time > latest {
        return Err(EvalError::invalid(format!(
            "prediction time ({prediction_time}) must be <= updateTime + 180 minutes ({latest})"
        )));
    }
    Ok(())
}

fn parse_interval(body: &Value) -> EvalResult<PredictionInterval> {
    let bound = |key: &str| {
        body.get(key).and_then(Value::as_f64).ok_or_else(|| {
            EvalError::invalid_response(format!("response lacks numeric {key}: {body}"))
        })
    };
    let low = bound(LOWER_BOUND_KEY)?;
    let high = bound(UPPER_BOUND_KEY)?;

    PredictionInterval::new(low, high).ok_or_else(|| {
        EvalError::invalid_response(format!("{LOWER_BOUND_KEY} {low} exceeds {UPPER_BOUND_KEY} {high}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    const UPDATE: i64 = 1_700_000_000_000;

    /// Replays scripted results and counts calls.
    struct Scripted {
        replies: Mutex<VecDeque<Result<Value, TransportError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Value, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PredictionTransport for Scripted {
        fn post(&self, request: &PredictionRequest<'_>) -> Result<Value, TransportError> {
            assert!(request.patient.hospital().is_some());
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Connect("script exhausted".into())))
        }
    }

    fn record() -> RawRecord {
        serde_json::from_value(json!({
            "__class": "Patient",
            "hospitalID": "H1",
            "updateTime": UPDATE,
            "episodes": [{
                "bloodGlucose": [[UPDATE, 6.0]],
                "insulinInfusion": [],
                "nutritionInfusion": []
            }]
        }))
        .unwrap()
    }

    fn ok_body() -> Result<Value, TransportError> {
        Ok(json!({"BG5TH": 5.0, "BG95TH": 9.0}))
    }

    #[test]
    fn is_inside_is_inclusive() {
        let interval = PredictionInterval { low: 5.0, high: 10.0 };
        assert!(is_inside(&interval, 7.0));
        assert!(is_inside(&interval, 10.0));
        assert!(!is_inside(&interval, 10.01));
    }

    #[test]
    fn retries_timeouts_then_returns_third_result() {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&slept);
        let client = PredictionClient::new(
            Scripted::new(vec![
                Err(TransportError::Timeout),
                Err(TransportError::Timeout),
                Ok(json!({"BG5TH": 4.5, "BG95TH": 8.25})),
            ]),
            RetryPolicy::new(3, Duration::from_secs(1)),
        )
        .with_sleeper(move |d| recorder.lock().unwrap().push(d));

        let interval = client.predict(&record(), UPDATE + 60_000).unwrap();

        assert_eq!(interval, PredictionInterval { low: 4.5, high: 8.25 });
        assert_eq!(client.transport().calls(), 3);
        let total: Duration = slept.lock().unwrap().iter().sum();
        assert!(total >= Duration::from_secs(3));
    }

    #[test]
    fn backoff_really_sleeps_the_calling_thread() {
        let client = PredictionClient::new(
            Scripted::new(vec![Err(TransportError::Timeout), Err(TransportError::Status(503)), ok_body()]),
            RetryPolicy::new(3, Duration::from_millis(20)),
        );
        let started = Instant::now();
        client.predict(&record(), UPDATE).unwrap();

        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(client.transport().calls(), 3);
    }

    #[test]
    fn exhausted_retries_surface_upstream_unavailable() {
        let client = PredictionClient::new(
            Scripted::new(Vec::new()),
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
        .with_sleeper(|_| {});

        let err = client.predict(&record(), UPDATE).unwrap_err();
        assert!(matches!(err, EvalError::UpstreamUnavailable { attempts: 3, .. }));
        assert_eq!(client.transport().calls(), 3);
    }

    #[test]
    fn malformed_responses_are_not_retried() {
        for body in [json!({"BG5TH": 5.0}), json!({"BG5TH": "5", "BG95TH": 9.0}), json!({"BG5TH": 9.0, "BG95TH": 5.0})] {
            let client = PredictionClient::new(
                Scripted::new(vec![Ok(body), ok_body()]),
                RetryPolicy::new(3, Duration::from_millis(1)),
            )
            .with_sleeper(|_| {});

            let err = client.predict(&record(), UPDATE).unwrap_err();
            assert!(matches!(err, EvalError::InvalidResponse(_)));
            assert_eq!(client.transport().calls(), 1);
        }

        let client = PredictionClient::new(
            Scripted::new(vec![Err(TransportError::Body("eof".into())), ok_body()]),
            RetryPolicy::default(),
        );
        assert!(matches!(client.predict(&record(), UPDATE), Err(EvalError::InvalidResponse(_))));
        assert_eq!(client.transport().calls(), 1);
    }

    #[test]
    fn invalid_input_never_reaches_the_transport() {
        let client = PredictionClient::new(Scripted::new(vec![ok_body()]), RetryPolicy::default());

        let mut no_class = record();
        no_class.class = None;
        assert!(matches!(client.predict(&no_class, UPDATE), Err(EvalError::InvalidInput(_))));

        let mut no_infusion = record();
        if let Some(Some(episodes)) = no_infusion.episodes.as_mut() {
            episodes[0].nutrition_infusion = None;
        }
        let err = client.predict(&no_infusion, UPDATE).unwrap_err();
        assert!(err.to_string().contains("nutritionInfusion"));

        let mut no_episodes = record();
        no_episodes.episodes = Some(Some(vec![]));
        assert!(client.predict(&no_episodes, UPDATE).is_err());

        let mut null_update = record();
        null_update.update_time = Some(None);
        assert!(matches!(client.predict(&null_update, UPDATE), Err(EvalError::InvalidInput(_))));

        assert_eq!(client.transport().calls(), 0);
    }

    #[test]
    fn null_channels_count_as_present_and_are_forwarded() {
        let client = PredictionClient::new(Scripted::new(vec![ok_body()]), RetryPolicy::default());
        let mut rec = record();
        if let Some(Some(episodes)) = rec.episodes.as_mut() {
            episodes[0].insulin_infusion = Some(None);
        }

        assert!(client.predict(&rec, UPDATE).is_ok());
        let forwarded = serde_json::to_value(&rec).unwrap();
        assert!(forwarded["episodes"][0]["insulinInfusion"].is_null());
        assert!(forwarded["episodes"][0].get("insulinInfusion").is_some());
    }

    #[test]
    fn prediction_time_must_fall_in_the_horizon() {
        let rec = record();
        assert!(validate_prediction_time(&rec, UPDATE).is_ok());
        assert!(validate_prediction_time(&rec, UPDATE + PREDICTION_HORIZON_MS).is_ok());
        assert!(validate_prediction_time(&rec, UPDATE - 1).is_err());
        assert!(validate_prediction_time(&rec, UPDATE + PREDICTION_HORIZON_MS + 1).is_err());
    }
}
