use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use postmarket_eval::data::Channel;
use postmarket_eval::evaluation::{
    compute_batch_metrics, evaluate_directory, run_adversarial, BatchStatus, BatchSummary, OutcomeStatus,
};
use postmarket_eval::inference::domain::{PredictionRequest, PredictionTransport, RetryPolicy, TransportError};
use postmarket_eval::inference::PredictionClient;
use serde_json::{json, Value};

const UPDATE: i64 = 1_700_000_000_000;

/// Interval of `offset ± 1` around the last glucose value the request carries.
struct Offset {
    offset: f64,
    calls: AtomicUsize,
}

impl Offset {
    fn new(offset: f64) -> Self {
        Self {
            offset,
            calls: AtomicUsize::new(0),
        }
    }
}

impl PredictionTransport for Offset {
    fn post(&self, request: &PredictionRequest<'_>) -> Result<Value, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = request.patient.episodes()[0]
            .series(Channel::BloodGlucose)
            .and_then(|series| series.last())
            .and_then(|event| event.get(1))
            .and_then(Value::as_f64)
            .ok_or_else(|| TransportError::Body("no glucose".into()))?;
        let centre = last + self.offset;
        Ok(json!({"BG5TH": centre - 1.0, "BG95TH": centre + 1.0}))
    }
}

fn client(offset: f64) -> Arc<PredictionClient<Offset>> {
    Arc::new(
        PredictionClient::new(Offset::new(offset), RetryPolicy::new(2, Duration::from_millis(1)))
            .with_sleeper(|_| {}),
    )
}

fn write_patient(dir: &Path, name: &str, last_glucose: f64) {
    let record = json!({
        "__class": "Patient",
        "hospitalID": "H-7",
        "updateTime": UPDATE,
        "episodes": [{
            "diabeticStatus": 1,
            "startTime": UPDATE - 86_400_000,
            "bloodGlucose": [[UPDATE - 3_600_000, 7.0], [UPDATE, last_glucose]],
            "insulinInfusion": [[UPDATE - 3_600_000, {"rate": 1.5, "route": 2}]],
            "insulinBolus": [],
            "nutritionInfusion": [[UPDATE - 3_600_000, {"rate": 40.0}]],
            "nutritionBolus": []
        }]
    });
    fs::write(dir.join(name), serde_json::to_string_pretty(&record).unwrap()).unwrap();
}

#[test]
fn one_corrupt_file_does_not_disturb_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    for (idx, glucose) in [6.0, 8.0, 0.0, 9.5, 11.0].into_iter().enumerate() {
        let name = format!("patient_{}.json", idx + 1);
        if idx == 2 {
            fs::write(dir.path().join(&name), "{ not json").unwrap();
        } else {
            write_patient(dir.path(), &name, glucose);
        }
    }

    let client = client(0.0);
    let outcomes = evaluate_directory(dir.path(), Arc::clone(&client), 3).unwrap();

    assert_eq!(outcomes.len(), 5);
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_ok()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].identifier, "patient_3.json");
    assert_eq!(client.transport().calls.load(Ordering::SeqCst), 4);

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.status, BatchStatus::SomeFailed);
    assert_eq!((summary.succeeded, summary.failed), (4, 1));

    let metrics = compute_batch_metrics(&outcomes);
    assert_eq!(metrics.coverage_rate, 1.0);
    assert_eq!(metrics.mae, 0.0);
}

#[test]
fn scored_outcome_carries_truth_and_interval() {
    let dir = tempfile::tempdir().unwrap();
    write_patient(dir.path(), "a.json", 10.0);

    let outcomes = evaluate_directory(dir.path(), client(5.0), 1).unwrap();

    match &outcomes[0].status {
        OutcomeStatus::Scored {
            ground_truth,
            interval,
            interval_midpoint,
            inside_interval,
        } => {
            assert_eq!(*ground_truth, 10.0);
            assert_eq!((interval.low, interval.high), (14.0, 16.0));
            assert_eq!(*interval_midpoint, 15.0);
            assert!(!inside_interval);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn adversarial_report_compares_both_sides() {
    let synth = tempfile::tempdir().unwrap();
    let rwd = tempfile::tempdir().unwrap();
    write_patient(synth.path(), "s1.json", 100.0);
    write_patient(synth.path(), "s2.json", 200.0);
    write_patient(rwd.path(), "r1.json", 100.0);
    fs::write(rwd.path().join("r2.json"), "[]").unwrap();

    let report = run_adversarial(synth.path(), rwd.path(), client(0.0), 4).unwrap();
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["Coverage Rate"]["rwd"], "100.0pp");
    assert_eq!(value["Coverage Rate"]["synthetic"], "100.0pp");
    assert_eq!(value["Coverage Rate"]["difference"], "0.0pp");
    assert_eq!(value["MAE"]["difference"], "0.0000");
    assert_eq!(value["rwd_summary"]["status"], "some_failed");
    assert_eq!(value["synthetic_summary"]["status"], "all_succeeded");
    assert_eq!(value["synthetic_summary"]["total"], 2);
}
