//! Concurrent evaluation harness: one prediction per file, fanned out over the worker pool.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::time::Instant;

use crate::common::error::{EvalCode, EvalResult};
use crate::common::log;
use crate::data::repo_fs::{self, RecordDir};
use crate::data::service::raw_prediction_target;
use crate::inference::domain::PredictionTransport;
use crate::inference::service::PredictionClient;
use crate::inference::workers::Pool;

use super::domain::{BatchSummary, EvaluationOutcome};

/// Score every `*.json` file in `dir` against the prediction endpoint.
///
/// Every file yields exactly one outcome, sorted by identifier. Per-file
/// errors and panics become `Failed` outcomes; only an unreadable directory
/// fails the call.
pub fn evaluate_directory<T>(
    dir: &Path,
    client: Arc<PredictionClient<T>>,
    workers: usize,
) -> EvalResult<Vec<EvaluationOutcome>>
where
    T: PredictionTransport + 'static,
{
    let started = Instant::now();
    let files = RecordDir::open(dir)?.json_files()?;
    let expected: BTreeSet<String> = files.iter().map(|p| repo_fs::identifier_for(p)).collect();

    let (done_tx, done_rx) = mpsc::channel::<EvaluationOutcome>();
    {
        let pool = Pool::new(workers);
        for path in files {
            let client = Arc::clone(&client);
            let done_tx = done_tx.clone();
            pool.submit(move || {
                let identifier = repo_fs::identifier_for(&path);
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| score_file(&path, &client))) {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(err)) => {
                        tracing::warn!(file = %identifier, code = err.code() as u32, error = %err, "prediction failed");
                        EvaluationOutcome::failed(identifier, err.to_string())
                    }
                    Err(payload) => {
                        let detail = format!("worker panicked: {}", panic_message(payload.as_ref()));
                        tracing::error!(file = %identifier, error = %detail, "prediction job panicked");
                        EvaluationOutcome::failed(identifier, detail)
                    }
                };
                let _ = done_tx.send(outcome);
            });
        }
    }
    drop(done_tx);

    let mut outcomes: Vec<EvaluationOutcome> = done_rx.iter().collect();
    let seen: BTreeSet<String> = outcomes.iter().map(|o| o.identifier.clone()).collect();
    outcomes.extend(
        expected
            .difference(&seen)
            .map(|identifier| EvaluationOutcome::failed(identifier.clone(), "job did not complete")),
    );
    outcomes.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    let summary = BatchSummary::from_outcomes(&outcomes);
    log::log_event("evaluation", "directory_scored", EvalCode::Ok, started.elapsed().as_millis());
    tracing::info!(
        dir = %dir.display(),
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "evaluation harness finished"
    );
    Ok(outcomes)
}

fn score_file<T: PredictionTransport>(path: &Path, client: &PredictionClient<T>) -> EvalResult<EvaluationOutcome> {
    let raw = repo_fs::load_record(path)?;
    let (prediction_time, ground_truth) = raw_prediction_target(&raw)?;
    let interval = client.predict(&raw, prediction_time)?;
    Ok(EvaluationOutcome::scored(
        repo_fs::identifier_for(path),
        ground_truth,
        interval,
    ))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
