//! Metric aggregation and the adversarial and post-market runs built on top of it.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::common::error::{EvalCode, EvalResult};
use crate::common::log;
use crate::inference::domain::PredictionTransport;
use crate::inference::service::PredictionClient;
use crate::validation::domain::SuiteReport;
use crate::validation::service::{run_expert_knowledge, run_statistical_analysis};

use super::domain::{
    BatchMetrics, BatchStatus, BatchSummary, ComparisonReport, EvaluationOutcome, MetricComparison,
    OutcomeStatus, COMPARISON_INFORMATION,
};
use super::harness::evaluate_directory;

/// Coverage, MAE, RMSE and MAPE over the scored outcomes, using the interval
/// midpoint as the point prediction. MAPE is a fraction.
pub fn compute_batch_metrics(outcomes: &[EvaluationOutcome]) -> BatchMetrics {
    let scored: Vec<(f64, f64, bool)> = outcomes
        .iter()
        .filter_map(|outcome| match outcome.status {
            OutcomeStatus::Scored {
                ground_truth,
                interval_midpoint,
                inside_interval,
                ..
            } => Some((ground_truth, interval_midpoint, inside_interval)),
            OutcomeStatus::Failed { .. } => None,
        })
        .collect();

    if scored.is_empty() {
        return BatchMetrics::UNDEFINED;
    }

    BatchMetrics {
        coverage_rate: mean(&scored, |&(_, _, inside)| if inside { 1.0 } else { 0.0 }),
        mae: mean(&scored, |&(truth, pred, _)| (truth - pred).abs()),
        rmse: mean(&scored, |&(truth, pred, _)| (truth - pred).powi(2)).sqrt(),
        mape: mean(&scored, |&(truth, pred, _)| (truth - pred).abs() / truth.abs()),
    }
}

fn mean<F>(rows: &[(f64, f64, bool)], f: F) -> f64
where
    F: Fn(&(f64, f64, bool)) -> f64,
{
    rows.iter().map(f).sum::<f64>() / rows.len() as f64
}

/// Pair each metric with its absolute real-vs-synthetic difference.
pub fn build_comparison_report(real: &BatchMetrics, synthetic: &BatchMetrics) -> ComparisonReport {
    ComparisonReport {
        information: COMPARISON_INFORMATION,
        coverage_rate: MetricComparison::new(real.coverage_rate, synthetic.coverage_rate),
        mae: MetricComparison::new(real.mae, synthetic.mae),
        rmse: MetricComparison::new(real.rmse, synthetic.rmse),
        mape: MetricComparison::new(real.mape, synthetic.mape),
        rwd_summary: None,
        synthetic_summary: None,
    }
}

/// Score both directories and compare model accuracy on them.
pub fn run_adversarial<T>(
    synth_dir: &Path,
    rwd_dir: &Path,
    client: Arc<PredictionClient<T>>,
    workers: usize,
) -> EvalResult<ComparisonReport>
where
    T: PredictionTransport + 'static,
{
    let started = Instant::now();
    let synthetic = evaluate_directory(synth_dir, Arc::clone(&client), workers)?;
    let rwd = evaluate_directory(rwd_dir, client, workers)?;

    let synthetic_summary = BatchSummary::from_outcomes(&synthetic);
    let rwd_summary = BatchSummary::from_outcomes(&rwd);
    for (side, summary) in [("synthetic", &synthetic_summary), ("rwd", &rwd_summary)] {
        if summary.status != BatchStatus::AllSucceeded {
            tracing::warn!(
                side,
                status = ?summary.status,
                failed = summary.failed,
                total = summary.total,
                "metrics computed from an incomplete batch"
            );
        }
    }

    let mut report = build_comparison_report(&compute_batch_metrics(&rwd), &compute_batch_metrics(&synthetic));
    report.rwd_summary = Some(rwd_summary);
    report.synthetic_summary = Some(synthetic_summary);

    log::log_event("evaluation", "adversarial_completed", EvalCode::Ok, started.elapsed().as_millis());
    Ok(report)
}

/// The three evaluations of one synthetic data set in a single document.
#[derive(Debug, Serialize)]
pub struct PostMarketReport {
    pub expert_knowledge_evaluation: SuiteReport,
    pub statistical_analysis_evaluation: SuiteReport,
    pub adversarial_evaluation: ComparisonReport,
}

/// Run expert-knowledge and statistical checks on `synth_dir`, then the adversarial comparison.
pub fn run_post_market<T>(
    synth_dir: &Path,
    rwd_dir: &Path,
    client: Arc<PredictionClient<T>>,
    workers: usize,
) -> EvalResult<PostMarketReport>
where
    T: PredictionTransport + 'static,
{
    Ok(PostMarketReport {
        expert_knowledge_evaluation: run_expert_knowledge(synth_dir)?,
        statistical_analysis_evaluation: run_statistical_analysis(synth_dir)?,
        adversarial_evaluation: run_adversarial(synth_dir, rwd_dir, client, workers)?,
    })
}
