//! Domain types for per-file prediction outcomes, batch metrics and comparison reports.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::common::json::round_to;
use crate::inference::domain::PredictionInterval;

/// Fixed interpretation text attached to every comparison report.
pub const COMPARISON_INFORMATION: &str = "Adversarial evaluation comparing STAR model performance on real-world data (RWD) \
versus synthetic data. The evaluation assesses whether the model trained on real data \
generalizes similarly to synthetic data, indicating synthetic data quality and realism. \
\n\n\
Metrics:\n\
- Coverage Rate: Percentage of ground truth values falling within predicted intervals \
(BG5TH to BG95TH). Higher values indicate better calibrated predictions.\n\
- MAE (Mean Absolute Error): Average absolute difference between predicted interval midpoints \
and ground truth values. Lower is better.\n\
- RMSE (Root Mean Squared Error): Square root of average squared errors, penalizing larger errors \
more heavily. Lower is better.\n\
- MAPE (Mean Absolute Percentage Error): Average absolute percentage error, useful for \
comparing performance across different scales. Lower is better.\n\
\n\
Interpretation:\n\
Small differences between RWD and synthetic metrics suggest the synthetic data captures real-world \
patterns well and can be used as a valid substitute for model evaluation. Large differences \
indicate distribution mismatch and potential limitations in synthetic data utility.";

/// Result of scoring one file.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationOutcome {
    pub identifier: String,
    pub status: OutcomeStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutcomeStatus {
    Scored {
        ground_truth: f64,
        interval: PredictionInterval,
        interval_midpoint: f64,
        inside_interval: bool,
    },
    Failed {
        error_detail: String,
    },
}

impl EvaluationOutcome {
    pub fn scored(identifier: impl Into<String>, ground_truth: f64, interval: PredictionInterval) -> Self {
        Self {
            identifier: identifier.into(),
            status: OutcomeStatus::Scored {
                ground_truth,
                interval,
                interval_midpoint: interval.midpoint(),
                inside_interval: interval.contains(ground_truth),
            },
        }
    }

    pub fn failed(identifier: impl Into<String>, error_detail: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: OutcomeStatus::Failed {
                error_detail: error_detail.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, OutcomeStatus::Scored { .. })
    }
}

impl Serialize for EvaluationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.status {
            OutcomeStatus::Scored {
                ground_truth,
                interval,
                interval_midpoint,
                inside_interval,
            } => {
                let mut row = serializer.serialize_struct("EvaluationOutcome", 7)?;
                row.serialize_field("identifier", &self.identifier)?;
                row.serialize_field("ok", &true)?;
                row.serialize_field("ground_truth", ground_truth)?;
                row.serialize_field("BG5TH", &interval.low)?;
                row.serialize_field("BG95TH", &interval.high)?;
                row.serialize_field("interval_midpoint", interval_midpoint)?;
                row.serialize_field("inside_interval", inside_interval)?;
                row.end()
            }
            OutcomeStatus::Failed { error_detail } => {
                let mut row = serializer.serialize_struct("EvaluationOutcome", 3)?;
                row.serialize_field("identifier", &self.identifier)?;
                row.serialize_field("ok", &false)?;
                row.serialize_field("error_detail", error_detail)?;
                row.end()
            }
        }
    }
}

/// Accuracy metrics over the scored outcomes of one batch.
///
/// All fields are NaN when nothing was scored; check `BatchSummary` first.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct BatchMetrics {
    pub coverage_rate: f64,
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
}

impl BatchMetrics {
    pub const UNDEFINED: BatchMetrics = BatchMetrics {
        coverage_rate: f64::NAN,
        mae: f64::NAN,
        rmse: f64::NAN,
        mape: f64::NAN,
    };
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    NoFiles,
    AllFailed,
    SomeFailed,
    AllSucceeded,
}

/// Success/failure counts of one harness run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: BatchStatus,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[EvaluationOutcome]) -> Self {
        let total = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        let failed = total - succeeded;
        let status = match (total, succeeded) {
            (0, _) => BatchStatus::NoFiles,
            (_, 0) => BatchStatus::AllFailed,
            (t, s) if s < t => BatchStatus::SomeFailed,
            _ => BatchStatus::AllSucceeded,
        };
        Self {
            total,
            succeeded,
            failed,
            status,
        }
    }

    /// Metrics are only meaningful when at least one file was scored.
    pub fn has_metrics(&self) -> bool {
        self.succeeded > 0
    }
}

/// One metric measured on both data sets.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MetricComparison {
    pub rwd: f64,
    pub synthetic: f64,
    pub difference: f64,
}

impl MetricComparison {
    pub fn new(rwd: f64, synthetic: f64) -> Self {
        Self {
            rwd,
            synthetic,
            difference: (rwd - synthetic).abs(),
        }
    }
}

/// Real-world versus synthetic accuracy, rendered in the published report layout.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonReport {
    pub information: &'static str,
    pub coverage_rate: MetricComparison,
    pub mae: MetricComparison,
    pub rmse: MetricComparison,
    pub mape: MetricComparison,
    pub rwd_summary: Option<BatchSummary>,
    pub synthetic_summary: Option<BatchSummary>,
}

/// Fraction rendered as percentage points, e.g. `0.853 -> "85.3pp"`.
pub fn percentage_points(fraction: f64) -> String {
    format!("{:?}pp", round_to(fraction * 100.0, 2))
}

struct Percent<'a>(&'a MetricComparison);

impl Serialize for Percent<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut block = serializer.serialize_map(Some(3))?;
        block.serialize_entry("rwd", &percentage_points(self.0.rwd))?;
        block.serialize_entry("synthetic", &percentage_points(self.0.synthetic))?;
        block.serialize_entry("difference", &percentage_points(self.0.difference))?;
        block.end()
    }
}

struct Absolute<'a>(&'a MetricComparison);

impl Serialize for Absolute<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut block = serializer.serialize_map(Some(3))?;
        block.serialize_entry("rwd", &round_to(self.0.rwd, 4))?;
        block.serialize_entry("synthetic", &round_to(self.0.synthetic, 4))?;
        block.serialize_entry("difference", &format!("{:.4}", self.0.difference))?;
        block.end()
    }
}

impl Serialize for ComparisonReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut report = serializer.serialize_map(None)?;
        report.serialize_entry("information", self.information)?;
        report.serialize_entry("Coverage Rate", &Percent(&self.coverage_rate))?;
        report.serialize_entry("MAE", &Absolute(&self.mae))?;
        report.serialize_entry("RMSE", &Absolute(&self.rmse))?;
        report.serialize_entry("MAPE", &Percent(&self.mape))?;
        if let Some(summary) = &self.rwd_summary {
            report.serialize_entry("rwd_summary", summary)?;
        }
        if let Some(summary) = &self.synthetic_summary {
            report.serialize_entry("synthetic_summary", summary)?;
        }
        report.end()
    }
}
