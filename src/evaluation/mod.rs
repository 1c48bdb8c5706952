//! Adversarial evaluation: concurrent scoring, batch metrics and comparison reports.

pub mod domain;
pub mod harness;
pub mod service;

pub use domain::{BatchMetrics, BatchStatus, BatchSummary, ComparisonReport, EvaluationOutcome, OutcomeStatus};
pub use harness::evaluate_directory;
pub use service::{build_comparison_report, compute_batch_metrics, run_adversarial, run_post_market, PostMarketReport};
