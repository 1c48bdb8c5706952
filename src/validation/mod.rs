//! Record validation: expert-knowledge and statistical check suites.

pub mod domain;
pub mod expert;
pub mod service;
pub mod statistical;

pub use domain::{Check, CheckInput, CheckReport, Evidence, SuiteReport, Verdict};
pub use service::{run_expert_knowledge, run_statistical_analysis, run_suite};
