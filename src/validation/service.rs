//! Runs check suites over a directory of record files.

use std::path::Path;
use std::time::Instant;

use crate::common::error::{EvalCode, EvalResult};
use crate::common::log;
use crate::data::domain::RawRecord;
use crate::data::repo_fs::{self, RecordDir};
use crate::data::service::normalize;

use super::domain::{Check, CheckInput, CheckReport, SkippedFile, SuiteReport};
use super::{expert, statistical};

/// Expert-knowledge report for every record in `dir`.
pub fn run_expert_knowledge(dir: &Path) -> EvalResult<SuiteReport> {
    run_suite(dir, &expert::checks())
}

/// Statistical-analysis report for every record in `dir`.
pub fn run_statistical_analysis(dir: &Path) -> EvalResult<SuiteReport> {
    run_suite(dir, &statistical::checks())
}

/// Apply every check to every JSON file in `dir`.
///
/// Files that cannot be parsed, or hold an event without a usable timestamp,
/// are logged and skipped; only an inaccessible directory fails the run.
pub fn run_suite(dir: &Path, checks: &[Check]) -> EvalResult<SuiteReport> {
    let started = Instant::now();
    let records = RecordDir::open(dir)?;

    let mut report = SuiteReport::default();
    for check in checks {
        report
            .checks
            .insert(check.id.to_string(), CheckReport::new(check.information));
    }

    for path in records.json_files()? {
        let identifier = repo_fs::identifier_for(&path);
        let raw = match repo_fs::load_record(&path) {
            Ok(raw) => raw,
            Err(err) => {
                skip(&mut report, identifier, err.to_string());
                continue;
            }
        };
        apply_checks(&mut report, checks, &identifier, &raw);
    }

    log::log_event(
        "validation",
        "suite_completed",
        EvalCode::Ok,
        started.elapsed().as_millis(),
    );
    tracing::info!(
        dir = %dir.display(),
        checks = checks.len(),
        skipped = report.skipped.len(),
        "check suite finished"
    );
    Ok(report)
}

fn apply_checks(report: &mut SuiteReport, checks: &[Check], identifier: &str, raw: &RawRecord) {
    let record = match normalize(raw) {
        Ok(record) => record,
        Err(err) => {
            skip(report, identifier.to_string(), err.to_string());
            return;
        }
    };
    let input = CheckInput {
        raw,
        record: &record,
    };

    for check in checks {
        let verdict = (check.run)(&input);
        if let Some(results) = report.checks.get_mut(check.id) {
            results.results.insert(identifier.to_string(), verdict);
        }
    }
}

fn skip(report: &mut SuiteReport, identifier: String, reason: String) {
    tracing::warn!(file = %identifier, %reason, "skipping record");
    report.skipped.push(SkippedFile { identifier, reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn expert_suite_reports_every_parsable_file_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.json", r#"{"episodes":[{"bloodGlucose":[[0,5.0]]}]}"#);
        write(dir.path(), "high.json", r#"{"episodes":[{"bloodGlucose":[[0,150.0]]}]}"#);
        write(dir.path(), "broken.json", "{ nope");
        write(dir.path(), "empty_event.json", r#"{"episodes":[{"bloodGlucose":[[]]}]}"#);

        let report = run_expert_knowledge(dir.path()).unwrap();

        let range = report.check("criterion_1").unwrap();
        assert_eq!(range.results.len(), 2);
        assert!(range.results["good.json"].valid);
        assert!(!range.results["high.json"].valid);
        assert!(report.check("criterion_2").unwrap().all_valid());

        let skipped: Vec<&str> = report.skipped.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(skipped, vec!["broken.json", "empty_event.json"]);
    }

    #[test]
    fn statistical_suite_serialises_keyed_by_check() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "p.json", r#"{"episodes":[]}"#);

        let report = run_statistical_analysis(dir.path()).unwrap();
        let value = serde_json::to_value(&report).unwrap();

        for id in ["check_1", "check_2", "check_3", "check_4"] {
            assert!(value[id]["information"].is_string(), "{id} lacks information");
        }
        assert_eq!(value["check_1"]["p.json"]["missing_fields"][0], "episodes");
        assert_eq!(value["check_4"]["p.json"]["valid"], true);
    }

    #[test]
    fn ill_typed_payloads_still_get_every_check() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "x.json",
            r#"{"episodes":[{"diabeticStatus":7,"bloodGlucose":[[0,500.0]],"nutritionBolus":[[0,5]]}]}"#,
        );

        let expert = run_expert_knowledge(dir.path()).unwrap();
        let statistical = run_statistical_analysis(dir.path()).unwrap();

        assert!(expert.skipped.is_empty());
        assert!(statistical.skipped.is_empty());
        assert!(!expert.check("criterion_1").unwrap().results["x.json"].valid);
        assert!(!statistical.check("check_3").unwrap().results["x.json"].valid);
        assert!(!statistical.check("check_1").unwrap().results["x.json"].valid);
    }

    #[test]
    fn missing_directory_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_statistical_analysis(&dir.path().join("missing")).is_err());
    }
}
