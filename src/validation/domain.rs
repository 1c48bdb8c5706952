//! Verdicts, evidence and report shapes produced by the record checks.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::common::time::{self, Instant};
use crate::data::domain::{PatientRecord, RawRecord};

fn iso<S: Serializer>(at: &Instant, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&time::to_iso(at))
}

/// Glucose reading outside the plausible range.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GlucoseViolation {
    #[serde(serialize_with = "iso")]
    pub timestamp: Instant,
    pub glucose_value: f64,
}

/// How an insulin dose was delivered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdministrationKind {
    Infusion,
    Bolus,
}

/// Subcutaneous insulin given inside the lookback window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InsulinAdministration {
    #[serde(serialize_with = "iso")]
    pub timestamp: Instant,
    #[serde(rename = "type")]
    pub kind: AdministrationKind,
    pub route: i64,
}

/// Point on the merged infusion timeline where both running rates were zero.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZeroInfusionPeriod {
    #[serde(serialize_with = "iso")]
    pub timestamp: Instant,
    pub insulin_rate: f64,
    pub nutrition_rate: f64,
}

/// Glucose measurement count inside an episode's trailing window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasurementWindow {
    #[serde(serialize_with = "iso")]
    pub window_start: Instant,
    #[serde(serialize_with = "iso")]
    pub window_end: Instant,
    pub count: usize,
}

/// Check-specific evidence. Serialised as a single `"<key>": [...]` entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Evidence {
    #[serde(rename = "invalid_values")]
    InvalidValues(Vec<GlucoseViolation>),
    #[serde(rename = "invalid_administrations")]
    InvalidAdministrations(Vec<InsulinAdministration>),
    #[serde(rename = "missing_fields")]
    MissingFields(Vec<String>),
    #[serde(rename = "invalid_periods")]
    InvalidPeriods(Vec<ZeroInfusionPeriod>),
    #[serde(rename = "invalid_statuses")]
    InvalidStatuses(Vec<Value>),
    #[serde(rename = "measurement_counts")]
    MeasurementCounts(Vec<MeasurementWindow>),
}

/// Pass/fail outcome of one check on one file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub valid: bool,
    #[serde(flatten)]
    pub evidence: Evidence,
}

impl Verdict {
    /// Valid iff the evidence holds no violations.
    ///
    /// Measurement counts are not violations; the density check sets `valid` itself.
    pub fn from_violations(evidence: Evidence) -> Self {
        let valid = match &evidence {
            Evidence::InvalidValues(v) => v.is_empty(),
            Evidence::InvalidAdministrations(v) => v.is_empty(),
            Evidence::MissingFields(v) => v.is_empty(),
            Evidence::InvalidPeriods(v) => v.is_empty(),
            Evidence::InvalidStatuses(v) => v.is_empty(),
            Evidence::MeasurementCounts(_) => true,
        };
        Self { valid, evidence }
    }
}

/// Both views of the record a check may inspect.
#[derive(Copy, Clone, Debug)]
pub struct CheckInput<'a> {
    pub raw: &'a RawRecord,
    pub record: &'a PatientRecord,
}

/// A named, documented record check.
#[derive(Copy, Clone)]
pub struct Check {
    pub id: &'static str,
    pub information: &'static str,
    pub run: fn(&CheckInput<'_>) -> Verdict,
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check").field("id", &self.id).finish()
    }
}

/// Results of one check across a directory, keyed by file name.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckReport {
    pub information: String,
    pub results: BTreeMap<String, Verdict>,
}

impl CheckReport {
    pub fn new(information: impl Into<String>) -> Self {
        Self {
            information: information.into(),
            results: BTreeMap::new(),
        }
    }

    /// Whether every processed file passed.
    pub fn all_valid(&self) -> bool {
        self.results.values().all(|v| v.valid)
    }
}

impl Serialize for CheckReport {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.results.len() + 1))?;
        map.serialize_entry("information", &self.information)?;
        for (file, verdict) in &self.results {
            map.serialize_entry(file, verdict)?;
        }
        map.end()
    }
}

/// File that could not be checked.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedFile {
    pub identifier: String,
    pub reason: String,
}

/// Report of a whole check suite, keyed by check id.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SuiteReport {
    #[serde(flatten)]
    pub checks: BTreeMap<String, CheckReport>,
    #[serde(skip)]
    pub skipped: Vec<SkippedFile>,
}

impl SuiteReport {
    pub fn check(&self, id: &str) -> Option<&CheckReport> {
        self.checks.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verdict_serialises_with_evidence_key() {
        let at = time::from_epoch_ms(0).unwrap();
        let verdict = Verdict::from_violations(Evidence::InvalidValues(vec![GlucoseViolation {
            timestamp: at,
            glucose_value: 0.5,
        }]));

        assert_eq!(
            serde_json::to_value(&verdict).unwrap(),
            json!({
                "valid": false,
                "invalid_values": [{"timestamp": "1970-01-01T00:00:00.000Z", "glucose_value": 0.5}]
            })
        );
    }

    #[test]
    fn check_report_puts_information_next_to_files() {
        let mut report = CheckReport::new("Required fields exist");
        report.results.insert(
            "a.json".into(),
            Verdict::from_violations(Evidence::MissingFields(vec![])),
        );

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["information"], "Required fields exist");
        assert_eq!(value["a.json"], json!({"valid": true, "missing_fields": []}));
        assert!(report.all_valid());
    }

    #[test]
    fn administration_kind_is_lowercase() {
        assert_eq!(serde_json::to_value(AdministrationKind::Bolus).unwrap(), json!("bolus"));
    }
}
