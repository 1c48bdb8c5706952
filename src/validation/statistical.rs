//! Statistical completeness and consistency checks.

use serde_json::Value;

use crate::common::time::{self, Instant};
use crate::data::domain::{Channel, Episode, REQUIRED_EPISODE_FIELDS};

use super::domain::{Check, CheckInput, Evidence, MeasurementWindow, Verdict, ZeroInfusionPeriod};

/// Trailing window, in hours, inspected by the measurement density check.
pub const DENSITY_WINDOW_HOURS: i64 = 6;
/// Minimum glucose readings expected inside that window.
pub const MIN_RECENT_MEASUREMENTS: usize = 3;

const VALID_DIABETIC_STATUSES: [f64; 3] = [0.0, 1.0, 2.0];

/// The statistical-analysis suite in report order.
pub fn checks() -> Vec<Check> {
    vec![
        Check {
            id: "check_1",
            information: "Required fields exist (diabeticStatus, startTime, bloodGlucose, \
                          insulinInfusion, insulinBolus, nutritionInfusion, nutritionBolus)",
            run: required_fields,
        },
        Check {
            id: "check_2",
            information: "Both IV insulin and nutrition rates cannot be null at the same time",
            run: non_simultaneous_zero_infusion,
        },
        Check {
            id: "check_3",
            information: "diabeticStatus has a valid value (0,1,2)",
            run: diabetic_status,
        },
        Check {
            id: "check_4",
            information: "At least 3 blood glucose measurements in the last 6 hours",
            run: measurement_density,
        },
    ]
}

/// All seven episode fields present in every episode.
pub fn required_fields(input: &CheckInput<'_>) -> Verdict {
    let episodes = input.raw.episodes();
    if episodes.is_empty() {
        return Verdict::from_violations(Evidence::MissingFields(vec!["episodes".to_string()]));
    }

    let mut missing: Vec<String> = Vec::new();
    for episode in episodes {
        for field in REQUIRED_EPISODE_FIELDS {
            if !episode.has_field(field) && !missing.iter().any(|m| m == field) {
                missing.push(field.to_string());
            }
        }
    }

    Verdict::from_violations(Evidence::MissingFields(missing))
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum InfusionStream {
    Insulin,
    Nutrition,
}

/// Insulin and nutrition IV rates must never both be zero at the same time.
///
/// Both infusion series are merged into one timeline ordered by timestamp.
/// At equal timestamps insulin events come before nutrition events, and
/// events of the same stream keep their source order.
pub fn non_simultaneous_zero_infusion(input: &CheckInput<'_>) -> Verdict {
    let periods = input
        .record
        .episodes
        .iter()
        .flat_map(zero_infusion_periods)
        .collect();

    Verdict::from_violations(Evidence::InvalidPeriods(periods))
}

fn zero_infusion_periods(episode: &Episode) -> Vec<ZeroInfusionPeriod> {
    let mut timeline: Vec<(Instant, InfusionStream, f64)> = episode
        .doses(Channel::InsulinInfusion)
        .map(|(at, dose)| (at, InfusionStream::Insulin, dose.rate_or_zero()))
        .chain(
            episode
                .doses(Channel::NutritionInfusion)
                .map(|(at, dose)| (at, InfusionStream::Nutrition, dose.rate_or_zero())),
        )
        .collect();
    timeline.sort_by_key(|(at, _, _)| *at);

    let mut insulin_rate = 0.0;
    let mut nutrition_rate = 0.0;
    let mut periods = Vec::new();

    for (timestamp, stream, rate) in timeline {
        match stream {
            InfusionStream::Insulin => insulin_rate = rate,
            InfusionStream::Nutrition => nutrition_rate = rate,
        }
        if insulin_rate == 0.0 && nutrition_rate == 0.0 {
            periods.push(ZeroInfusionPeriod {
                timestamp,
                insulin_rate,
                nutrition_rate,
            });
        }
    }
    periods
}

/// Any present `diabeticStatus` must be 0, 1 or 2; an explicit `null` is reported.
pub fn diabetic_status(input: &CheckInput<'_>) -> Verdict {
    let invalid = input
        .raw
        .episodes()
        .iter()
        .filter_map(|episode| episode.diabetic_status.as_ref())
        .filter(|status| !is_valid_status(status))
        .cloned()
        .collect();

    Verdict::from_violations(Evidence::InvalidStatuses(invalid))
}

fn is_valid_status(status: &Value) -> bool {
    status
        .as_f64()
        .map_or(false, |code| VALID_DIABETIC_STATUSES.contains(&code))
}

/// At least three glucose readings in the six hours up to each episode's last reading.
///
/// Episodes without glucose readings produce no window entry and do not fail.
pub fn measurement_density(input: &CheckInput<'_>) -> Verdict {
    let windows: Vec<MeasurementWindow> = input
        .record
        .episodes
        .iter()
        .filter_map(|episode| {
            let window_end = episode.last_glucose_time()?;
            let window_start = time::hours_before(window_end, DENSITY_WINDOW_HOURS);
            let count = episode
                .glucose_readings()
                .filter(|(at, _)| *at >= window_start && *at <= window_end)
                .count();
            Some(MeasurementWindow {
                window_start,
                window_end,
                count,
            })
        })
        .collect();

    let valid = windows.iter().all(|w| w.count >= MIN_RECENT_MEASUREMENTS);
    Verdict {
        valid,
        evidence: Evidence::MeasurementCounts(windows),
    }
}
