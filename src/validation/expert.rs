//! Expert-knowledge checks: physiological plausibility of the synthetic records.

use crate::common::time;
use crate::data::domain::Channel;

use super::domain::{
    AdministrationKind, Check, CheckInput, Evidence, GlucoseViolation, InsulinAdministration, Verdict,
};

/// Humanly plausible blood glucose range in mmol/L, inclusive.
pub const GLUCOSE_MIN: f64 = 1.2;
pub const GLUCOSE_MAX: f64 = 110.0;

/// Lookback before the last glucose reading in which subcutaneous insulin is not allowed.
pub const SUBCUTANEOUS_LOOKBACK_HOURS: i64 = 12;

/// The expert-knowledge suite in report order.
pub fn checks() -> Vec<Check> {
    vec![
        Check {
            id: "criterion_1",
            information: "The valid humanly plausible ranges for blood glucose are [1.2, 110] mmol/L \
                          according to Barry (2020) and Manappallil (2017)",
            run: plausible_range,
        },
        Check {
            id: "criterion_2",
            information: "According to Walsh et. al. (2014), subcutaneous insulin may not have been \
                          administered in the last 6 hours prior the period considered (so 12hours \
                          before the time of evaluation)",
            run: recent_subcutaneous_insulin,
        },
    ]
}

/// Every glucose value must lie in `[GLUCOSE_MIN, GLUCOSE_MAX]`.
pub fn plausible_range(input: &CheckInput<'_>) -> Verdict {
    let violations = input
        .record
        .episodes
        .iter()
        .flat_map(|episode| episode.glucose_readings())
        .filter(|(_, value)| !(GLUCOSE_MIN..=GLUCOSE_MAX).contains(value))
        .map(|(timestamp, glucose_value)| GlucoseViolation {
            timestamp,
            glucose_value,
        })
        .collect();

    Verdict::from_violations(Evidence::InvalidValues(violations))
}

/// No subcutaneous insulin in the 12 hours up to each episode's last glucose reading.
pub fn recent_subcutaneous_insulin(input: &CheckInput<'_>) -> Verdict {
    let mut violations = Vec::new();

    for episode in &input.record.episodes {
        let Some(window_end) = episode.last_glucose_time() else {
            continue;
        };
        let window_start = time::hours_before(window_end, SUBCUTANEOUS_LOOKBACK_HOURS);

        for (channel, kind) in [
            (Channel::InsulinInfusion, AdministrationKind::Infusion),
            (Channel::InsulinBolus, AdministrationKind::Bolus),
        ] {
            violations.extend(
                episode
                    .doses(channel)
                    .filter(|(at, dose)| *at >= window_start && *at <= window_end && dose.is_subcutaneous())
                    .map(|(timestamp, dose)| InsulinAdministration {
                        timestamp,
                        kind,
                        route: dose.route.unwrap_or_default(),
                    }),
            );
        }
    }

    Verdict::from_violations(Evidence::InvalidAdministrations(violations))
}
