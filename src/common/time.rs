//! Time helpers shared by the normalizer, validators and reports.

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};

/// Normalized absolute time used across the crate.
pub type Instant = DateTime<Utc>;

/// Convert epoch milliseconds into an absolute instant, `None` when out of range.
pub fn from_epoch_ms(ms: i64) -> Option<Instant> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Start of the window of `hours` ending at `end`, clamped to the earliest representable instant.
pub fn hours_before(end: Instant, hours: i64) -> Instant {
    end.checked_sub_signed(Duration::hours(hours))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Render an instant the way reports expect it.
pub fn to_iso(at: &Instant) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_ms_round_trips_through_instant() {
        let at = from_epoch_ms(1_700_000_000_123).unwrap();
        assert_eq!(at.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(to_iso(&at), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn window_start_clamps_near_the_earliest_instant() {
        let end = from_epoch_ms(1_700_000_000_000).unwrap();
        assert_eq!(hours_before(end, 6).timestamp_millis(), 1_700_000_000_000 - 6 * 3_600_000);

        let earliest = DateTime::<Utc>::MIN_UTC;
        assert_eq!(hours_before(earliest, 12), earliest);
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(from_epoch_ms(i64::MAX).is_none());
    }
}
