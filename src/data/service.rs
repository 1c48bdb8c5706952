//! Normalisation of raw records into their time-typed form.
//!
//! Normalisation never mutates its input: it borrows the raw record and
//! builds a fresh `PatientRecord`, so validators and prediction jobs can share
//! the same raw value across threads.

use serde_json::Value;

use crate::common::error::{EvalError, EvalResult};
use crate::common::time::{self, Instant};

use super::domain::{Channel, Dose, Episode, Event, PatientRecord, RawEpisode, RawEvent, RawRecord, TimeSeries};

/// Anything that can be brought into normalized form.
pub trait Normalize {
    fn normalize(&self) -> EvalResult<PatientRecord>;
}

impl Normalize for RawRecord {
    fn normalize(&self) -> EvalResult<PatientRecord> {
        normalize(self)
    }
}

impl Normalize for PatientRecord {
    /// Already normalized: converting again must not drift.
    fn normalize(&self) -> EvalResult<PatientRecord> {
        Ok(self.clone())
    }
}

/// Convert every timestamp of a raw record into an absolute instant.
///
/// Payloads that do not fit their channel's shape are kept as payload-less
/// events; only an event without a timestamp fails the record.
pub fn normalize(raw: &RawRecord) -> EvalResult<PatientRecord> {
    let episodes = raw
        .episodes()
        .iter()
        .enumerate()
        .map(|(idx, episode)| normalize_episode(idx, episode))
        .collect::<EvalResult<Vec<_>>>()?;

    Ok(PatientRecord {
        class: raw.class.clone().flatten(),
        hospital_id: raw.hospital_id.clone().flatten(),
        update_time: raw
            .update_time_ms()
            .map(|ms| instant(ms, "updateTime"))
            .transpose()?,
        episodes,
    })
}

/// Timestamp (epoch ms) and value of the final glucose event of the first episode.
///
/// This is the point the prediction model is asked to forecast.
pub fn prediction_target(record: &PatientRecord) -> EvalResult<(i64, f64)> {
    let episode = record
        .episodes
        .first()
        .ok_or_else(|| EvalError::malformed("record has no episodes"))?;
    let last = episode
        .blood_glucose
        .as_ref()
        .and_then(|series| series.last())
        .ok_or_else(|| EvalError::malformed("first episode has no glucose events"))?;
    let value = last
        .payload
        .ok_or_else(|| EvalError::malformed("final glucose event has no numeric value"))?;

    Ok((last.at.timestamp_millis(), value))
}

/// Same target as [`prediction_target`], read from the raw record.
///
/// Only the first episode's glucose channel has to be well formed.
pub fn raw_prediction_target(raw: &RawRecord) -> EvalResult<(i64, f64)> {
    let episode = raw
        .episodes()
        .first()
        .ok_or_else(|| EvalError::malformed("record has no episodes"))?;
    let glucose = series(episode, 0, Channel::BloodGlucose, parse_glucose)?.unwrap_or_default();

    prediction_target(&PatientRecord {
        episodes: vec![Episode {
            blood_glucose: Some(glucose),
            ..Episode::default()
        }],
        ..PatientRecord::default()
    })
}

fn normalize_episode(idx: usize, raw: &RawEpisode) -> EvalResult<Episode> {
    Ok(Episode {
        diabetic_status: raw.diabetic_status.clone(),
        start_time: raw
            .start_time_ms()
            .map(|ms| instant(ms, "startTime"))
            .transpose()?,
        blood_glucose: series(raw, idx, Channel::BloodGlucose, parse_glucose)?,
        insulin_infusion: series(raw, idx, Channel::InsulinInfusion, parse_dose)?,
        insulin_bolus: series(raw, idx, Channel::InsulinBolus, parse_dose)?,
        nutrition_infusion: series(raw, idx, Channel::NutritionInfusion, parse_dose)?,
        nutrition_bolus: series(raw, idx, Channel::NutritionBolus, parse_dose)?,
        extra: raw.extra.clone(),
    })
}

fn series<P>(
    raw: &RawEpisode,
    episode: usize,
    channel: Channel,
    parse: fn(&Value) -> Option<P>,
) -> EvalResult<Option<TimeSeries<P>>> {
    raw.series(channel)
        .map(|events| {
            events
                .iter()
                .enumerate()
                .map(|(pos, ev)| {
                    event(ev, parse).map_err(|why| {
                        EvalError::malformed(format!("episode {episode}, {channel}[{pos}]: {why}"))
                    })
                })
                .collect::<EvalResult<TimeSeries<P>>>()
        })
        .transpose()
}

fn event<P>(raw: &RawEvent, parse: fn(&Value) -> Option<P>) -> Result<Event<P>, String> {
    let (ts, rest) = raw
        .split_first()
        .ok_or_else(|| "event has no elements".to_string())?;
    let ms = as_integer(ts).ok_or_else(|| format!("timestamp {ts} is not an integer"))?;
    let at = time::from_epoch_ms(ms).ok_or_else(|| format!("timestamp {ms} out of range"))?;
    let payload = match rest.first() {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = parse(value);
            if parsed.is_none() {
                tracing::debug!(%value, "payload does not fit its channel, kept without value");
            }
            parsed
        }
    };
    Ok(Event { at, payload })
}

fn parse_glucose(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Object payloads only. A non-numeric `rate` or non-integer `route` reads as unset.
fn parse_dose(value: &Value) -> Option<Dose> {
    let fields = value.as_object()?;

    let rate = fields.get("rate").and_then(Value::as_f64);
    let route = fields.get("route").and_then(as_integer);
    let extra = fields
        .iter()
        .filter(|(key, _)| key.as_str() != "rate" && key.as_str() != "route")
        .map(|(key, v)| (key.clone(), v.clone()))
        .collect();

    Some(Dose { rate, route, extra })
}

fn instant(ms: i64, field: &str) -> EvalResult<Instant> {
    time::from_epoch_ms(ms)
        .ok_or_else(|| EvalError::malformed(format!("{field} {ms} out of range")))
}

/// Integers, or floats with no fractional part.
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
