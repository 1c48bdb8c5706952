//! Patient record definitions, raw and normalized.
//!
//! `RawRecord` mirrors the JSON files one-to-one (integer epoch-millisecond
//! timestamps, unknown keys kept) so it can be forwarded to the prediction
//! endpoint untouched. `PatientRecord` is the normalized view the validators
//! reason about: absolute timestamps and payloads typed per channel.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::common::time::Instant;

/// Route code for subcutaneous insulin delivery.
pub const SUBCUTANEOUS_ROUTE: i64 = 1;

/// Episode fields every complete record carries.
pub const REQUIRED_EPISODE_FIELDS: [&str; 7] = [
    "diabeticStatus",
    "startTime",
    "bloodGlucose",
    "insulinInfusion",
    "insulinBolus",
    "nutritionInfusion",
    "nutritionBolus",
];

/// One raw event tuple: `[timestampMs, payload, ...]`.
pub type RawEvent = Vec<Value>;

/// A raw field: `None` when the key is absent, `Some(None)` when it is an explicit `null`.
pub type Nullable<T> = Option<Option<T>>;

/// A patient record exactly as loaded from disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "__class", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub class: Nullable<String>,
    #[serde(rename = "hospitalID", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub hospital_id: Nullable<String>,
    #[serde(rename = "updateTime", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub update_time: Nullable<i64>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub episodes: Nullable<Vec<RawEpisode>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One care period as loaded from disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEpisode {
    /// `Some(Value::Null)` for an explicit `null`.
    #[serde(rename = "diabeticStatus", default, deserialize_with = "present_value", skip_serializing_if = "Option::is_none")]
    pub diabetic_status: Option<Value>,
    #[serde(rename = "startTime", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub start_time: Nullable<i64>,
    #[serde(rename = "bloodGlucose", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub blood_glucose: Nullable<Vec<RawEvent>>,
    #[serde(rename = "insulinInfusion", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub insulin_infusion: Nullable<Vec<RawEvent>>,
    #[serde(rename = "insulinBolus", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub insulin_bolus: Nullable<Vec<RawEvent>>,
    #[serde(rename = "nutritionInfusion", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub nutrition_infusion: Nullable<Vec<RawEvent>>,
    #[serde(rename = "nutritionBolus", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub nutrition_bolus: Nullable<Vec<RawEvent>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Only called for keys that are present, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Nullable<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn value_of<T>(field: &Nullable<T>) -> Option<&T> {
    field.as_ref().and_then(Option::as_ref)
}

impl RawRecord {
    /// Episodes in file order; a missing or null `episodes` key reads as none.
    pub fn episodes(&self) -> &[RawEpisode] {
        value_of(&self.episodes).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn hospital(&self) -> Option<&str> {
        value_of(&self.hospital_id).map(String::as_str)
    }

    /// `updateTime` in epoch ms, `None` when absent or null.
    pub fn update_time_ms(&self) -> Option<i64> {
        value_of(&self.update_time).copied()
    }
}

impl RawEpisode {
    /// Raw events of a channel, `None` when the key is absent or null.
    pub fn series(&self, channel: Channel) -> Option<&[RawEvent]> {
        let field = match channel {
            Channel::BloodGlucose => &self.blood_glucose,
            Channel::InsulinInfusion => &self.insulin_infusion,
            Channel::InsulinBolus => &self.insulin_bolus,
            Channel::NutritionInfusion => &self.nutrition_infusion,
            Channel::NutritionBolus => &self.nutrition_bolus,
        };
        value_of(field).map(Vec::as_slice)
    }

    pub fn start_time_ms(&self) -> Option<i64> {
        value_of(&self.start_time).copied()
    }

    /// Whether the named episode key is present, `null` included.
    pub fn has_field(&self, name: &str) -> bool {
        match name {
            "diabeticStatus" => self.diabetic_status.is_some(),
            "startTime" => self.start_time.is_some(),
            "bloodGlucose" => self.blood_glucose.is_some(),
            "insulinInfusion" => self.insulin_infusion.is_some(),
            "insulinBolus" => self.insulin_bolus.is_some(),
            "nutritionInfusion" => self.nutrition_infusion.is_some(),
            "nutritionBolus" => self.nutrition_bolus.is_some(),
            other => self.extra.contains_key(other),
        }
    }
}

/// Named time series inside an episode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Channel {
    BloodGlucose,
    InsulinInfusion,
    InsulinBolus,
    NutritionInfusion,
    NutritionBolus,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::BloodGlucose,
        Channel::InsulinInfusion,
        Channel::InsulinBolus,
        Channel::NutritionInfusion,
        Channel::NutritionBolus,
    ];

    /// JSON key of the channel.
    pub fn field_name(&self) -> &'static str {
        match self {
            Channel::BloodGlucose => "bloodGlucose",
            Channel::InsulinInfusion => "insulinInfusion",
            Channel::InsulinBolus => "insulinBolus",
            Channel::NutritionInfusion => "nutritionInfusion",
            Channel::NutritionBolus => "nutritionBolus",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.field_name() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A timestamped observation. Timestamp-only tuples carry no payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Event<P> {
    pub at: Instant,
    pub payload: Option<P>,
}

/// Ordered events of one channel, in source order (not necessarily sorted).
pub type TimeSeries<P> = Vec<Event<P>>;

/// Payload of insulin and nutrition infusion/bolus events.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dose {
    pub rate: Option<f64>,
    pub route: Option<i64>,
    pub extra: Map<String, Value>,
}

impl Dose {
    /// Rate with missing or null treated as zero.
    pub fn rate_or_zero(&self) -> f64 {
        self.rate.unwrap_or(0.0)
    }

    pub fn is_subcutaneous(&self) -> bool {
        self.route == Some(SUBCUTANEOUS_ROUTE)
    }
}

/// Normalized care period.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Episode {
    pub diabetic_status: Option<Value>,
    pub start_time: Option<Instant>,
    pub blood_glucose: Option<TimeSeries<f64>>,
    pub insulin_infusion: Option<TimeSeries<Dose>>,
    pub insulin_bolus: Option<TimeSeries<Dose>>,
    pub nutrition_infusion: Option<TimeSeries<Dose>>,
    pub nutrition_bolus: Option<TimeSeries<Dose>>,
    pub extra: Map<String, Value>,
}

impl Episode {
    /// Glucose readings that carry a value.
    pub fn glucose_readings(&self) -> impl Iterator<Item = (Instant, f64)> + '_ {
        self.blood_glucose
            .iter()
            .flatten()
            .filter_map(|e| e.payload.map(|v| (e.at, v)))
    }

    /// Latest glucose timestamp regardless of source order.
    pub fn last_glucose_time(&self) -> Option<Instant> {
        self.glucose_readings().map(|(at, _)| at).max()
    }

    /// Dose events of a dose channel that carry a payload.
    pub fn doses(&self, channel: Channel) -> impl Iterator<Item = (Instant, &Dose)> + '_ {
        let series = match channel {
            Channel::BloodGlucose => None,
            Channel::InsulinInfusion => self.insulin_infusion.as_ref(),
            Channel::InsulinBolus => self.insulin_bolus.as_ref(),
            Channel::NutritionInfusion => self.nutrition_infusion.as_ref(),
            Channel::NutritionBolus => self.nutrition_bolus.as_ref(),
        };
        series
            .into_iter()
            .flatten()
            .filter_map(|e| e.payload.as_ref().map(|d| (e.at, d)))
    }
}

/// Normalized patient record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatientRecord {
    pub class: Option<String>,
    pub hospital_id: Option<String>,
    pub update_time: Option<Instant>,
    pub episodes: Vec<Episode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_channel_differs_from_empty_channel() {
        let raw: RawRecord = serde_json::from_value(json!({
            "episodes": [{"bloodGlucose": [], "startTime": 0}]
        }))
        .unwrap();
        let episode = &raw.episodes()[0];

        assert!(episode.has_field("bloodGlucose"));
        assert!(!episode.has_field("insulinBolus"));
        assert_eq!(episode.series(Channel::BloodGlucose).map(<[_]>::len), Some(0));
        assert!(episode.series(Channel::InsulinBolus).is_none());
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let source = json!({
            "__class": "Patient",
            "hospitalID": "H1",
            "updateTime": 1000,
            "ward": "ICU",
            "episodes": [{"startTime": 5, "note": "x", "bloodGlucose": [[10, 5.5]]}]
        });
        let raw: RawRecord = serde_json::from_value(source.clone()).unwrap();

        assert_eq!(raw.extra["ward"], "ICU");
        assert_eq!(serde_json::to_value(&raw).unwrap(), source);
    }

    #[test]
    fn explicit_null_is_present_but_valueless() {
        let source = json!({
            "__class": "Patient",
            "hospitalID": null,
            "updateTime": null,
            "episodes": [{"diabeticStatus": null, "startTime": null, "insulinBolus": null}]
        });
        let raw: RawRecord = serde_json::from_value(source.clone()).unwrap();
        let episode = &raw.episodes()[0];

        assert_eq!(raw.hospital_id, Some(None));
        assert_eq!(raw.hospital(), None);
        assert_eq!(raw.update_time_ms(), None);
        assert_eq!(episode.diabetic_status, Some(Value::Null));
        assert!(episode.has_field("diabeticStatus"));
        assert!(episode.has_field("startTime"));
        assert!(episode.has_field("insulinBolus"));
        assert!(!episode.has_field("bloodGlucose"));
        assert!(episode.series(Channel::InsulinBolus).is_none());
        assert_eq!(serde_json::to_value(&raw).unwrap(), source);
    }

    #[test]
    fn channel_names_resolve_both_ways() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_field_name(channel.field_name()), Some(channel));
        }
        assert_eq!(Channel::from_field_name("startTime"), None);
    }
}
