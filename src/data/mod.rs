//! Data domain: patient records, loading and time normalisation.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Channel, Dose, Episode, Event, Nullable, PatientRecord, RawEpisode, RawRecord, TimeSeries};
pub use repo_fs::RecordDir;
pub use service::{normalize, raw_prediction_target, Normalize};
