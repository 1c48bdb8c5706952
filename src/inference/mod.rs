//! Prediction client for the remote glucose-range endpoint.
//!
//! `service` validates input and drives the retried exchange, `http` is the
//! production transport and `workers` runs blocking jobs side by side.

pub mod domain;
pub mod http;
pub mod retry;
pub mod service;
pub mod workers;

pub use domain::{PredictionInterval, PredictionTransport, RetryPolicy, TransportError};
pub use http::HttpTransport;
pub use service::{is_inside, PredictionClient};
pub use workers::Pool;
