//! Post-market evaluation of synthetic glucose-management data.
//!
//! `validation` runs the rule suites, `inference` talks to the prediction
//! endpoint and `evaluation` turns predictions into comparison reports.

pub mod common;
pub mod data;
pub mod evaluation;
pub mod inference;
pub mod validation;

pub use common::{EvalCode, EvalError, EvalResult};
