//! JSON file helpers used by the report writers.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::error::{EvalError, EvalResult};

/// Read and deserialize a JSON document; parse failures surface as `MalformedRecord`.
pub fn load<T: DeserializeOwned>(path: &Path) -> EvalResult<T> {
    let text = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&text)
        .map_err(|e| EvalError::malformed(format!("{}: {e}", path.display())))
}

/// Write a value as pretty-printed JSON, creating parent directories as needed.
pub fn save<T: Serialize + ?Sized>(value: &T, path: &Path) -> EvalResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).map_err(|e| EvalError::io(path, e))
}

/// Round to a fixed number of decimals for report rendering.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
