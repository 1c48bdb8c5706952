//! Logging utilities emitting JSON lines through `tracing`.

use tracing_subscriber::EnvFilter;

use crate::common::error::EvalCode;

/// Install the global JSON-lines subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Calling this twice is harmless:
/// the second installation attempt is ignored.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(false)
        .try_init();
}

/// Record the completion of a pipeline stage with its outcome code and duration.
pub fn log_event(module: &str, event: &str, code: EvalCode, dur_ms: u128) {
    if code == EvalCode::Ok {
        tracing::info!(module, event, code = code as u32, dur_ms = dur_ms as u64, "stage completed");
    } else {
        tracing::warn!(module, event, code = code as u32, dur_ms = dur_ms as u64, "stage failed");
    }
}
