//! Error handling primitives shared across the core.
//!
//! Every failure that can happen while evaluating a single file maps onto one
//! of these variants so that the batch runners can turn it into data instead
//! of aborting.

use std::path::PathBuf;

use thiserror::Error;

/// Stable error codes reported in logs and batch summaries.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EvalCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Input file could not be parsed or is structurally incomplete.
    MalformedRecord = 1,
    /// Precondition on the record or prediction time violated.
    InvalidInput = 2,
    /// Remote endpoint unreachable after exhausting retries.
    UpstreamUnavailable = 3,
    /// Remote endpoint answered outside its contract.
    InvalidResponse = 4,
    /// Input directory missing or unreadable.
    DirectoryUnavailable = 5,
    /// Catch-all for filesystem and serialisation failures.
    Internal = 6,
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("prediction endpoint unavailable after {attempts} attempt(s): {detail}")]
    UpstreamUnavailable { attempts: u32, detail: String },

    #[error("invalid response from prediction endpoint: {0}")]
    InvalidResponse(String),

    #[error("directory {path} is not accessible: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot set up http client: {0}")]
    HttpClient(String),

    #[error("serialisation failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Malformed input helper.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Contract violation helper.
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Machine readable code for this error.
    pub fn code(&self) -> EvalCode {
        match self {
            EvalError::MalformedRecord(_) => EvalCode::MalformedRecord,
            EvalError::InvalidInput(_) => EvalCode::InvalidInput,
            EvalError::UpstreamUnavailable { .. } => EvalCode::UpstreamUnavailable,
            EvalError::InvalidResponse(_) => EvalCode::InvalidResponse,
            EvalError::DirectoryUnavailable { .. } => EvalCode::DirectoryUnavailable,
            EvalError::Io { .. } | EvalError::HttpClient(_) | EvalError::Serialization(_) => EvalCode::Internal,
        }
    }

    /// Whether the failure is confined to one file and the batch may continue.
    pub fn is_per_file(&self) -> bool {
        !matches!(self, EvalError::DirectoryUnavailable { .. } | EvalError::HttpClient(_))
    }
}
