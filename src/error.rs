//! Error types. `PipelineError` aborts the operation that returned it;
//! `Recoverable` is counted, reported and then skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Structural failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input {path}: {reason}")]
    Source { path: PathBuf, reason: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("series {key} is not strictly increasing at window {window_start}")]
    Unordered { key: String, window_start: i64 },

    #[error("scaler schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("cannot fit a scaler on an empty table")]
    EmptyFit,

    #[error("unknown column {0:?}")]
    UnknownColumn(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn source(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Source {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Why a packet record could not become an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MalformedReason {
    MissingTimestamp,
    NonFiniteTimestamp,
    MissingLength,
    NegativeLength,
    Unparseable,
}

impl MalformedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedReason::MissingTimestamp => "missing_timestamp",
            MalformedReason::NonFiniteTimestamp => "non_finite_timestamp",
            MalformedReason::MissingLength => "missing_length",
            MalformedReason::NegativeLength => "negative_length",
            MalformedReason::Unparseable => "unparseable",
        }
    }
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local conditions that never abort a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Recoverable {
    #[error("malformed packet record: {0}")]
    MalformedEvent(MalformedReason),

    #[error("group {key} has {records} records, needs at least {needed}")]
    EmptyGroup {
        key: String,
        records: usize,
        needed: usize,
    },

    #[error("column {column:?} is constant ({value}), scaled to 0")]
    DegenerateColumn { column: String, value: f64 },

    #[error("packet at {timestamp} precedes last seen {last_seen}")]
    OutOfOrderEvent { timestamp: f64, last_seen: f64 },
}
