//! Per-source and per-run accounting of what was produced and what was
//! skipped, so data loss is visible at the end of a run.

use crate::error::Recoverable;
use crate::packets::NormalizeStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub path: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub normalize: NormalizeStats,
    pub out_of_order: u64,
    pub keys: usize,
    pub records: usize,
    pub datasets: usize,
    /// Keys that produced no dataset (too little history)
    pub skipped_keys: Vec<String>,
    /// Keys whose processing failed outright
    pub failed_keys: Vec<String>,
    /// `key: column` pairs with zero variance in the training rows
    pub degenerate_columns: Vec<String>,
    pub malformed_threshold_exceeded: bool,
    /// `name -> unique` for artifacts whose name was already taken in the run
    pub renamed_outputs: Vec<String>,
    /// Set when the whole source failed
    pub error: Option<String>,
}

impl SourceReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn failed(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(path)
        }
    }

    /// File a recovered condition met while processing `key`.
    pub fn note(&mut self, key: &str, condition: &Recoverable) {
        match condition {
            Recoverable::EmptyGroup { .. } => self.skipped_keys.push(key.to_string()),
            Recoverable::DegenerateColumn { column, .. } => {
                self.degenerate_columns.push(format!("{key}: {column}"))
            }
            Recoverable::OutOfOrderEvent { .. } => self.out_of_order += 1,
            Recoverable::MalformedEvent(reason) => {
                *self
                    .normalize
                    .malformed
                    .entry(reason.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Flag and warn when the malformed share exceeds `max_ratio`.
    pub fn check_malformed(&mut self, max_ratio: f64) -> bool {
        let ratio = self.normalize.malformed_ratio();
        self.malformed_threshold_exceeded = ratio > max_ratio;
        if self.malformed_threshold_exceeded {
            warn!(
                path = %self.path.display(),
                malformed = self.normalize.malformed_total(),
                seen = self.normalize.seen,
                ratio,
                max_ratio,
                "malformed packet records above threshold"
            );
        }
        self.malformed_threshold_exceeded
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub sources: usize,
    pub failed_sources: usize,
    pub events_seen: u64,
    pub events_accepted: u64,
    pub malformed: u64,
    pub out_of_order: u64,
    pub keys: usize,
    pub records: usize,
    pub datasets: usize,
    pub skipped_keys: usize,
    pub failed_keys: usize,
    pub renamed_outputs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub sources: Vec<SourceReport>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
            sources: Vec::new(),
        }
    }

    pub fn push(&mut self, report: SourceReport) {
        self.sources.push(report);
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn totals(&self) -> RunTotals {
        let mut t = RunTotals {
            sources: self.sources.len(),
            ..Default::default()
        };
        for s in &self.sources {
            if s.error.is_some() {
                t.failed_sources += 1;
            }
            t.events_seen += s.normalize.seen;
            t.events_accepted += s.normalize.accepted;
            t.malformed += s.normalize.malformed_total();
            t.out_of_order += s.out_of_order;
            t.keys += s.keys;
            t.records += s.records;
            t.datasets += s.datasets;
            t.skipped_keys += s.skipped_keys.len();
            t.failed_keys += s.failed_keys.len();
            t.renamed_outputs += s.renamed_outputs.len();
        }
        t
    }

    /// One line per source with losses, then the run totals.
    pub fn log(&self) {
        for s in &self.sources {
            if let Some(err) = &s.error {
                warn!(path = %s.path.display(), error = %err, "source failed");
                continue;
            }
            if s.normalize.malformed_total() > 0 || s.out_of_order > 0 || !s.skipped_keys.is_empty() {
                warn!(
                    path = %s.path.display(),
                    malformed = s.normalize.malformed_total(),
                    out_of_order = s.out_of_order,
                    skipped_keys = ?s.skipped_keys,
                    "source completed with skips"
                );
            }
        }
        let t = self.totals();
        info!(
            run_id = %self.run_id,
            sources = t.sources,
            failed_sources = t.failed_sources,
            events = t.events_seen,
            malformed = t.malformed,
            out_of_order = t.out_of_order,
            keys = t.keys,
            records = t.records,
            datasets = t.datasets,
            skipped_keys = t.skipped_keys,
            renamed_outputs = t.renamed_outputs,
            cancelled = self.cancelled,
            "run summary"
        );
    }
}
