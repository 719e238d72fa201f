//! Run reporting: skipped events, skipped keys and produced artifacts.

mod summary;

pub use summary::{RunSummary, RunTotals, SourceReport};
