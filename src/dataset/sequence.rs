//! Sliding fixed-length windows over a scaled table.

use crate::error::PipelineError;
use crate::features::FeatureTable;
use ndarray::{s, Array1, Array3};
use serde::{Deserialize, Serialize};

/// Input sequences `[pairs, length, features]` with one label per sequence,
/// in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSet {
    pub inputs: Array3<f64>,
    pub labels: Array1<f64>,
    /// Window start of each label row
    pub label_windows: Vec<i64>,
}

impl SequenceSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.inputs.dim().1
    }

    /// First `k` pairs and the remainder; order is kept, nothing is shuffled.
    pub fn split_at(&self, k: usize) -> (Self, Self) {
        let k = k.min(self.len());
        let head = Self {
            inputs: self.inputs.slice(s![..k, .., ..]).to_owned(),
            labels: self.labels.slice(s![..k]).to_owned(),
            label_windows: self.label_windows[..k].to_vec(),
        };
        let tail = Self {
            inputs: self.inputs.slice(s![k.., .., ..]).to_owned(),
            labels: self.labels.slice(s![k..]).to_owned(),
            label_windows: self.label_windows[k..].to_vec(),
        };
        (head, tail)
    }
}

/// `max(0, rows - length)` pairs: rows `i..i+length` (all columns) and the
/// target value at row `i+length`. Too short a table yields an empty set.
pub fn window(table: &FeatureTable, length: usize, target: &str) -> Result<SequenceSet, PipelineError> {
    let target = table.column_index(target)?;
    let values = table.values();
    let count = table.nrows().saturating_sub(length);
    let inputs = Array3::from_shape_fn((count, length, table.ncols()), |(i, t, j)| {
        values[[i + t, j]]
    });
    let labels = Array1::from_shape_fn(count, |i| values[[i + length, target]]);
    let label_windows = table.window_starts()[length.min(table.nrows())..].to_vec();
    Ok(SequenceSet {
        inputs,
        labels,
        label_windows,
    })
}

/// Number of leading pairs that form the training split.
pub fn train_len(pairs: usize, train_ratio: f64) -> usize {
    ((pairs as f64) * train_ratio).floor() as usize
}

/// Prefix/suffix split of the pairs by ratio.
pub fn temporal_split(set: &SequenceSet, train_ratio: f64) -> (SequenceSet, SequenceSet) {
    set.split_at(train_len(set.len(), train_ratio))
}
