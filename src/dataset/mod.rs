//! Feature series -> scaled (sequence, label) datasets for an external
//! sequence model, with the scaler state needed to invert its predictions.

mod scaler;
mod sequence;

pub use scaler::{MinMaxScaler, ScalerState};
pub use sequence::{temporal_split, train_len, window, SequenceSet};

use crate::config::{SequenceConfig, SplitStrategy};
use crate::error::{PipelineError, Recoverable};
use crate::features::{FeatureSeries, TableOptions};
use serde::{Deserialize, Serialize};

/// Everything a modeling component needs for one flow key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub key: String,
    pub columns: Vec<String>,
    pub target: String,
    pub sequence_length: usize,
    pub scaler: ScalerState,
    pub train: SequenceSet,
    pub test: SequenceSet,
}

/// A dataset, or the reason the key contributed none, plus any recovered
/// conditions met while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub dataset: Option<Dataset>,
    pub notes: Vec<Recoverable>,
}

#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    length: usize,
    train_ratio: f64,
    target: String,
    split: SplitStrategy,
    table: TableOptions,
}

impl DatasetBuilder {
    pub fn new(config: &SequenceConfig) -> Self {
        Self {
            length: config.length,
            train_ratio: config.train_ratio,
            target: config.target.clone(),
            split: config.split,
            table: TableOptions {
                include_addresses: config.include_addresses,
            },
        }
    }

    /// Smallest series that yields at least one training pair.
    pub fn min_records(&self) -> usize {
        if self.train_ratio <= 0.0 {
            return usize::MAX;
        }
        // ceil(1 / ratio), nudged by one where rounding lands it off
        let mut pairs = (1.0 / self.train_ratio).ceil().max(1.0) as usize;
        if pairs > 1 && train_len(pairs - 1, self.train_ratio) >= 1 {
            pairs -= 1;
        } else if train_len(pairs, self.train_ratio) == 0 {
            pairs = pairs.saturating_add(1);
        }
        self.length.saturating_add(pairs)
    }

    pub fn build(&self, series: &FeatureSeries) -> Result<BuildOutcome, PipelineError> {
        let table = series.to_table(&self.table)?;
        table.column_index(&self.target)?;

        let skipped = |records: usize| BuildOutcome {
            dataset: None,
            notes: vec![Recoverable::EmptyGroup {
                key: series.key().to_string(),
                records,
                needed: self.min_records(),
            }],
        };

        let (scaler, train, test) = match self.split {
            SplitStrategy::Sequences => {
                let pairs = table.nrows().saturating_sub(self.length);
                let k = train_len(pairs, self.train_ratio);
                if k == 0 {
                    return Ok(skipped(table.nrows()));
                }
                // rows feeding the first k pairs, labels included
                let scaler = MinMaxScaler::fit(&table.rows(0..k + self.length))?;
                let all = window(&scaler.apply(&table)?, self.length, &self.target)?;
                let (train, test) = all.split_at(k);
                (scaler, train, test)
            }
            SplitStrategy::Time => {
                let (train_rows, test_rows) = table.split_at_time(self.train_ratio);
                if train_rows.nrows() <= self.length {
                    return Ok(skipped(train_rows.nrows()));
                }
                let scaler = MinMaxScaler::fit(&train_rows)?;
                let train = window(&scaler.apply(&train_rows)?, self.length, &self.target)?;
                let test = window(&scaler.apply(&test_rows)?, self.length, &self.target)?;
                (scaler, train, test)
            }
        };

        let notes = scaler.degenerate_columns();
        Ok(BuildOutcome {
            dataset: Some(Dataset {
                key: series.key().to_string(),
                columns: table.columns().to_vec(),
                target: self.target.clone(),
                sequence_length: self.length,
                scaler,
                train,
                test,
            }),
            notes,
        })
    }
}

/// Mean squared error of predictions against labels; `None` when the
/// lengths differ or there is nothing to compare.
pub fn mean_squared_error(predictions: &[f64], labels: &[f64]) -> Option<f64> {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return None;
    }
    let sum: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - y).powi(2))
        .sum();
    Some(sum / predictions.len() as f64)
}
