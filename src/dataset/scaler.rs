//! Reversible per-column min-max scaling.

use crate::error::{PipelineError, Recoverable};
use crate::features::FeatureTable;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Fitted per-column bounds. Fit once on the training rows and apply the
/// same state to every other split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    columns: Vec<String>,
    min: Vec<f64>,
    max: Vec<f64>,
}

pub struct MinMaxScaler;

impl MinMaxScaler {
    pub fn fit(table: &FeatureTable) -> Result<ScalerState, PipelineError> {
        if table.is_empty() {
            return Err(PipelineError::EmptyFit);
        }
        let values = table.values();
        let min = values
            .fold_axis(Axis(0), f64::INFINITY, |acc, v| acc.min(*v))
            .to_vec();
        let max = values
            .fold_axis(Axis(0), f64::NEG_INFINITY, |acc, v| acc.max(*v))
            .to_vec();
        Ok(ScalerState {
            columns: table.columns().to_vec(),
            min,
            max,
        })
    }
}

impl ScalerState {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Result<usize, PipelineError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| PipelineError::UnknownColumn(column.to_string()))
    }

    /// Fitted (min, max) of a column.
    pub fn bounds(&self, column: &str) -> Result<(f64, f64), PipelineError> {
        let j = self.column_index(column)?;
        Ok((self.min[j], self.max[j]))
    }

    /// Columns whose fitted range is empty. They scale to 0.
    pub fn degenerate_columns(&self) -> Vec<Recoverable> {
        self.columns
            .iter()
            .zip(self.min.iter().zip(&self.max))
            .filter(|(_, (lo, hi))| lo == hi)
            .map(|(c, (lo, _))| Recoverable::DegenerateColumn {
                column: c.clone(),
                value: *lo,
            })
            .collect()
    }

    /// Values outside the fitted range map outside [0, 1] unchanged.
    pub fn scale_value(&self, j: usize, v: f64) -> f64 {
        let range = self.max[j] - self.min[j];
        if range == 0.0 {
            0.0
        } else {
            (v - self.min[j]) / range
        }
    }

    pub fn invert_value(&self, j: usize, scaled: f64) -> f64 {
        scaled * (self.max[j] - self.min[j]) + self.min[j]
    }

    pub fn apply(&self, table: &FeatureTable) -> Result<FeatureTable, PipelineError> {
        if table.columns() != self.columns.as_slice() {
            return Err(PipelineError::SchemaMismatch(format!(
                "fitted on {:?}, applied to {:?}",
                self.columns,
                table.columns()
            )));
        }
        let mut values: Array2<f64> = table.values().clone();
        for (j, mut column) in values.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| self.scale_value(j, v));
        }
        Ok(table.with_values(values))
    }

    pub fn invert(&self, scaled: f64, column: &str) -> Result<f64, PipelineError> {
        let j = self.column_index(column)?;
        Ok(self.invert_value(j, scaled))
    }

    /// Map a whole column of scaled values (e.g. predictions) back to
    /// physical units.
    pub fn invert_column(&self, scaled: &[f64], column: &str) -> Result<Vec<f64>, PipelineError> {
        let j = self.column_index(column)?;
        Ok(scaled.iter().map(|s| self.invert_value(j, *s)).collect())
    }
}
