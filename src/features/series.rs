//! Per-key feature series and their flattening into rectangular tables.

use super::{columns, AggregateRecord, FlowKey};
use crate::error::PipelineError;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::ops::Range;

/// Records of one flow key, strictly increasing in `window_start`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSeries {
    key: FlowKey,
    records: Vec<AggregateRecord>,
}

impl FeatureSeries {
    pub fn new(key: FlowKey, records: Vec<AggregateRecord>) -> Result<Self, PipelineError> {
        if let Some(pair) = records
            .windows(2)
            .find(|pair| pair[1].window_start <= pair[0].window_start)
        {
            return Err(PipelineError::Unordered {
                key: key.to_string(),
                window_start: pair[1].window_start,
            });
        }
        Ok(Self { key, records })
    }

    /// Sort by window start first; duplicate windows are still an error.
    pub fn from_unsorted(key: FlowKey, mut records: Vec<AggregateRecord>) -> Result<Self, PipelineError> {
        records.sort_by_key(|r| r.window_start);
        Self::new(key, records)
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    pub fn records(&self) -> &[AggregateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every protocol label seen anywhere in the series, sorted.
    pub fn protocol_labels(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .flat_map(|r| r.protocol_distribution.labels().map(str::to_string))
            .collect()
    }

    /// Flatten into a numeric table: fixed base columns, optional address
    /// columns, then one zero-filled `Protocol_<label>` column per label.
    pub fn to_table(&self, options: &TableOptions) -> Result<FeatureTable, PipelineError> {
        let labels = self.protocol_labels();
        let mut names: Vec<String> = [
            columns::THROUGHPUT,
            columns::JITTER,
            columns::AVG_PACKET_SIZE,
            columns::PACKET_COUNT,
            columns::DELAY,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        if options.include_addresses {
            names.push(columns::SOURCE_IP.to_string());
            names.push(columns::DESTINATION_IP.to_string());
        }
        names.extend(labels.iter().map(|l| format!("{}{}", columns::PROTOCOL_PREFIX, l)));

        let ncols = names.len();
        let mut flat = Vec::with_capacity(self.records.len() * ncols);
        for r in &self.records {
            flat.extend_from_slice(&[
                r.throughput,
                r.jitter,
                r.avg_packet_size,
                r.packet_count as f64,
                r.delay,
            ]);
            if options.include_addresses {
                flat.push(ip_value(r.source_ip));
                flat.push(ip_value(r.dest_ip));
            }
            flat.extend(labels.iter().map(|l| r.protocol_distribution.get(l)));
        }

        let values = Array2::from_shape_vec((self.records.len(), ncols), flat)
            .map_err(|e| PipelineError::SchemaMismatch(format!("feature rows for {}: {e}", self.key)))?;
        FeatureTable::new(
            names,
            self.records.iter().map(|r| r.window_start).collect(),
            values,
        )
    }
}

/// Absent addresses count as 0.0.0.0.
fn ip_value(ip: Option<IpAddr>) -> f64 {
    match ip {
        Some(IpAddr::V4(v4)) => u32::from(v4) as f64,
        Some(IpAddr::V6(v6)) => u128::from(v6) as f64,
        None => 0.0,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub include_addresses: bool,
}

/// Concatenate each key's records, in emission order, into its series.
pub fn assemble(
    groups: BTreeMap<FlowKey, Vec<AggregateRecord>>,
) -> Result<Vec<FeatureSeries>, PipelineError> {
    groups
        .into_iter()
        .map(|(key, records)| FeatureSeries::new(key, records))
        .collect()
}

/// Rectangular numeric view of a series: one row per window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    columns: Vec<String>,
    window_starts: Vec<i64>,
    values: Array2<f64>,
}

impl FeatureTable {
    pub fn new(
        columns: Vec<String>,
        window_starts: Vec<i64>,
        values: Array2<f64>,
    ) -> Result<Self, PipelineError> {
        if values.ncols() != columns.len() || values.nrows() != window_starts.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "table of shape {:?} for {} columns and {} rows",
                values.dim(),
                columns.len(),
                window_starts.len()
            )));
        }
        Ok(Self {
            columns,
            window_starts,
            values,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Result<usize, PipelineError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::UnknownColumn(name.to_string()))
    }

    pub fn window_starts(&self) -> &[i64] {
        &self.window_starts
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.nrows() == 0
    }

    /// Same schema and window starts, different values.
    pub(crate) fn with_values(&self, values: Array2<f64>) -> Self {
        Self {
            columns: self.columns.clone(),
            window_starts: self.window_starts.clone(),
            values,
        }
    }

    /// Contiguous block of rows.
    pub fn rows(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.nrows());
        let start = range.start.min(end);
        Self {
            columns: self.columns.clone(),
            window_starts: self.window_starts[start..end].to_vec(),
            values: self.values.slice(s![start..end, ..]).to_owned(),
        }
    }

    /// Rows at or before `first + (last - first) * ratio` seconds, and the rest.
    pub fn split_at_time(&self, ratio: f64) -> (Self, Self) {
        let (Some(first), Some(last)) = (self.window_starts.first(), self.window_starts.last())
        else {
            return (self.clone(), self.clone());
        };
        let cut = *first as f64 + (*last - *first) as f64 * ratio;
        let idx = self.window_starts.partition_point(|t| (*t as f64) <= cut);
        (self.rows(0..idx), self.rows(idx..self.nrows()))
    }
}
