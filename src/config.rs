//! Pipeline configuration, loaded from JSON.

use crate::error::PipelineError;
use crate::features::KeyField;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory walked for packet sources (or feature CSVs)
    pub input_dir: PathBuf,
    /// Where feature CSVs, datasets and the run summary are written
    pub output_dir: PathBuf,
    pub input_kind: InputKind,
    /// Tumbling window aggregation
    pub window: WindowConfig,
    /// Flow-key projection
    pub grouping: GroupingConfig,
    /// Scaling, windowing and train/test split
    pub sequence: SequenceConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Parsed packet records; run the full pipeline
    Packets,
    /// Previously exported feature CSVs; only build datasets
    Features,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Stable sort each key's events by timestamp before aggregating
    Resort,
    /// Reject events older than the key's last timestamp
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Prefix of the sequence pairs is train, suffix is test
    Sequences,
    /// Rows up to `first + span * train_ratio` seconds are train
    Time,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Seconds the byte count of each one-second bucket is divided by
    /// to get throughput
    pub window_secs: u32,
    pub ordering: OrderingPolicy,
    /// Share of malformed records per source above which a warning is raised
    pub max_malformed_ratio: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Fields forming the flow key; empty means one series per source
    pub group_by: Vec<KeyField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Number of consecutive feature vectors per input sequence
    pub length: usize,
    pub train_ratio: f64,
    /// Column whose next value is the label
    pub target: String,
    pub split: SplitStrategy,
    /// Append numeric SourceIP / DestinationIP columns
    pub include_addresses: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("captures"),
            output_dir: PathBuf::from("features"),
            input_kind: InputKind::Packets,
            window: WindowConfig::default(),
            grouping: GroupingConfig::default(),
            sequence: SequenceConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_secs: 1,
            ordering: OrderingPolicy::Resort,
            max_malformed_ratio: 0.05,
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            length: 15,
            train_ratio: 0.75,
            target: crate::features::columns::THROUGHPUT.to_string(),
            split: SplitStrategy::Sequences,
            include_addresses: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl PipelineConfig {
    /// Load from JSON file if present; otherwise return default.
    /// A file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window.window_secs == 0 {
            return Err(PipelineError::Config("window_secs must be at least 1".into()));
        }
        if self.sequence.length == 0 {
            return Err(PipelineError::Config("sequence length must be at least 1".into()));
        }
        let r = self.sequence.train_ratio;
        if !(r > 0.0 && r < 1.0) {
            return Err(PipelineError::Config(format!(
                "train_ratio must be in (0, 1), got {r}"
            )));
        }
        if !(0.0..=1.0).contains(&self.window.max_malformed_ratio) {
            return Err(PipelineError::Config(
                "max_malformed_ratio must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
