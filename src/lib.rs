//! netmod pipeline: parsed packet stream -> windowed traffic features ->
//! scaled (sequence, label) datasets for throughput prediction.
//!
//! Modular structure:
//! - [`packets`]: Raw packet records, normalization, packet sources
//! - [`features`]: Tumbling window aggregation, flow-key grouping, feature tables
//! - [`dataset`]: Min-max scaling, sequence windowing, temporal splits
//! - [`storage`]: Canonical feature CSV and JSON artifacts
//! - [`report`]: Skipped events / keys accounting per run
//! - [`logging`]: Structured logging setup
//! - [`pipeline`]: Orchestration over sources and directories

pub mod config;
pub mod error;
pub mod packets;
pub mod features;
pub mod dataset;
pub mod storage;
pub mod report;
pub mod logging;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{PipelineError, Recoverable};
pub use packets::{PacketEvent, PacketRecord, Normalizer};
pub use features::{AggregateRecord, FeatureSeries, FeatureTable, FlowGrouper, FlowKey, TumblingWindow};
pub use dataset::{Dataset, DatasetBuilder, MinMaxScaler, ScalerState, SequenceSet};
pub use report::RunSummary;
pub use logging::StructuredLogger;
pub use pipeline::Pipeline;
