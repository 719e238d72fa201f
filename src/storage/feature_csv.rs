//! Canonical feature CSV (one row per AggregateRecord) and JSON artifacts.

use crate::error::PipelineError;
use crate::features::{columns, AggregateRecord};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Header of the canonical feature CSV, in column order.
pub const FEATURE_HEADER: [&str; 16] = [
    columns::TIMESTAMP,
    columns::THROUGHPUT,
    columns::JITTER,
    columns::AVG_PACKET_SIZE,
    columns::PACKET_COUNT,
    columns::PROTOCOL_DISTRIBUTION,
    columns::DELAY,
    columns::SOURCE_IP,
    columns::DESTINATION_IP,
    columns::SOURCE_MAC,
    columns::DESTINATION_MAC,
    columns::INGRESS_PORT,
    columns::EGRESS_PORT,
    columns::SOURCE_PORT,
    columns::DESTINATION_PORT,
    columns::PROTOCOL,
];

/// Write records to any writer; the header is written even for no records.
pub fn write_features<W: Write>(writer: W, records: &[AggregateRecord]) -> Result<(), PipelineError> {
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    w.write_record(FEATURE_HEADER)?;
    for r in records {
        w.serialize(r)?;
    }
    w.flush().map_err(|e| PipelineError::Csv(e.into()))?;
    Ok(())
}

pub fn write_features_file(path: &Path, records: &[AggregateRecord]) -> Result<(), PipelineError> {
    let file = std::fs::File::create(path).map_err(|e| PipelineError::io(path, e))?;
    write_features(std::io::BufWriter::new(file), records)
}

/// Read a feature CSV back. The `Timestamp` column is mandatory.
pub fn read_features_file(path: &Path) -> Result<Vec<AggregateRecord>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    if !reader.headers()?.iter().any(|h| h == columns::TIMESTAMP) {
        return Err(PipelineError::source(
            path,
            format!("feature csv has no {:?} column", columns::TIMESTAMP),
        ));
    }
    let mut out = Vec::new();
    for row in reader.deserialize::<AggregateRecord>() {
        out.push(row?);
    }
    Ok(out)
}

/// Pretty JSON artifact (datasets, run summaries).
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let file = std::fs::File::create(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    Ok(())
}
