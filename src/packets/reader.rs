//! Packet sources on disk: JSON lines of `PacketRecord`, or flat packet CSV.

use super::{AddressLayer, ForwardingLayer, PacketRecord, PortLayer};
use crate::error::PipelineError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    JsonLines,
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jsonl" | "ndjson" | "json" => Some(SourceFormat::JsonLines),
            "csv" => Some(SourceFormat::Csv),
            _ => None,
        }
    }
}

/// Records decoded from one source, in file order.
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    pub records: Vec<PacketRecord>,
    /// Lines or rows that could not be decoded at all
    pub unparseable: u64,
}

pub fn read_packets(path: &Path) -> Result<ParsedSource, PipelineError> {
    match SourceFormat::from_path(path) {
        Some(SourceFormat::JsonLines) => read_json_lines(path),
        Some(SourceFormat::Csv) => read_packet_csv(path),
        None => Err(PipelineError::source(path, "unsupported packet source extension")),
    }
}

fn read_json_lines(path: &Path) -> Result<ParsedSource, PipelineError> {
    let data = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let mut out = ParsedSource::default();
    for (lineno, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<PacketRecord>(line) {
            Ok(r) => out.records.push(r),
            Err(e) => {
                tracing::debug!(path = %path.display(), line = lineno + 1, error = %e, "undecodable packet line");
                out.unparseable += 1;
            }
        }
    }
    Ok(out)
}

/// Flat export row. Ports are only attributed when `Transport` says which
/// header carried them.
#[derive(Debug, Deserialize)]
struct PacketRow {
    #[serde(rename = "Timestamp", default)]
    timestamp: Option<f64>,
    #[serde(rename = "Length", default)]
    length: Option<i64>,
    #[serde(rename = "Protocol", default)]
    protocol: Option<String>,
    #[serde(rename = "Transport", default)]
    transport: Option<String>,
    #[serde(rename = "SwitchId", default)]
    switch_id: Option<String>,
    #[serde(rename = "SourceIP", default)]
    source_ip: Option<String>,
    #[serde(rename = "DestinationIP", default)]
    dest_ip: Option<String>,
    #[serde(rename = "SourceMAC", default)]
    source_mac: Option<String>,
    #[serde(rename = "DestinationMAC", default)]
    dest_mac: Option<String>,
    #[serde(rename = "IngressPort", default)]
    ingress_port: Option<u32>,
    #[serde(rename = "EgressPort", default)]
    egress_port: Option<u32>,
    #[serde(rename = "SourcePort", default)]
    source_port: Option<u16>,
    #[serde(rename = "DestinationPort", default)]
    dest_port: Option<u16>,
}

impl From<PacketRow> for PacketRecord {
    fn from(row: PacketRow) -> Self {
        let ports = PortLayer {
            srcport: row.source_port,
            dstport: row.dest_port,
        };
        let transport = row.transport.as_deref().map(str::to_ascii_uppercase);
        let (tcp, udp) = match transport.as_deref() {
            Some("UDP") => (None, Some(ports)),
            Some("TCP") => (Some(ports), None),
            _ => (None, None),
        };
        let ip = (row.source_ip.is_some() || row.dest_ip.is_some()).then(|| AddressLayer {
            src: row.source_ip,
            dst: row.dest_ip,
        });
        let eth = (row.source_mac.is_some() || row.dest_mac.is_some()).then(|| AddressLayer {
            src: row.source_mac,
            dst: row.dest_mac,
        });
        let openflow = (row.ingress_port.is_some() || row.egress_port.is_some()).then(|| {
            ForwardingLayer {
                in_port: row.ingress_port,
                out_port: row.egress_port,
            }
        });
        PacketRecord {
            timestamp: row.timestamp,
            length: row.length,
            highest_layer: row.protocol,
            switch_id: row.switch_id,
            ip,
            eth,
            tcp,
            udp,
            openflow,
        }
    }
}

fn read_packet_csv(path: &Path) -> Result<ParsedSource, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    for required in ["Timestamp", "Length"] {
        if !headers.iter().any(|h| h == required) {
            return Err(PipelineError::source(
                path,
                format!("packet csv has no {required:?} column"),
            ));
        }
    }

    let mut out = ParsedSource::default();
    for (idx, row) in reader.deserialize::<PacketRow>().enumerate() {
        match row {
            Ok(row) => out.records.push(row.into()),
            Err(e) => {
                tracing::debug!(path = %path.display(), row = idx + 1, error = %e, "undecodable packet row");
                out.unparseable += 1;
            }
        }
    }
    Ok(out)
}
