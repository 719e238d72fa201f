//! PacketRecord -> PacketEvent, with per-reason skip accounting.

use super::{PacketEvent, PacketRecord, TCP_LABEL, UDP_LABEL, UNKNOWN_LABEL};
use crate::error::{MalformedReason, Recoverable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeStats {
    /// Records offered, including unparseable lines
    pub seen: u64,
    pub accepted: u64,
    /// Skips keyed by reason
    pub malformed: BTreeMap<String, u64>,
}

impl NormalizeStats {
    pub fn malformed_total(&self) -> u64 {
        self.malformed.values().sum()
    }

    pub fn malformed_ratio(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.malformed_total() as f64 / self.seen as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct Normalizer {
    stats: NormalizeStats,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &NormalizeStats {
        &self.stats
    }

    pub fn into_stats(self) -> NormalizeStats {
        self.stats
    }

    /// Count a record the source reader could not even decode.
    pub fn record_unparseable(&mut self) {
        self.stats.seen += 1;
        self.skip(MalformedReason::Unparseable);
    }

    /// Resolve one record. A record without a usable timestamp or length is
    /// skipped and counted; the caller keeps going.
    pub fn normalize(&mut self, record: &PacketRecord) -> Result<PacketEvent, Recoverable> {
        self.stats.seen += 1;
        match resolve(record) {
            Ok(event) => {
                self.stats.accepted += 1;
                Ok(event)
            }
            Err(reason) => {
                self.skip(reason);
                Err(Recoverable::MalformedEvent(reason))
            }
        }
    }

    fn skip(&mut self, reason: MalformedReason) {
        tracing::debug!(reason = %reason, "packet record skipped");
        *self
            .stats
            .malformed
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
    }
}

fn resolve(record: &PacketRecord) -> Result<PacketEvent, MalformedReason> {
    let timestamp = record.timestamp.ok_or(MalformedReason::MissingTimestamp)?;
    if !timestamp.is_finite() {
        return Err(MalformedReason::NonFiniteTimestamp);
    }
    let length = record.length.ok_or(MalformedReason::MissingLength)?;
    let length = u64::try_from(length).map_err(|_| MalformedReason::NegativeLength)?;

    // UDP wins over any higher-layer label; TCP only contributes ports.
    let (protocol, ports) = if let Some(udp) = &record.udp {
        (UDP_LABEL.to_string(), Some(udp))
    } else if let Some(tcp) = &record.tcp {
        let label = record
            .highest_layer
            .clone()
            .unwrap_or_else(|| TCP_LABEL.to_string());
        (label, Some(tcp))
    } else {
        let label = record
            .highest_layer
            .clone()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        (label, None)
    };

    let ip = record.ip.as_ref();
    let eth = record.eth.as_ref();
    let fwd = record.openflow.as_ref();

    Ok(PacketEvent {
        timestamp,
        length,
        protocol,
        switch_id: record.switch_id.clone(),
        source_ip: ip.and_then(|l| parse_ip(l.src.as_deref())),
        dest_ip: ip.and_then(|l| parse_ip(l.dst.as_deref())),
        source_mac: eth.and_then(|l| l.src.clone()),
        dest_mac: eth.and_then(|l| l.dst.clone()),
        ingress_port: fwd.and_then(|f| f.in_port),
        egress_port: fwd.and_then(|f| f.out_port),
        source_port: ports.and_then(|p| p.srcport),
        dest_port: ports.and_then(|p| p.dstport),
    })
}

fn parse_ip(raw: Option<&str>) -> Option<IpAddr> {
    let raw = raw?;
    match raw.parse() {
        Ok(ip) => Some(ip),
        Err(_) => {
            tracing::debug!(value = raw, "unparseable ip address treated as absent");
            None
        }
    }
}
