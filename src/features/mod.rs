//! Windowed traffic features: per-key tumbling aggregation, grouping and
//! assembly into rectangular feature tables.

mod grouping;
mod series;
mod window;

pub use grouping::{FlowGrouper, FlowKey, GroupedRecords, KeyField};
pub use series::{assemble, FeatureSeries, FeatureTable, TableOptions};
pub use window::TumblingWindow;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Canonical column names, shared by the CSV schema and feature tables.
pub mod columns {
    pub const TIMESTAMP: &str = "Timestamp";
    pub const THROUGHPUT: &str = "Throughput(Bps)";
    pub const JITTER: &str = "Jitter(s)";
    pub const AVG_PACKET_SIZE: &str = "AvgPacketSize(bytes)";
    pub const PACKET_COUNT: &str = "PacketCount";
    pub const PROTOCOL_DISTRIBUTION: &str = "ProtocolDistribution";
    pub const DELAY: &str = "Delay(s)";
    pub const SOURCE_IP: &str = "SourceIP";
    pub const DESTINATION_IP: &str = "DestinationIP";
    pub const SOURCE_MAC: &str = "SourceMAC";
    pub const DESTINATION_MAC: &str = "DestinationMAC";
    pub const INGRESS_PORT: &str = "IngressPort";
    pub const EGRESS_PORT: &str = "EgressPort";
    pub const SOURCE_PORT: &str = "SourcePort";
    pub const DESTINATION_PORT: &str = "DestinationPort";
    pub const PROTOCOL: &str = "Protocol";
    /// Prefix of flattened protocol-distribution columns
    pub const PROTOCOL_PREFIX: &str = "Protocol_";
}

/// Relative frequency of each protocol label within one window.
///
/// Text form is a JSON object with sorted keys, e.g. `{"TCP":0.75,"UDP":0.25}`,
/// and parses back to an identical mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolDistribution(BTreeMap<String, f64>);

impl ProtocolDistribution {
    pub fn from_counts(counts: &BTreeMap<String, u64>, total: u64) -> Self {
        if total == 0 {
            return Self::default();
        }
        Self(
            counts
                .iter()
                .map(|(label, n)| (label.clone(), *n as f64 / total as f64))
                .collect(),
        )
    }

    pub fn get(&self, label: &str) -> f64 {
        self.0.get(label).copied().unwrap_or(0.0)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

impl FromIterator<(String, f64)> for ProtocolDistribution {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ProtocolDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl FromStr for ProtocolDistribution {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<BTreeMap<String, f64>>(s).map(Self)
    }
}

impl Serialize for ProtocolDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProtocolDistribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// One feature vector for one flow key over one tumbling window.
/// Field order is the canonical CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// Start of the window, whole seconds
    #[serde(rename = "Timestamp")]
    pub window_start: i64,
    #[serde(rename = "Throughput(Bps)")]
    pub throughput: f64,
    #[serde(rename = "Jitter(s)")]
    pub jitter: f64,
    #[serde(rename = "AvgPacketSize(bytes)")]
    pub avg_packet_size: f64,
    #[serde(rename = "PacketCount")]
    pub packet_count: u64,
    #[serde(rename = "ProtocolDistribution")]
    pub protocol_distribution: ProtocolDistribution,
    /// Gap between the window's last packet and its predecessor
    #[serde(rename = "Delay(s)")]
    pub delay: f64,
    #[serde(rename = "SourceIP")]
    pub source_ip: Option<IpAddr>,
    #[serde(rename = "DestinationIP")]
    pub dest_ip: Option<IpAddr>,
    #[serde(rename = "SourceMAC")]
    pub source_mac: Option<String>,
    #[serde(rename = "DestinationMAC")]
    pub dest_mac: Option<String>,
    #[serde(rename = "IngressPort")]
    pub ingress_port: Option<u32>,
    #[serde(rename = "EgressPort")]
    pub egress_port: Option<u32>,
    #[serde(rename = "SourcePort")]
    pub source_port: Option<u16>,
    #[serde(rename = "DestinationPort")]
    pub dest_port: Option<u16>,
    #[serde(rename = "Protocol")]
    pub protocol: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_text_round_trip() {
        let mut counts = BTreeMap::new();
        counts.insert("TCP".to_string(), 2);
        counts.insert("UDP".to_string(), 1);
        let d = ProtocolDistribution::from_counts(&counts, 3);
        let text = d.to_string();
        assert!(text.starts_with("{\"TCP\":"));
        let back: ProtocolDistribution = text.parse().unwrap();
        assert_eq!(back, d);
        assert!((back.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn distribution_rejects_garbage() {
        assert!("TCP=1".parse::<ProtocolDistribution>().is_err());
    }
}
