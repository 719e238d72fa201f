//! Packet records as handed over by an external capture parser, and the
//! normalized events the aggregation stages consume.

mod normalize;
mod reader;

pub use normalize::{NormalizeStats, Normalizer};
pub use reader::{read_packets, ParsedSource, SourceFormat};

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Label forced on any packet carrying a UDP header.
pub const UDP_LABEL: &str = "UDP";
/// Label used when a TCP header is present but no classification is.
pub const TCP_LABEL: &str = "TCP";
/// Label used when nothing classifies the packet.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// One externally parsed packet. Each layer is present only when the
/// capture decoded it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Capture timestamp in seconds
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Frame length in bytes
    #[serde(default)]
    pub length: Option<i64>,
    /// Highest-layer classification from the parser (e.g. "HTTP", "DNS")
    #[serde(default)]
    pub highest_layer: Option<String>,
    /// Switch identifier attached by the collector, if any
    #[serde(default)]
    pub switch_id: Option<String>,
    #[serde(default)]
    pub ip: Option<AddressLayer>,
    #[serde(default)]
    pub eth: Option<AddressLayer>,
    #[serde(default)]
    pub tcp: Option<PortLayer>,
    #[serde(default)]
    pub udp: Option<PortLayer>,
    #[serde(default)]
    pub openflow: Option<ForwardingLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLayer {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub dst: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLayer {
    #[serde(default)]
    pub srcport: Option<u16>,
    #[serde(default)]
    pub dstport: Option<u16>,
}

/// Switch forwarding metadata (OpenFlow packet-in / packet-out).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingLayer {
    #[serde(default)]
    pub in_port: Option<u32>,
    #[serde(default)]
    pub out_port: Option<u32>,
}

/// Canonical, immutable packet observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketEvent {
    pub timestamp: f64,
    pub length: u64,
    pub protocol: String,
    pub switch_id: Option<String>,
    pub source_ip: Option<IpAddr>,
    pub dest_ip: Option<IpAddr>,
    pub source_mac: Option<String>,
    pub dest_mac: Option<String>,
    pub ingress_port: Option<u32>,
    pub egress_port: Option<u32>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
}

impl PacketEvent {
    /// Minimal event with no addressing metadata.
    pub fn new(timestamp: f64, length: u64, protocol: impl Into<String>) -> Self {
        Self {
            timestamp,
            length,
            protocol: protocol.into(),
            switch_id: None,
            source_ip: None,
            dest_ip: None,
            source_mac: None,
            dest_mac: None,
            ingress_port: None,
            egress_port: None,
            source_port: None,
            dest_port: None,
        }
    }
}
