//! Flow-key projection and routing of events to per-key aggregators.

use super::{AggregateRecord, TumblingWindow};
use crate::config::OrderingPolicy;
use crate::error::Recoverable;
use crate::packets::PacketEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// PacketEvent field usable in a flow key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyField {
    SwitchId,
    SourceIp,
    DestinationIp,
    SourceMac,
    DestinationMac,
    IngressPort,
    EgressPort,
    SourcePort,
    DestinationPort,
    Protocol,
}

impl KeyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyField::SwitchId => "switch_id",
            KeyField::SourceIp => "source_ip",
            KeyField::DestinationIp => "destination_ip",
            KeyField::SourceMac => "source_mac",
            KeyField::DestinationMac => "destination_mac",
            KeyField::IngressPort => "ingress_port",
            KeyField::EgressPort => "egress_port",
            KeyField::SourcePort => "source_port",
            KeyField::DestinationPort => "destination_port",
            KeyField::Protocol => "protocol",
        }
    }

    fn project(&self, event: &PacketEvent) -> Option<String> {
        match self {
            KeyField::SwitchId => event.switch_id.clone(),
            KeyField::SourceIp => event.source_ip.map(|ip| ip.to_string()),
            KeyField::DestinationIp => event.dest_ip.map(|ip| ip.to_string()),
            KeyField::SourceMac => event.source_mac.clone(),
            KeyField::DestinationMac => event.dest_mac.clone(),
            KeyField::IngressPort => event.ingress_port.map(|p| p.to_string()),
            KeyField::EgressPort => event.egress_port.map(|p| p.to_string()),
            KeyField::SourcePort => event.source_port.map(|p| p.to_string()),
            KeyField::DestinationPort => event.dest_port.map(|p| p.to_string()),
            KeyField::Protocol => Some(event.protocol.clone()),
        }
    }
}

/// Grouping identity. An empty key groups the whole capture together;
/// an absent field value is part of the identity, distinct from any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey(Vec<(KeyField, Option<String>)>);

impl FlowKey {
    pub fn project(fields: &[KeyField], event: &PacketEvent) -> Self {
        Self(fields.iter().map(|f| (*f, f.project(event))).collect())
    }

    /// Key of an ungrouped run.
    pub fn unit() -> Self {
        Self::default()
    }

    pub fn is_unit(&self) -> bool {
        self.0.is_empty()
    }

    /// Filesystem-safe rendering, e.g. `source_port-80_protocol-TCP`.
    pub fn slug(&self) -> String {
        if self.is_unit() {
            return "all".to_string();
        }
        self.0
            .iter()
            .map(|(field, value)| {
                let value: String = value
                    .as_deref()
                    .unwrap_or("none")
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect();
                format!("{}-{}", field.as_str(), value)
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unit() {
            return f.write_str("*");
        }
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", field.as_str(), value.as_deref().unwrap_or("-"))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FlowState {
    window: TumblingWindow,
    /// Buffered events under `OrderingPolicy::Resort`
    pending: Vec<PacketEvent>,
    records: Vec<AggregateRecord>,
}

/// Aggregated output of one grouped run, keys in sorted order.
#[derive(Debug, Default)]
pub struct GroupedRecords {
    pub groups: BTreeMap<FlowKey, Vec<AggregateRecord>>,
    pub events: u64,
    pub out_of_order: u64,
}

/// Routes events to one `TumblingWindow` per flow key, creating it on first
/// sight of the key. Keys share no state.
#[derive(Debug)]
pub struct FlowGrouper {
    fields: Vec<KeyField>,
    ordering: OrderingPolicy,
    window_secs: u32,
    flows: BTreeMap<FlowKey, FlowState>,
    events: u64,
    out_of_order: u64,
}

impl FlowGrouper {
    pub fn new(fields: Vec<KeyField>, ordering: OrderingPolicy, window_secs: u32) -> Self {
        Self {
            fields,
            ordering,
            window_secs,
            flows: BTreeMap::new(),
            events: 0,
            out_of_order: 0,
        }
    }

    pub fn key_count(&self) -> usize {
        self.flows.len()
    }

    pub fn route(&mut self, event: PacketEvent) -> Result<(), Recoverable> {
        self.events += 1;
        let key = FlowKey::project(&self.fields, &event);
        let window_secs = self.window_secs;
        let state = self.flows.entry(key).or_insert_with(|| FlowState {
            window: TumblingWindow::new(window_secs),
            pending: Vec::new(),
            records: Vec::new(),
        });
        match self.ordering {
            OrderingPolicy::Resort => {
                state.pending.push(event);
                Ok(())
            }
            OrderingPolicy::Drop => match state.window.ingest(event) {
                Ok(Some(record)) => {
                    state.records.push(record);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => {
                    self.out_of_order += 1;
                    Err(e)
                }
            },
        }
    }

    /// Drain buffered events, flush every key's trailing window and hand
    /// back the per-key records.
    pub fn finish(self) -> GroupedRecords {
        let mut out = GroupedRecords {
            groups: BTreeMap::new(),
            events: self.events,
            out_of_order: self.out_of_order,
        };
        for (key, mut state) in self.flows {
            let mut pending = std::mem::take(&mut state.pending);
            pending.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            for event in pending {
                match state.window.ingest(event) {
                    Ok(Some(record)) => state.records.push(record),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(key = %key, error = %e, "event rejected after resort");
                        out.out_of_order += 1;
                    }
                }
            }
            if let Some(record) = state.window.flush() {
                state.records.push(record);
            }
            if !state.records.is_empty() {
                out.groups.insert(key, state.records);
            }
        }
        out
    }
}
