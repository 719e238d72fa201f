//! Per-key tumbling window aggregator: time-ordered events -> one
//! AggregateRecord per non-empty window.

use super::{AggregateRecord, ProtocolDistribution};
use crate::error::Recoverable;
use crate::packets::PacketEvent;
use std::collections::BTreeMap;

/// Accumulators of the currently open window.
#[derive(Debug)]
struct OpenWindow {
    start: i64,
    byte_count: u64,
    packet_count: u64,
    /// Sum of |t_i - t_{i-1}| over consecutive packets in this window
    gap_sum: f64,
    protocol_counts: BTreeMap<String, u64>,
    /// Delay of the most recent packet
    delay: f64,
    /// Most recent packet; carries the passthrough identity fields
    last: PacketEvent,
}

impl OpenWindow {
    fn seed(start: i64, event: PacketEvent, delay: f64) -> Self {
        let mut protocol_counts = BTreeMap::new();
        protocol_counts.insert(event.protocol.clone(), 1);
        Self {
            start,
            byte_count: event.length,
            packet_count: 1,
            gap_sum: 0.0,
            protocol_counts,
            delay,
            last: event,
        }
    }

    fn fold(&mut self, event: PacketEvent, delay: f64) {
        self.byte_count += event.length;
        self.packet_count += 1;
        self.gap_sum += (event.timestamp - self.last.timestamp).abs();
        *self.protocol_counts.entry(event.protocol.clone()).or_insert(0) += 1;
        self.delay = delay;
        self.last = event;
    }

    fn finalize(self, window_secs: u32) -> AggregateRecord {
        let jitter = if self.packet_count < 2 {
            0.0
        } else {
            self.gap_sum / (self.packet_count - 1) as f64
        };
        let last = self.last;
        AggregateRecord {
            window_start: self.start,
            throughput: self.byte_count as f64 / window_secs as f64,
            jitter,
            avg_packet_size: self.byte_count as f64 / self.packet_count as f64,
            packet_count: self.packet_count,
            protocol_distribution: ProtocolDistribution::from_counts(
                &self.protocol_counts,
                self.packet_count,
            ),
            delay: self.delay,
            source_ip: last.source_ip,
            dest_ip: last.dest_ip,
            source_mac: last.source_mac,
            dest_mac: last.dest_mac,
            ingress_port: last.ingress_port,
            egress_port: last.egress_port,
            source_port: last.source_port,
            dest_port: last.dest_port,
            protocol: last.protocol,
        }
    }
}

/// State machine owned by exactly one flow key. `ingest` and `flush` are
/// its only mutators.
#[derive(Debug)]
pub struct TumblingWindow {
    window_secs: u32,
    last_timestamp: Option<f64>,
    open: Option<OpenWindow>,
    emitted: u64,
}

impl TumblingWindow {
    /// `window_secs` of 0 is treated as 1.
    pub fn new(window_secs: u32) -> Self {
        Self {
            window_secs: window_secs.max(1),
            last_timestamp: None,
            open: None,
            emitted: 0,
        }
    }

    /// Integer second holding `timestamp`. Windows are always one second
    /// wide; `window_secs` only divides the byte count into throughput.
    pub fn bucket(timestamp: f64) -> i64 {
        timestamp.floor() as i64
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Records emitted so far, rollovers and flushes included.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Fold one event in. Returns the previous window's record when this
    /// event rolls the window over. An event older than the last one seen is
    /// rejected without touching any state.
    pub fn ingest(&mut self, event: PacketEvent) -> Result<Option<AggregateRecord>, Recoverable> {
        let delay = match self.last_timestamp {
            Some(last) if event.timestamp < last => {
                return Err(Recoverable::OutOfOrderEvent {
                    timestamp: event.timestamp,
                    last_seen: last,
                });
            }
            Some(last) => event.timestamp - last,
            None => 0.0,
        };
        self.last_timestamp = Some(event.timestamp);

        let bucket = Self::bucket(event.timestamp);
        match self.open.take() {
            None => {
                self.open = Some(OpenWindow::seed(bucket, event, delay));
                Ok(None)
            }
            Some(mut open) if open.start == bucket => {
                open.fold(event, delay);
                self.open = Some(open);
                Ok(None)
            }
            Some(open) => {
                let record = open.finalize(self.window_secs);
                self.emitted += 1;
                self.open = Some(OpenWindow::seed(bucket, event, delay));
                Ok(Some(record))
            }
        }
    }

    /// Emit the trailing window, if any. Safe to call repeatedly.
    pub fn flush(&mut self) -> Option<AggregateRecord> {
        let open = self.open.take()?;
        self.emitted += 1;
        Some(open.finalize(self.window_secs))
    }
}
