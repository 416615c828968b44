//! Per-flow stream handlers.
//!
//! One handler runs per directional TCP flow. It drains the flow's
//! reassembled byte channel, scans for ISO-8583 frames, stamps each message
//! and files it with the aggregator under the direction the flow has
//! relative to the firewall address.

use crate::aggregate::{Aggregator, Row};
use crate::assembly::{FlowKey, StreamFactory, StreamHandle};
use crate::iso8583::{extract_key, FrameScanner, KEY_ERROR_PLACEHOLDER};
use chrono::{SecondsFormat, Utc};
use crossbeam_channel::Receiver;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Capacity of each flow's byte-chunk channel. Bounded so the packet loop
/// backs off instead of ballooning memory when a handler falls behind.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Direction of a flow relative to the firewall address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Traffic destined to the firewall.
    Input,
    /// Traffic originating from the firewall.
    Output,
    /// Traffic not touching the firewall; never counted or stored.
    Ignored,
}

/// Classify a flow against the firewall address.
pub fn classify(src_ip: IpAddr, dst_ip: IpAddr, fw_ip: IpAddr) -> Direction {
    if dst_ip == fw_ip {
        Direction::Input
    } else if src_ip == fw_ip {
        Direction::Output
    } else {
        Direction::Ignored
    }
}

/// Drains one flow's reassembled bytes and turns frames into rows.
pub struct IsoStreamHandler {
    flow: FlowKey,
    direction: Direction,
    agg: Arc<Aggregator>,
    scanner: FrameScanner,
}

impl IsoStreamHandler {
    pub fn new(flow: FlowKey, fw_ip: IpAddr, agg: Arc<Aggregator>) -> Self {
        let direction = classify(flow.src_ip, flow.dst_ip, fw_ip);
        IsoStreamHandler {
            flow,
            direction,
            agg,
            scanner: FrameScanner::new(),
        }
    }

    /// Consume the byte channel until it disconnects. Residual bytes that
    /// never complete a frame are dropped with the scanner.
    pub fn run(mut self, rx: Receiver<Vec<u8>>) {
        while let Ok(chunk) = rx.recv() {
            self.scanner.extend(&chunk);
            while let Some(payload) = self.scanner.next_message() {
                let key = extract_key(&payload)
                    .unwrap_or_else(|_| KEY_ERROR_PLACEHOLDER.to_string());
                let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
                let row = Row { timestamp, key };
                match self.direction {
                    Direction::Input => self.agg.add_input_row(row),
                    Direction::Output => self.agg.add_output_row(row),
                    Direction::Ignored => {}
                }
            }
        }
        tracing::debug!(flow = %self.flow, "stream handler finished");
    }
}

/// Spawns an `IsoStreamHandler` thread for every new flow the assembler
/// observes. Construction is a channel, a struct and a spawn; it never
/// blocks on other flows.
pub struct IsoStreamFactory {
    fw_ip: IpAddr,
    agg: Arc<Aggregator>,
    next_id: AtomicU64,
}

impl IsoStreamFactory {
    pub fn new(fw_ip: IpAddr, agg: Arc<Aggregator>) -> Self {
        IsoStreamFactory {
            fw_ip,
            agg,
            next_id: AtomicU64::new(0),
        }
    }
}

impl StreamFactory for IsoStreamFactory {
    fn new_stream(&self, key: &FlowKey) -> StreamHandle {
        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(STREAM_CHANNEL_CAPACITY);
        let handler = IsoStreamHandler::new(key.clone(), self.fw_ip, self.agg.clone());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let join = thread::Builder::new()
            .name(format!("iso-flow-{}", id))
            .spawn(move || handler.run(rx))
            .expect("failed to spawn stream handler thread");
        StreamHandle { tx, join }
    }
}
