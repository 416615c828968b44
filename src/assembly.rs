//! TCP stream reassembly.
//!
//! The assembler turns TCP segments back into per-flow ordered byte streams.
//! Each direction of a conversation is one flow; the first segment of a flow
//! asks the factory for a stream handle, and from then on only contiguous
//! bytes are delivered into that handle's channel, in sequence order.
//! Out-of-order segments wait in a bounded reorder buffer.
//!
//! Shutdown follows the channel-disconnect idiom: `flush_all` drops every
//! sender, handlers observe end-of-stream, and their threads are joined
//! before it returns.

use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::thread::JoinHandle;

/// One direction of a TCP conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// The consuming side of a new flow: the sender feeding its byte stream and
/// the handle of the thread draining it.
pub struct StreamHandle {
    pub tx: Sender<Vec<u8>>,
    pub join: JoinHandle<()>,
}

/// Creates a stream consumer for every newly observed flow.
pub trait StreamFactory {
    fn new_stream(&self, key: &FlowKey) -> StreamHandle;
}

/// Bytes buffered ahead of a sequence gap before the gap is abandoned.
const DEFAULT_REORDER_CAP: usize = 1 << 20;

struct FlowState {
    tx: Sender<Vec<u8>>,
    join: JoinHandle<()>,
    /// Sequence number of the next byte to deliver. `None` until the first
    /// segment fixes the starting point.
    next_seq: Option<u32>,
    /// Segments received ahead of `next_seq`, keyed by their data sequence.
    pending: Vec<(u32, Vec<u8>)>,
    pending_bytes: usize,
}

impl FlowState {
    fn feed(&mut self, seq: u32, syn: bool, payload: &[u8], reorder_cap: usize) {
        // SYN occupies one sequence number; any data rides behind it.
        let data_seq = if syn { seq.wrapping_add(1) } else { seq };

        if self.next_seq.is_none() {
            self.next_seq = Some(data_seq);
        }

        if payload.is_empty() {
            return;
        }

        let next = self.next_seq.unwrap();
        let delta = data_seq.wrapping_sub(next) as i32;
        if delta <= 0 {
            let overlap = next.wrapping_sub(data_seq) as usize;
            if overlap >= payload.len() {
                // Entirely in the past: retransmission of delivered bytes.
                return;
            }
            self.deliver(&payload[overlap..]);
            self.drain_pending();
        } else {
            self.pending.push((data_seq, payload.to_vec()));
            self.pending_bytes += payload.len();
            if self.pending_bytes > reorder_cap {
                self.skip_gap();
            }
        }
    }

    fn deliver(&mut self, bytes: &[u8]) {
        let next = self.next_seq.unwrap();
        self.next_seq = Some(next.wrapping_add(bytes.len() as u32));
        // A closed receiver means the handler is gone; bytes for it are moot.
        let _ = self.tx.send(bytes.to_vec());
    }

    /// Deliver every buffered segment that now touches `next_seq`, dropping
    /// those the stream has already moved past.
    fn drain_pending(&mut self) {
        loop {
            let next = self.next_seq.unwrap();

            let mut stale = 0usize;
            self.pending.retain(|(seq, data)| {
                let delta = seq.wrapping_sub(next) as i32;
                let keep = delta as i64 + data.len() as i64 > 0;
                if !keep {
                    stale += data.len();
                }
                keep
            });
            self.pending_bytes -= stale;

            let idx = self.pending.iter().position(|(seq, _)| {
                (seq.wrapping_sub(next) as i32) <= 0
            });
            match idx {
                Some(i) => {
                    let (seq, data) = self.pending.swap_remove(i);
                    self.pending_bytes -= data.len();
                    let overlap = next.wrapping_sub(seq) as usize;
                    self.deliver(&data[overlap..]);
                }
                None => break,
            }
        }
    }

    /// The reorder buffer is full: jump the stream forward to the closest
    /// buffered segment. The framer downstream re-synchronises over the gap.
    fn skip_gap(&mut self) {
        let next = self.next_seq.unwrap();
        let target = self
            .pending
            .iter()
            .map(|(seq, _)| *seq)
            .min_by_key(|seq| seq.wrapping_sub(next));
        if let Some(seq) = target {
            tracing::trace!(from = next, to = seq, "reorder buffer full, skipping gap");
            self.next_seq = Some(seq);
            self.drain_pending();
        }
    }
}

/// Per-flow reassembly over all flows of a capture.
pub struct Assembler<F> {
    factory: F,
    flows: HashMap<FlowKey, FlowState>,
    reorder_cap: usize,
}

impl<F: StreamFactory> Assembler<F> {
    pub fn new(factory: F) -> Self {
        Assembler::with_reorder_cap(factory, DEFAULT_REORDER_CAP)
    }

    pub fn with_reorder_cap(factory: F, reorder_cap: usize) -> Self {
        Assembler {
            factory,
            flows: HashMap::new(),
            reorder_cap,
        }
    }

    /// Number of flows observed so far.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Feed one TCP segment. The first segment of an unseen flow creates its
    /// stream through the factory.
    pub fn assemble(&mut self, key: FlowKey, seq: u32, syn: bool, payload: &[u8]) {
        let factory = &self.factory;
        let reorder_cap = self.reorder_cap;
        let state = self.flows.entry(key).or_insert_with_key(|key| {
            tracing::debug!(flow = %key, "new flow");
            let handle = factory.new_stream(key);
            FlowState {
                tx: handle.tx,
                join: handle.join,
                next_seq: None,
                pending: Vec::new(),
                pending_bytes: 0,
            }
        });
        state.feed(seq, syn, payload, reorder_cap);
    }

    /// Close every flow's stream and wait for all handlers to finish.
    /// Buffered bytes still stuck behind sequence gaps are discarded.
    pub fn flush_all(self) {
        let count = self.flows.len();
        for (key, state) in self.flows {
            drop(state.tx);
            if state.join.join().is_err() {
                tracing::warn!(flow = %key, "stream handler panicked");
            }
        }
        tracing::debug!(flows = count, "all streams flushed");
    }
}
