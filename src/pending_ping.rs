//! Pending-ping table: correlates outstanding direct/indirect pings with
//! their eventual ack.

use crate::node_id::NodeId;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// A ping awaiting resolution. `waker` fires once, with the receive
/// timestamp of the matching ack, when [`PendingPingTable::complete`]
/// succeeds; dropping the table entry without completing it (cleanup after
/// a timeout) simply drops the sender half, which the waiting receiver
/// observes as a closed channel.
pub struct PendingPing {
    pub target: NodeId,
    pub sequence: u32,
    pub sent_at_ms: i64,
    waker: Option<oneshot::Sender<i64>>,
}

impl PendingPing {
    pub fn is_completed(&self) -> bool {
        self.waker.is_none()
    }
}

/// Tracks outstanding pings keyed by sequence. The sequence allocator is a
/// monotonically increasing counter scoped to the node — unique across both
/// locally-initiated probes and intermediary-forwarded pings.
#[derive(Default)]
pub struct PendingPingTable {
    next_sequence: u32,
    entries: HashMap<u32, PendingPing>,
}

impl PendingPingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        seq
    }

    /// Registers a pending ping and returns the receiver half of its waker.
    pub fn insert(
        &mut self,
        target: NodeId,
        sequence: u32,
        sent_at_ms: i64,
    ) -> oneshot::Receiver<i64> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            sequence,
            PendingPing {
                target,
                sequence,
                sent_at_ms,
                waker: Some(tx),
            },
        );
        rx
    }

    pub fn get(&self, sequence: u32) -> Option<&PendingPing> {
        self.entries.get(&sequence)
    }

    /// Whether the entry at `sequence` has already been resolved by
    /// `complete`, even if nothing is left waiting on its receiver — lets a
    /// caller that already gave up on this sequence's waiter check whether a
    /// late ack settled it anyway.
    pub fn was_completed(&self, sequence: u32) -> bool {
        self.get(sequence)
            .map(|entry| entry.is_completed())
            .unwrap_or(false)
    }

    /// Compare-and-set completion: fires the waker only if the entry is
    /// still present and has not already been completed, tolerating races
    /// between a late direct ack and an indirect ack for the same target.
    /// Returns the completed entry's `target`/`sent_at_ms` on success.
    pub fn complete(&mut self, sequence: u32, received_at_ms: i64) -> Option<(NodeId, i64)> {
        let entry = self.entries.get_mut(&sequence)?;
        let waker = entry.waker.take()?;
        let result = (entry.target.clone(), entry.sent_at_ms);
        let _ = waker.send(received_at_ms);
        Some(result)
    }

    /// Remove an entry regardless of completion state — used by the
    /// cleanup step after a probe round's wait resolves either way.
    pub fn remove(&mut self, sequence: u32) -> Option<PendingPing> {
        self.entries.remove(&sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
