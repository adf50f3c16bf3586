//! Pending-delta table: single-flight bookkeeping for outstanding
//! `DeltaRequest`s, keyed by `(channel, stream)`.

use crate::model::{ChannelId, StreamId};
use crate::node_id::NodeId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    channel: ChannelId,
    stream: StreamId,
}

#[derive(Debug, Clone)]
pub struct PendingDelta {
    pub peer: NodeId,
    pub channel: ChannelId,
    pub stream: StreamId,
    pub requested_at_ms: i64,
}

/// Keyed by `(channel, stream)`. Entries older than `pending_delta_ttl` are
/// considered abandoned — the peer never replied — and may be replaced by a
/// fresh request.
#[derive(Default)]
pub struct PendingDeltaTable {
    entries: HashMap<Key, PendingDelta>,
}

impl PendingDeltaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if a live (non-stale) request already covers this key —
    /// callers should skip issuing a duplicate `DeltaRequest` (single-flight).
    pub fn has_live(&self, channel: &ChannelId, stream: &StreamId, now_ms: i64, ttl_ms: i64) -> bool {
        let key = Key {
            channel: channel.clone(),
            stream: stream.clone(),
        };
        match self.entries.get(&key) {
            Some(entry) => now_ms - entry.requested_at_ms < ttl_ms,
            None => false,
        }
    }

    pub fn insert(&mut self, peer: NodeId, channel: ChannelId, stream: StreamId, now_ms: i64) {
        let key = Key {
            channel: channel.clone(),
            stream: stream.clone(),
        };
        self.entries.insert(
            key,
            PendingDelta {
                peer,
                channel,
                stream,
                requested_at_ms: now_ms,
            },
        );
    }

    pub fn clear(&mut self, channel: &ChannelId, stream: &StreamId) {
        let key = Key {
            channel: channel.clone(),
            stream: stream.clone(),
        };
        self.entries.remove(&key);
    }

    /// Drops all entries for a departing peer.
    pub fn clear_pending_requests(&mut self, peer: &NodeId) {
        self.entries.retain(|_, entry| &entry.peer != peer);
    }

    /// Sweeps entries older than `ttl_ms`, returning them so the caller can
    /// log/retry as appropriate.
    pub fn evict_stale(&mut self, now_ms: i64, ttl_ms: i64) -> Vec<PendingDelta> {
        let stale_keys: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| now_ms - entry.requested_at_ms >= ttl_ms)
            .map(|(k, _)| k.clone())
            .collect();
        stale_keys
            .into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid(s: &str) -> NodeId {
        NodeId::new(s)
    }

    #[test]
    fn live_entry_blocks_duplicate_request() {
        let mut table = PendingDeltaTable::new();
        table.insert(nid("peer"), ChannelId::new("c"), StreamId::new("s"), 0);
        assert!(table.has_live(&ChannelId::new("c"), &StreamId::new("s"), 100, 5000));
    }

    #[test]
    fn stale_entry_does_not_block() {
        let mut table = PendingDeltaTable::new();
        table.insert(nid("peer"), ChannelId::new("c"), StreamId::new("s"), 0);
        assert!(!table.has_live(&ChannelId::new("c"), &StreamId::new("s"), 6000, 5000));
    }

    #[test]
    fn clear_pending_requests_drops_only_that_peer() {
        let mut table = PendingDeltaTable::new();
        table.insert(nid("a"), ChannelId::new("c1"), StreamId::new("s"), 0);
        table.insert(nid("b"), ChannelId::new("c2"), StreamId::new("s"), 0);
        table.clear_pending_requests(&nid("a"));
        assert_eq!(table.len(), 1);
        assert!(table.has_live(&ChannelId::new("c2"), &StreamId::new("s"), 0, 5000));
    }

    #[test]
    fn evict_stale_sweeps_and_returns_entries() {
        let mut table = PendingDeltaTable::new();
        table.insert(nid("a"), ChannelId::new("c1"), StreamId::new("s"), 0);
        table.insert(nid("b"), ChannelId::new("c2"), StreamId::new("s"), 4000);
        let evicted = table.evict_stale(5000, 5000);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].peer, nid("a"));
        assert_eq!(table.len(), 1);
    }
}
