//! Version vectors — per-author highest-observed sequence.

use crate::node_id::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// `NodeId -> u64` mapping of highest observed sequence per author. An
/// author missing from the map is equivalent to sequence `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<NodeId, u64>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, author: &NodeId) -> u64 {
        self.entries.get(author).copied().unwrap_or(0)
    }

    /// Record that `author`'s highest known sequence is at least `seq`.
    /// Never regresses an existing higher value.
    pub fn observe(&mut self, author: NodeId, seq: u64) {
        let entry = self.entries.entry(author).or_insert(0);
        if seq > *entry {
            *entry = seq;
        }
    }

    pub fn set(&mut self, author: NodeId, seq: u64) {
        self.entries.insert(author, seq);
    }

    pub fn authors(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &u64)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `self >= other` iff for every author in `other`, `self[author] >=
    /// other[author]`.
    pub fn covers(&self, other: &VersionVector) -> bool {
        other
            .entries
            .iter()
            .all(|(author, &seq)| self.get(author) >= seq)
    }

    /// `true` if `other` has something `self` doesn't — i.e. some author
    /// for which `other[author] > self[author]`.
    pub fn is_behind(&self, other: &VersionVector) -> bool {
        other
            .entries
            .iter()
            .any(|(author, &seq)| seq > self.get(author))
    }

    /// `{ (author, local[author]+1..=peer[author]) }` for authors where the
    /// peer is ahead of `self`.
    pub fn missing_from(&self, peer: &VersionVector) -> Vec<(NodeId, RangeInclusive<u64>)> {
        peer.entries
            .iter()
            .filter_map(|(author, &peer_seq)| {
                let local_seq = self.get(author);
                if peer_seq > local_seq {
                    Some((author.clone(), (local_seq + 1)..=peer_seq))
                } else {
                    None
                }
            })
            .collect()
    }
}
