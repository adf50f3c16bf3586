//! Peer registry: maps peers to state, metrics, and RTT; serialises writes;
//! answers selection queries in insertion-stable order.
//!
//! Internally synchronized with `tokio::sync::RwLock` so the registry can be
//! shared as a plain `Arc<PeerRegistry>` between the failure detector and
//! gossip engine tasks — the lock lives inside this type instead of around
//! it.

use crate::node_id::NodeId;
use crate::rtt::RttEstimate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// `Reachable < Suspected < Unreachable` — the derived `Ord` below encodes
/// the monotone transition order directly; `update_status` relies on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeerStatus {
    Reachable,
    Suspected,
    Unreachable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetrics {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    /// Window start, in port-supplied milliseconds, that the counters above
    /// are relative to. Reset (and counters zeroed) once a caller observes
    /// `now - window_start_ms >= window_ms`.
    window_start_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub id: NodeId,
    pub status: PeerStatus,
    pub failed_probe_count: u32,
    pub last_contact_ms: i64,
    /// Advanced only by refutation, which this crate does not implement; the
    /// field is carried and persisted but never interpreted here.
    pub incarnation: u64,
    pub rtt: Option<RttEstimate>,
    pub metrics: PeerMetrics,
    /// Set while an indirect-probe hold is active for this peer; excluded
    /// from `select_random_probable` while present.
    pub probing_hold: bool,
}

impl Peer {
    fn new(id: NodeId, now_ms: i64) -> Self {
        Self {
            id,
            status: PeerStatus::Reachable,
            failed_probe_count: 0,
            last_contact_ms: now_ms,
            incarnation: 0,
            rtt: None,
            metrics: PeerMetrics::default(),
            probing_hold: false,
        }
    }
}

#[derive(Default)]
struct Inner {
    peers: HashMap<NodeId, Peer>,
    order: VecDeque<NodeId>,
}

fn roll_window(metrics: &mut PeerMetrics, now_ms: i64, window_ms: i64) {
    if now_ms - metrics.window_start_ms >= window_ms {
        metrics.window_start_ms = now_ms;
        metrics.messages_sent = 0;
        metrics.bytes_sent = 0;
        metrics.messages_received = 0;
        metrics.bytes_received = 0;
    }
}

/// Maps peers to state + metrics + RTT with atomic (with respect to other
/// registry operations) state transitions and insertion-stable selection
/// queries.
#[derive(Default)]
pub struct PeerRegistry {
    inner: RwLock<Inner>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts Reachable with `last_contact_ms=now`, zero counters. Idempotent.
    pub async fn add_peer(&self, id: NodeId, now_ms: i64) {
        let mut inner = self.inner.write().await;
        if !inner.peers.contains_key(&id) {
            inner.order.push_back(id.clone());
            inner.peers.insert(id.clone(), Peer::new(id, now_ms));
        }
    }

    /// Erases all state for `id`. Idempotent.
    pub async fn remove_peer(&self, id: &NodeId) {
        let mut inner = self.inner.write().await;
        if inner.peers.remove(id).is_some() {
            inner.order.retain(|p| p != id);
        }
    }

    pub async fn get(&self, id: &NodeId) -> Option<Peer> {
        self.inner.read().await.peers.get(id).cloned()
    }

    pub async fn contains(&self, id: &NodeId) -> bool {
        self.inner.read().await.peers.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.peers.is_empty()
    }

    /// Sets `last_contact_ms=max(existing, ms)`, zeros `failed_probe_count`,
    /// and if status is Suspected or Unreachable transitions to Reachable.
    pub async fn update_contact(&self, id: &NodeId, ms: i64) {
        let mut inner = self.inner.write().await;
        if let Some(peer) = inner.peers.get_mut(id) {
            peer.last_contact_ms = peer.last_contact_ms.max(ms);
            peer.failed_probe_count = 0;
            if matches!(peer.status, PeerStatus::Suspected | PeerStatus::Unreachable) {
                peer.status = PeerStatus::Reachable;
            }
        }
    }

    /// `+1` on `failed_probe_count`; no status change here.
    pub async fn increment_failed_probe(&self, id: &NodeId) {
        let mut inner = self.inner.write().await;
        if let Some(peer) = inner.peers.get_mut(id) {
            peer.failed_probe_count += 1;
        }
    }

    /// Monotone in `{Reachable < Suspected < Unreachable}`; reverse
    /// transitions happen only through `update_contact`. A request that
    /// would move status backward is ignored.
    pub async fn update_status(&self, id: &NodeId, new: PeerStatus) {
        let mut inner = self.inner.write().await;
        if let Some(peer) = inner.peers.get_mut(id) {
            if new > peer.status {
                peer.status = new;
            }
        }
    }

    pub async fn record_peer_rtt(&self, id: &NodeId, sample: Duration) {
        let mut inner = self.inner.write().await;
        if let Some(peer) = inner.peers.get_mut(id) {
            let mut estimate = peer.rtt.unwrap_or_default();
            estimate.record_sample(sample);
            peer.rtt = Some(estimate);
        }
    }

    pub async fn record_message_sent(&self, id: &NodeId, bytes: u64, now_ms: i64, window_ms: i64) {
        let mut inner = self.inner.write().await;
        if let Some(peer) = inner.peers.get_mut(id) {
            roll_window(&mut peer.metrics, now_ms, window_ms);
            peer.metrics.messages_sent += 1;
            peer.metrics.bytes_sent += bytes;
        }
    }

    pub async fn record_message_received(
        &self,
        id: &NodeId,
        bytes: u64,
        now_ms: i64,
        window_ms: i64,
    ) {
        let mut inner = self.inner.write().await;
        if let Some(peer) = inner.peers.get_mut(id) {
            roll_window(&mut peer.metrics, now_ms, window_ms);
            peer.metrics.messages_received += 1;
            peer.metrics.bytes_received += bytes;
        }
    }

    pub async fn set_probing_hold(&self, id: &NodeId, held: bool) {
        let mut inner = self.inner.write().await;
        if let Some(peer) = inner.peers.get_mut(id) {
            peer.probing_hold = held;
        }
    }

    /// Peers with status in `{Reachable, Suspected}`, insertion-stable.
    /// Unreachable is excluded: it cannot refute without out-of-band
    /// recovery.
    pub async fn probable_peers(&self) -> Vec<Peer> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.peers.get(id))
            .filter(|p| matches!(p.status, PeerStatus::Reachable | PeerStatus::Suspected))
            .cloned()
            .collect()
    }

    /// Peers with status = Reachable only, insertion-stable. Used by the
    /// gossip engine and by intermediary selection.
    pub async fn reachable_peers(&self) -> Vec<Peer> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.peers.get(id))
            .filter(|p| p.status == PeerStatus::Reachable)
            .cloned()
            .collect()
    }

    /// `probable_peers()` excluding those currently under a probing hold —
    /// the candidate pool for `select_random_probable`.
    pub async fn probable_peers_excluding_holds(&self) -> Vec<Peer> {
        self.probable_peers()
            .await
            .into_iter()
            .filter(|p| !p.probing_hold)
            .collect()
    }

    pub async fn all_peers(&self) -> Vec<Peer> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.peers.get(id))
            .cloned()
            .collect()
    }
}
