//! Failure detector: adaptive SWIM variant — probe rounds, indirect probing
//! through intermediaries, ack matching, and the peer-state machine.

use crate::callbacks::Observer;
use crate::codec::Message;
use crate::config::Config;
use crate::error::SyncError;
use crate::node_id::NodeId;
use crate::ports::{MessagePort, Priority, TimePort};
use crate::registry::{PeerRegistry, PeerStatus};
use crate::rtt::RttTracker;
use futures::StreamExt;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::pending_ping::PendingPingTable;

pub struct FailureDetector {
    local_id: NodeId,
    registry: Arc<PeerRegistry>,
    message_port: Arc<dyn MessagePort>,
    time_port: Arc<dyn TimePort>,
    config: Config,
    observer: Arc<dyn Observer>,
    pending: Mutex<PendingPingTable>,
    rtt_tracker: Mutex<RttTracker>,
    running: AtomicBool,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl FailureDetector {
    pub fn new(
        local_id: NodeId,
        registry: Arc<PeerRegistry>,
        message_port: Arc<dyn MessagePort>,
        time_port: Arc<dyn TimePort>,
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            local_id,
            registry,
            message_port,
            time_port,
            config,
            observer,
            pending: Mutex::new(PendingPingTable::new()),
            rtt_tracker: Mutex::new(RttTracker::new()),
            running: AtomicBool::new(false),
            handle: StdMutex::new(None),
        }
    }

    /// Idempotent: a second call while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            this.run().await;
        }));
    }

    /// Idempotent: a second call after already stopped is a no-op.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn run(self: Arc<Self>) {
        let mut incoming = self.message_port.incoming();
        while self.running.load(Ordering::SeqCst) {
            let interval = self.effective_probe_interval().await;
            tokio::select! {
                _ = self.time_port.delay(interval) => {
                    if let Err(err) = self.probe_round().await {
                        self.emit_error(SyncError::ProtocolError(err.to_string()));
                    }
                }
                incoming_frame = incoming.next() => {
                    match incoming_frame {
                        Some((sender, bytes)) => self.dispatch(sender, bytes).await,
                        None => break,
                    }
                }
            }
        }
    }

    /// Routes an inbound frame to the SWIM handler for its tag, silently
    /// ignoring gossip-layer frames (digest/delta) — those are consumed by
    /// the gossip engine's own `incoming()` subscription. Public so a
    /// caller that drives the message port's incoming stream itself (rather
    /// than through `run`) can still feed frames to the detector.
    pub async fn dispatch(&self, sender: NodeId, bytes: Vec<u8>) {
        self.registry
            .record_message_received(&sender, bytes.len() as u64, self.time_port.now_ms(), self.config.metrics_window.as_millis() as i64)
            .await;
        let msg = match Message::decode(&bytes) {
            Ok(msg) => msg,
            Err(err) => {
                self.emit_error(SyncError::from(err));
                return;
            }
        };
        match msg {
            Message::Ping { sequence, .. } => self.handle_ping(sender, sequence).await,
            Message::Ack { sequence, .. } => self.handle_ack(sender, sequence).await,
            Message::PingReq {
                sequence, target, ..
            } => self.handle_ping_req(sender, sequence, target).await,
            _ => {}
        }
    }

    fn emit_error(&self, err: SyncError) {
        tracing::warn!(error = %err, "failure detector error");
        self.observer.on_error(&err);
    }

    /// If a static override is configured, return it; else the peer's own
    /// RTT-derived timeout if it has samples, else the global tracker's.
    async fn effective_ping_timeout_for_peer(&self, peer: &NodeId) -> Duration {
        if let Some(static_timeout) = self.config.ping_timeout {
            return static_timeout;
        }
        let min = self.config.min_ping_timeout;
        let max = self.config.max_ping_timeout;
        if let Some(Some(rtt)) = self.registry.get(peer).await.map(|p| p.rtt) {
            if rtt.has_samples() {
                return rtt.suggested_timeout(min, max);
            }
        }
        self.rtt_tracker.lock().await.suggested_timeout(min, max)
    }

    /// Static if configured; else `3 × effective_global_ping_timeout` clamped
    /// to `[500ms, 30s]`.
    async fn effective_probe_interval(&self) -> Duration {
        if let Some(static_interval) = self.config.probe_interval {
            return static_interval;
        }
        let global_timeout = self
            .rtt_tracker
            .lock()
            .await
            .suggested_timeout(self.config.min_ping_timeout, self.config.max_ping_timeout);
        (global_timeout * 3).clamp(self.config.min_probe_interval, self.config.max_probe_interval)
    }

    fn select_random<'a>(&self, candidates: &'a [crate::registry::Peer]) -> Option<&'a crate::registry::Peer> {
        if candidates.is_empty() {
            None
        } else {
            let idx = rand::thread_rng().gen_range(0..candidates.len());
            Some(&candidates[idx])
        }
    }

    /// Runs a single probe round synchronously with the caller — the
    /// scheduling loop in `run` calls `probe_round` on its own timer, but
    /// callers driving the detector manually (or tests) can invoke one round
    /// directly.
    pub async fn probe_once(&self) -> Result<(), SyncError> {
        self.probe_round().await
    }

    /// Runs one probe round: direct ping, then (on timeout) indirect probing
    /// through intermediaries, with a final recheck for a late direct ack
    /// that arrived while the indirect phase was in flight.
    async fn probe_round(&self) -> Result<(), SyncError> {
        let candidates = self.registry.probable_peers_excluding_holds().await;
        let peer = match self.select_random(&candidates) {
            Some(p) => p.id.clone(),
            None => return Ok(()),
        };

        let seq = {
            let mut pending = self.pending.lock().await;
            pending.next_sequence()
        };
        let now = self.time_port.now_ms();
        let waiter = {
            let mut pending = self.pending.lock().await;
            pending.insert(peer.clone(), seq, now)
        };

        let frame = Message::Ping {
            sender: self.local_id.clone(),
            sequence: seq,
        }
        .encode();
        self.send(&peer, frame, Priority::High).await;

        let timeout = self.effective_ping_timeout_for_peer(&peer).await;
        let direct_ack = tokio::select! {
            result = waiter => result.is_ok(),
            _ = self.time_port.delay(timeout) => false,
        };

        let alive = if direct_ack {
            true
        } else {
            let indirect_alive = self.perform_indirect(&peer).await;
            let late_direct_ack = self.pending.lock().await.was_completed(seq);
            if late_direct_ack {
                tracing::debug!(peer = %peer, "recovered during indirect ping phase");
            }
            indirect_alive || late_direct_ack
        };

        // If the original entry was completed late (by either path), cleanup
        // here is a harmless no-op; otherwise it drops the still-pending
        // waker.
        self.pending.lock().await.remove(seq);

        if !alive {
            self.handle_probe_failure(&peer).await;
        } else {
            tracing::debug!(peer = %peer, "probe round succeeded");
        }
        Ok(())
    }

    /// Indirect probe through up to `indirect_fanout` intermediaries.
    async fn perform_indirect(&self, target: &NodeId) -> bool {
        let reachable = self.registry.reachable_peers().await;
        let intermediaries: Vec<_> = reachable
            .into_iter()
            .filter(|p| &p.id != target)
            .take(self.config.indirect_fanout)
            .collect();

        let timeout = self.effective_ping_timeout_for_peer(target).await;
        if intermediaries.is_empty() {
            // Two-device scenario: no one to ask, give the direct ack a
            // grace window.
            self.time_port.delay(timeout).await;
            return false;
        }

        let indirect_seq = self.pending.lock().await.next_sequence();
        let now = self.time_port.now_ms();
        let waiter = self
            .pending
            .lock()
            .await
            .insert(target.clone(), indirect_seq, now);

        for intermediary in &intermediaries {
            let frame = Message::PingReq {
                sender: self.local_id.clone(),
                sequence: indirect_seq,
                target: target.clone(),
            }
            .encode();
            self.send(&intermediary.id, frame, Priority::High).await;
        }

        let acked = tokio::select! {
            result = waiter => result.is_ok(),
            _ = self.time_port.delay(timeout) => false,
        };
        self.pending.lock().await.remove(indirect_seq);
        acked
    }

    /// Intermediary role on receiving `PingReq{seq_r, target}`.
    /// Allocates a **fresh** local sequence — reusing `seq_r` would collide
    /// with unrelated locally-initiated probes in the pending map. Public so
    /// integration tests can drive the intermediary role directly.
    pub async fn handle_ping_req(&self, requester: NodeId, seq_r: u32, target: NodeId) {
        let seq_l = self.pending.lock().await.next_sequence();
        let now = self.time_port.now_ms();
        let waiter = self.pending.lock().await.insert(target.clone(), seq_l, now);

        let frame = Message::Ping {
            sender: self.local_id.clone(),
            sequence: seq_l,
        }
        .encode();
        self.send(&target, frame, Priority::High).await;

        let acked = tokio::select! {
            result = waiter => result.is_ok(),
            _ = self.time_port.delay(self.config.intermediary_timeout) => false,
        };
        self.pending.lock().await.remove(seq_l);

        if acked {
            let reply = Message::Ack {
                sender: self.local_id.clone(),
                sequence: seq_r,
            }
            .encode();
            self.send(&requester, reply, Priority::High).await;
        }
    }

    /// Ack handling. RTT is always attributed to the pending entry's
    /// `target`, never to the ack's `sender` field — an indirect ack's
    /// sender is the intermediary, not the probed peer.
    async fn handle_ack(&self, sender: NodeId, sequence: u32) {
        let now = self.time_port.now_ms();
        self.registry.update_contact(&sender, now).await;

        let completed = self.pending.lock().await.complete(sequence, now);
        if let Some((target, sent_at_ms)) = completed {
            let rtt_ms = now - sent_at_ms;
            if rtt_ms > 0 {
                let rtt = Duration::from_millis(rtt_ms as u64);
                let timeout = self.effective_ping_timeout_for_peer(&target).await;
                if rtt <= timeout {
                    self.registry.record_peer_rtt(&target, rtt).await;
                    self.rtt_tracker.lock().await.record_sample(rtt);
                }
            }
        }
        // Late/unknown acks still updated last-contact above; nothing else
        // to do.
    }

    /// Ping handling — proof of life, no pending entry allocated.
    async fn handle_ping(&self, sender: NodeId, sequence: u32) {
        let now = self.time_port.now_ms();
        self.registry.update_contact(&sender, now).await;
        let reply = Message::Ack {
            sender: self.local_id.clone(),
            sequence,
        }
        .encode();
        self.send(&sender, reply, Priority::High).await;
    }

    /// Best-effort RTT bootstrap for a newly connected peer.
    pub async fn probe_new_peer(&self, peer: &NodeId) {
        let seq = self.pending.lock().await.next_sequence();
        let now = self.time_port.now_ms();
        let waiter = self.pending.lock().await.insert(peer.clone(), seq, now);

        let frame = Message::Ping {
            sender: self.local_id.clone(),
            sequence: seq,
        }
        .encode();
        self.send(peer, frame, Priority::Normal).await;

        let timeout = self.effective_ping_timeout_for_peer(peer).await;
        let received_at = tokio::select! {
            result = waiter => result.ok(),
            _ = self.time_port.delay(timeout) => None,
        };
        self.pending.lock().await.remove(seq);

        if let Some(received_at_ms) = received_at {
            let rtt_ms = received_at_ms - now;
            if rtt_ms > 0 {
                self.registry
                    .record_peer_rtt(peer, Duration::from_millis(rtt_ms as u64))
                    .await;
            }
        }
        // On timeout, no failure is recorded — this is a bootstrap, not a
        // probe round.
    }

    /// Applies a probe failure and advances the health-check state machine.
    async fn handle_probe_failure(&self, peer: &NodeId) {
        self.registry.increment_failed_probe(peer).await;
        let current = match self.registry.get(peer).await {
            Some(p) => p,
            None => return,
        };
        if current.status == PeerStatus::Reachable
            && current.failed_probe_count >= self.config.failure_threshold
        {
            self.registry.update_status(peer, PeerStatus::Suspected).await;
            tracing::warn!(peer = %peer, "peer suspected unreachable");
        } else if current.status == PeerStatus::Suspected
            && current.failed_probe_count >= self.config.unreachable_threshold
        {
            self.registry.update_status(peer, PeerStatus::Unreachable).await;
            tracing::warn!(peer = %peer, "peer marked unreachable");
        }
    }

    pub async fn set_probing_hold(&self, peer: &NodeId, held: bool) {
        self.registry.set_probing_hold(peer, held).await;
    }

    async fn send(&self, dest: &NodeId, bytes: Vec<u8>, priority: Priority) {
        let len = bytes.len() as u64;
        match self.message_port.send(dest, bytes, priority).await {
            Ok(()) => {
                self.registry
                    .record_message_sent(dest, len, self.time_port.now_ms(), self.config.metrics_window.as_millis() as i64)
                    .await;
            }
            Err(err) => self.emit_error(err),
        }
    }
}
