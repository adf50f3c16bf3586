//! Gossip engine: four-step anti-entropy (digest request / digest response /
//! delta request / delta response) driven by version vectors, with
//! single-flight delta deduplication and adaptive pacing tied to the failure
//! detector's RTT signal.

use crate::callbacks::Observer;
use crate::codec::{ChannelDigest, Message, StreamDigest};
use crate::config::Config;
use crate::error::SyncError;
use crate::model::{ChannelId, StreamId};
use crate::node_id::NodeId;
use crate::pending_delta::PendingDeltaTable;
use crate::ports::{MessagePort, Priority, TimePort};
use crate::registry::PeerRegistry;
use crate::repository::{ChannelDirectory, EntryRepository, HlcClock};
use futures::StreamExt;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct GossipEngine {
    local_id: NodeId,
    registry: Arc<PeerRegistry>,
    message_port: Arc<dyn MessagePort>,
    time_port: Arc<dyn TimePort>,
    entry_repository: Arc<dyn EntryRepository>,
    channel_directory: Arc<dyn ChannelDirectory>,
    hlc: Option<Arc<dyn HlcClock>>,
    config: Config,
    observer: Arc<dyn Observer>,
    pending_delta: Mutex<PendingDeltaTable>,
    running: AtomicBool,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl GossipEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_id: NodeId,
        registry: Arc<PeerRegistry>,
        message_port: Arc<dyn MessagePort>,
        time_port: Arc<dyn TimePort>,
        entry_repository: Arc<dyn EntryRepository>,
        channel_directory: Arc<dyn ChannelDirectory>,
        hlc: Option<Arc<dyn HlcClock>>,
        config: Config,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            local_id,
            registry,
            message_port,
            time_port,
            entry_repository,
            channel_directory,
            hlc,
            config,
            observer,
            pending_delta: Mutex::new(PendingDeltaTable::new()),
            running: AtomicBool::new(false),
            handle: StdMutex::new(None),
        }
    }

    /// Idempotent.
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

    /// Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn run(self: Arc<Self>) {
        let mut incoming = self.message_port.incoming();
        while self.running.load(Ordering::SeqCst) {
            let interval = self.effective_gossip_interval().await;
            tokio::select! {
                _ = self.time_port.delay(interval) => {
                    self.gossip_round().await;
                }
                incoming_frame = incoming.next() => {
                    match incoming_frame {
                        Some((sender, bytes)) => self.dispatch(sender, bytes).await,
                        None => break,
                    }
                }
            }
            self.sweep_stale_pending().await;
        }
    }

    /// Routes an inbound frame to the gossip handler for its tag, ignoring
    /// SWIM frames — those belong to the failure detector's own
    /// `incoming()` subscription. Public so a caller driving the incoming
    /// stream itself (rather than through `run`) can still feed frames in.
    pub async fn dispatch(&self, sender: NodeId, bytes: Vec<u8>) {
        let msg = match Message::decode(&bytes) {
            Ok(msg) => msg,
            Err(err) => {
                self.emit_error(SyncError::from(err));
                return;
            }
        };
        match msg {
            Message::DigestRequest { .. } => self.handle_digest_request(sender).await,
            Message::DigestResponse { digests, .. } => {
                self.handle_digest_response(sender, digests).await
            }
            Message::DeltaRequest {
                channel_id,
                stream_id,
                since,
                ..
            } => {
                self.handle_delta_request(sender, channel_id, stream_id, since)
                    .await
            }
            Message::DeltaResponse {
                channel_id,
                stream_id,
                entries,
                ..
            } => {
                self.handle_delta_response(sender, channel_id, stream_id, entries)
                    .await
            }
            _ => {}
        }
    }

    fn emit_error(&self, err: SyncError) {
        tracing::warn!(error = %err, "gossip engine error");
        self.observer.on_error(&err);
    }

    /// Static override if configured (adaptive timing disabled); else
    /// `2 × min(per-peer SRTT for reachable peers)` clamped to `[100ms,
    /// 5s]`; a conservative 1s default when adaptive timing is enabled but
    /// no peer yet has an RTT sample.
    async fn effective_gossip_interval(&self) -> Duration {
        if !self.config.adaptive_timing_enabled {
            return self.config.gossip_interval;
        }
        let reachable = self.registry.reachable_peers().await;
        let min_srtt = reachable
            .iter()
            .filter_map(|p| p.rtt)
            .filter(|rtt| rtt.has_samples())
            .map(|rtt| rtt.smoothed_rtt)
            .min();
        match min_srtt {
            Some(srtt) => {
                (srtt * 2).clamp(self.config.min_gossip_interval, self.config.max_gossip_interval)
            }
            None => Duration::from_secs(1),
        }
    }

    async fn build_digests(&self) -> Vec<ChannelDigest> {
        let mut digests = Vec::new();
        for channel_id in self.channel_directory.channels() {
            let mut streams = Vec::new();
            for stream_id in self.channel_directory.streams(&channel_id) {
                let version = self.entry_repository.version_vector(&channel_id, &stream_id).await;
                streams.push(StreamDigest { stream_id, version });
            }
            digests.push(ChannelDigest {
                channel_id,
                streams,
            });
        }
        digests
    }

    /// Runs a single gossip round directly — `run`'s scheduling loop calls
    /// `gossip_round` on its own timer, but manual drivers and tests can
    /// invoke one round without starting the background task.
    pub async fn gossip_once(&self) {
        self.gossip_round().await;
    }

    /// Selects a peer below the congestion threshold and sends it a digest
    /// request.
    async fn gossip_round(&self) {
        let reachable = self.registry.reachable_peers().await;
        let candidates: Vec<_> = reachable
            .into_iter()
            .filter(|p| {
                self.message_port.pending_send_count(&p.id)
                    < self.config.peer_congestion_threshold
            })
            .collect();
        let peer = if candidates.is_empty() {
            return;
        } else {
            let idx = rand::thread_rng().gen_range(0..candidates.len());
            candidates[idx].id.clone()
        };

        let digests = self.build_digests().await;
        let frame = Message::DigestRequest {
            sender: self.local_id.clone(),
            digests,
        }
        .encode();
        self.send(&peer, frame, Priority::High).await;
    }

    async fn handle_digest_request(&self, sender: NodeId) {
        let digests = self.build_digests().await;
        let frame = Message::DigestResponse {
            sender: self.local_id.clone(),
            digests,
        }
        .encode();
        self.send(&sender, frame, Priority::Normal).await;
    }

    /// For each (channel, stream) in the response, request a delta wherever
    /// the peer is ahead on any author, unless a live single-flight request
    /// already covers that key.
    async fn handle_digest_response(&self, sender: NodeId, digests: Vec<ChannelDigest>) {
        let known_channels: std::collections::HashSet<_> =
            self.channel_directory.channels().into_iter().collect();
        let now = self.time_port.now_ms();

        for digest in digests {
            if !known_channels.contains(&digest.channel_id) {
                self.emit_error(SyncError::ProtocolError(format!(
                    "digest for unknown channel {}",
                    digest.channel_id
                )));
                continue;
            }
            for stream in digest.streams {
                let local_vv = self
                    .entry_repository
                    .version_vector(&digest.channel_id, &stream.stream_id)
                    .await;
                if !local_vv.is_behind(&stream.version) {
                    continue;
                }
                let already_live = self
                    .pending_delta
                    .lock()
                    .await
                    .has_live(
                        &digest.channel_id,
                        &stream.stream_id,
                        now,
                        self.config.pending_delta_ttl.as_millis() as i64,
                    );
                if already_live {
                    continue;
                }
                self.pending_delta.lock().await.insert(
                    sender.clone(),
                    digest.channel_id.clone(),
                    stream.stream_id.clone(),
                    now,
                );
                let frame = Message::DeltaRequest {
                    sender: self.local_id.clone(),
                    channel_id: digest.channel_id.clone(),
                    stream_id: stream.stream_id.clone(),
                    since: local_vv,
                }
                .encode();
                self.send(&sender, frame, Priority::Normal).await;
            }
        }
    }

    /// Responder side — computes missing entries in `(author, sequence)`
    /// ascending order (guaranteed by the entry repository) and replies.
    /// Rejects a request against a stream the channel directory doesn't
    /// recognize rather than answering with an empty delta.
    async fn handle_delta_request(
        &self,
        sender: NodeId,
        channel_id: ChannelId,
        stream_id: StreamId,
        since: crate::vv::VersionVector,
    ) {
        let known_streams = self.channel_directory.streams(&channel_id);
        if !known_streams.contains(&stream_id) {
            self.emit_error(SyncError::ProtocolError(format!(
                "delta for unknown stream {stream_id} in channel {channel_id}"
            )));
            return;
        }
        let entries = self
            .entry_repository
            .entries_since(&channel_id, &stream_id, &since)
            .await;
        let frame = Message::DeltaResponse {
            sender: self.local_id.clone(),
            channel_id,
            stream_id,
            entries,
        }
        .encode();
        self.send(&sender, frame, Priority::Normal).await;
    }

    /// Initiator side — merges entries (idempotent: existing wins), fires
    /// `on_entries_merged`, bumps the HLC by each entry's timestamp if one
    /// is present, and clears the pending-delta entry.
    async fn handle_delta_response(
        &self,
        _sender: NodeId,
        channel_id: ChannelId,
        stream_id: StreamId,
        entries: Vec<crate::model::LogEntry>,
    ) {
        for entry in &entries {
            if let Err(err) = self
                .entry_repository
                .append(&channel_id, &stream_id, entry.clone())
                .await
            {
                self.emit_error(err);
            }
            if let Some(hlc) = &self.hlc {
                hlc.bump(entry.timestamp);
            }
        }
        if !entries.is_empty() {
            self.observer
                .on_entries_merged(&channel_id, &stream_id, &entries);
        }
        self.pending_delta.lock().await.clear(&channel_id, &stream_id);
    }

    async fn sweep_stale_pending(&self) {
        let now = self.time_port.now_ms();
        let ttl_ms = self.config.pending_delta_ttl.as_millis() as i64;
        let stale = self.pending_delta.lock().await.evict_stale(now, ttl_ms);
        for entry in stale {
            tracing::debug!(
                peer = %entry.peer,
                channel = %entry.channel,
                stream = %entry.stream,
                "pending delta request abandoned",
            );
        }
    }

    /// Drops all pending-delta bookkeeping for a peer that has disconnected.
    pub async fn clear_pending_requests(&self, peer: &NodeId) {
        self.pending_delta.lock().await.clear_pending_requests(peer);
    }

    async fn send(&self, dest: &NodeId, bytes: Vec<u8>, priority: Priority) {
        let len = bytes.len() as u64;
        match self.message_port.send(dest, bytes, priority).await {
            Ok(()) => {
                self.registry
                    .record_message_sent(
                        dest,
                        len,
                        self.time_port.now_ms(),
                        self.config.metrics_window.as_millis() as i64,
                    )
                    .await;
            }
            Err(err) => self.emit_error(err),
        }
    }
}
