//! Shared test doubles for integration scenarios: an in-process message
//! router and a paused-clock time port. Not a test binary itself — `mod.rs`
//! under a subdirectory of `tests/` is excluded from cargo's test-target
//! discovery.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use meshsync_core::{
    ChannelDirectory, ChannelId, EntryRepository, Hlc, HlcClock, LogEntry, MessagePort, NodeId,
    Observer, Priority, StreamId, SyncError, TimePort, VersionVector,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Network {
    routes: Mutex<HashMap<NodeId, mpsc::UnboundedSender<(NodeId, Vec<u8>)>>>,
    congestion: Mutex<HashMap<(NodeId, NodeId), u32>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            congestion: Mutex::new(HashMap::new()),
        })
    }

    pub fn port_for(self: &Arc<Self>, id: NodeId) -> Arc<MockMessagePort> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().unwrap().insert(id.clone(), tx);
        Arc::new(MockMessagePort {
            self_id: id,
            network: Arc::clone(self),
            receiver: Mutex::new(Some(rx)),
        })
    }

    /// Pins `pending_send_count(from -> to)` for congestion-skip tests.
    pub fn set_congestion(&self, from: &NodeId, to: &NodeId, count: u32) {
        self.congestion
            .lock()
            .unwrap()
            .insert((from.clone(), to.clone()), count);
    }

    fn pending_send_count(&self, from: &NodeId, to: &NodeId) -> u32 {
        self.congestion
            .lock()
            .unwrap()
            .get(&(from.clone(), to.clone()))
            .copied()
            .unwrap_or(0)
    }

    async fn deliver(&self, from: NodeId, to: NodeId, bytes: Vec<u8>) -> Result<(), SyncError> {
        let tx = self.routes.lock().unwrap().get(&to).cloned();
        match tx {
            Some(tx) => {
                let _ = tx.send((from, bytes));
                Ok(())
            }
            None => Err(SyncError::PeerUnreachable(to)),
        }
    }
}

pub struct MockMessagePort {
    self_id: NodeId,
    network: Arc<Network>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<(NodeId, Vec<u8>)>>>,
}

#[async_trait]
impl MessagePort for MockMessagePort {
    async fn send(&self, dest: &NodeId, bytes: Vec<u8>, _priority: Priority) -> Result<(), SyncError> {
        self.network.deliver(self.self_id.clone(), dest.clone(), bytes).await
    }

    fn pending_send_count(&self, peer: &NodeId) -> u32 {
        self.network.pending_send_count(&self.self_id, peer)
    }

    fn incoming(&self) -> BoxStream<'static, (NodeId, Vec<u8>)> {
        let rx = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("incoming() called more than once on this port");
        futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            .boxed()
    }

    async fn close(&self) {}
}

/// Monotonic clock backed by tokio's virtual (pausable) clock — tests drive
/// time with `tokio::time::advance` under `#[tokio::test(start_paused = true)]`.
pub struct MockTimePort {
    start: tokio::time::Instant,
}

impl MockTimePort {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl TimePort for MockTimePort {
    fn now_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    async fn delay(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// In-memory entry store keyed by `(channel, stream)`, backing an
/// `EntryRepository` for gossip scenario tests. Entries within a stream are
/// kept sorted by `(author, sequence)`.
#[derive(Default)]
pub struct InMemoryRepository {
    streams: Mutex<HashMap<(ChannelId, StreamId), Vec<LogEntry>>>,
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds a stream with entries directly, bypassing `append`'s
    /// idempotency check — used to set up a peer's starting state.
    pub fn seed(&self, channel: &ChannelId, stream: &StreamId, entries: Vec<LogEntry>) {
        let mut streams = self.streams.lock().unwrap();
        let slot = streams.entry((channel.clone(), stream.clone())).or_default();
        slot.extend(entries);
        slot.sort_by_key(|e| e.key());
    }

    pub fn entries(&self, channel: &ChannelId, stream: &StreamId) -> Vec<LogEntry> {
        self.streams
            .lock()
            .unwrap()
            .get(&(channel.clone(), stream.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntryRepository for InMemoryRepository {
    async fn append(&self, channel: &ChannelId, stream: &StreamId, entry: LogEntry) -> Result<(), SyncError> {
        let mut streams = self.streams.lock().unwrap();
        let slot = streams.entry((channel.clone(), stream.clone())).or_default();
        if slot.iter().any(|e| e.key() == entry.key()) {
            return Ok(());
        }
        slot.push(entry);
        slot.sort_by_key(|e| e.key());
        Ok(())
    }

    async fn version_vector(&self, channel: &ChannelId, stream: &StreamId) -> VersionVector {
        let streams = self.streams.lock().unwrap();
        let mut vv = VersionVector::new();
        if let Some(entries) = streams.get(&(channel.clone(), stream.clone())) {
            for entry in entries {
                vv.observe(entry.author.clone(), entry.sequence);
            }
        }
        vv
    }

    async fn entries_since(&self, channel: &ChannelId, stream: &StreamId, vv: &VersionVector) -> Vec<LogEntry> {
        let streams = self.streams.lock().unwrap();
        streams
            .get(&(channel.clone(), stream.clone()))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.sequence > vv.get(&e.author))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn entry_count(&self, channel: &ChannelId, stream: &StreamId) -> u64 {
        self.streams
            .lock()
            .unwrap()
            .get(&(channel.clone(), stream.clone()))
            .map(|e| e.len() as u64)
            .unwrap_or(0)
    }
}

/// Fixed channel/stream set for tests — no dynamic provisioning.
pub struct StaticDirectory {
    channels: Vec<(ChannelId, Vec<StreamId>)>,
}

impl StaticDirectory {
    pub fn new(channels: Vec<(ChannelId, Vec<StreamId>)>) -> Arc<Self> {
        Arc::new(Self { channels })
    }
}

impl ChannelDirectory for StaticDirectory {
    fn channels(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|(c, _)| c.clone()).collect()
    }

    fn streams(&self, channel: &ChannelId) -> Vec<StreamId> {
        self.channels
            .iter()
            .find(|(c, _)| c == channel)
            .map(|(_, streams)| streams.clone())
            .unwrap_or_default()
    }
}

/// Records every `Hlc` it was bumped with, for assertion in tests.
#[derive(Default)]
pub struct RecordingHlcClock {
    bumps: Mutex<Vec<Hlc>>,
}

impl RecordingHlcClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bumps(&self) -> Vec<Hlc> {
        self.bumps.lock().unwrap().clone()
    }
}

impl HlcClock for RecordingHlcClock {
    fn bump(&self, remote: Hlc) {
        self.bumps.lock().unwrap().push(remote);
    }
}

/// Counts `on_entries_merged` invocations and records each batch's size.
#[derive(Default)]
pub struct RecordingObserver {
    merges: Mutex<Vec<usize>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn merge_batches(&self) -> Vec<usize> {
        self.merges.lock().unwrap().clone()
    }
}

impl Observer for RecordingObserver {
    fn on_entries_merged(&self, _channel: &ChannelId, _stream: &StreamId, entries: &[LogEntry]) {
        self.merges.lock().unwrap().push(entries.len());
    }
}
