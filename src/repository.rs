//! Collaborator ports for storage: trait definitions only. No persistence
//! logic lives in this crate — the embedding application supplies the
//! implementation.

use crate::error::SyncError;
use crate::model::{ChannelId, Hlc, LogEntry, StreamId};
use crate::vv::VersionVector;
use async_trait::async_trait;

/// Append-only per-`(channel, stream)` log storage, keyed by `(author,
/// sequence)`. The gossip engine reads and writes through this trait only —
/// it never assumes an in-memory representation.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Idempotent: appending an entry whose `(author, sequence)` already
    /// exists is a no-op (the existing entry wins).
    async fn append(
        &self,
        channel: &ChannelId,
        stream: &StreamId,
        entry: LogEntry,
    ) -> Result<(), SyncError>;

    async fn version_vector(&self, channel: &ChannelId, stream: &StreamId) -> VersionVector;

    /// Entries in `(author, sequence)` ascending order, matching the
    /// ordering rule a `DeltaResponse` must preserve.
    async fn entries_since(
        &self,
        channel: &ChannelId,
        stream: &StreamId,
        vv: &VersionVector,
    ) -> Vec<LogEntry>;

    async fn entry_count(&self, channel: &ChannelId, stream: &StreamId) -> u64;
}

/// Enumerates the channels/streams this node participates in. Synchronous —
/// the set is expected to be cheap, locally-cached knowledge rather than a
/// remote lookup.
pub trait ChannelDirectory: Send + Sync {
    fn channels(&self) -> Vec<ChannelId>;
    fn streams(&self, channel: &ChannelId) -> Vec<StreamId>;
}

/// Advances a hybrid logical clock on receipt of a remote timestamp.
/// Construction and the advancement rule itself are the embedder's
/// responsibility — this crate only calls `bump` after merging entries.
pub trait HlcClock: Send + Sync {
    fn bump(&self, remote: Hlc);
}

/// Load/persist port for this node's own identity and incarnation counter.
/// Declared for completeness of the collaborator contract but deliberately
/// unused by the core: loading the id/incarnation at construction time is
/// the embedder's job, and incarnation refutation itself is out of scope.
#[async_trait]
pub trait NodeIdentityStore: Send + Sync {
    async fn load(&self) -> Result<(crate::node_id::NodeId, u64), SyncError>;
    async fn persist(&self, incarnation: u64) -> Result<(), SyncError>;
}
