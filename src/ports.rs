//! Collaborator ports: the two abstract boundaries the failure detector and
//! gossip engine are driven through — monotonic time and message transport.
//! Both are genuinely polymorphic collaborator boundaries, so they are
//! traits rather than concrete structs, and callers hold them behind
//! `Arc<dyn ...>`.

use crate::error::SyncError;
use crate::node_id::NodeId;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
}

/// Monotonic clock plus cancellable delay, injected so tests can drive time
/// deterministically (`tokio::time::pause`/`advance`).
#[async_trait]
pub trait TimePort: Send + Sync {
    fn now_ms(&self) -> i64;
    async fn delay(&self, d: Duration);

    /// Number of delays currently outstanding against this port. Optional —
    /// only test harnesses that want to assert on scheduling shape implement
    /// it; production ports may leave the default.
    fn pending_delay_count(&self) -> Option<usize> {
        None
    }
}

/// Transport-agnostic byte-frame send/receive boundary.
#[async_trait]
pub trait MessagePort: Send + Sync {
    async fn send(&self, dest: &NodeId, bytes: Vec<u8>, priority: Priority)
        -> Result<(), SyncError>;

    fn pending_send_count(&self, peer: &NodeId) -> u32;

    /// Push-based incoming frames as `(sender, bytes)` pairs. A `BoxStream`
    /// keeps the port transport-agnostic rather than committing callers to
    /// a specific channel type.
    fn incoming(&self) -> BoxStream<'static, (NodeId, Vec<u8>)>;

    async fn close(&self);
}
