//! Observability callbacks: optional, default no-op hooks flowing outward
//! from both cores. Data never flows back in through an `Observer` — it
//! exists purely for the embedder to watch.

use crate::error::SyncError;
use crate::model::{ChannelId, LogEntry, StreamId};

/// Object-safe observer with default no-op methods, so embedders only
/// implement the callbacks they care about. `()` implements it with all
/// defaults and is the crate default — significant events are always
/// logged directly via `tracing` regardless of whether an observer is
/// installed.
pub trait Observer: Send + Sync {
    fn on_error(&self, _err: &SyncError) {}
    fn on_log(&self, _level: tracing::Level, _message: &str) {}
    fn on_entries_merged(&self, _channel: &ChannelId, _stream: &StreamId, _entries: &[LogEntry]) {}
}

impl Observer for () {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_observer_is_a_noop() {
        let observer: &dyn Observer = &();
        observer.on_error(&SyncError::ProtocolError("test".into()));
        observer.on_log(tracing::Level::INFO, "hello");
        observer.on_entries_merged(&ChannelId::new("c"), &StreamId::new("s"), &[]);
    }
}
