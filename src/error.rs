//! Error taxonomy — every fault is recovered locally and surfaced through
//! [`crate::callbacks::Observer::on_error`]; there is no fatal path except
//! explicit `stop`/`dispose`.

use crate::node_id::NodeId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Codec decode failure on an incoming frame: unknown tag, length
    /// overflow, invalid UTF-8, or truncation.
    #[error("message corrupted: {0}")]
    MessageCorrupted(String),

    /// A message-port send raised for this recipient. Does not by itself
    /// mutate peer status — that is the failure detector's job via probe
    /// failures.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(NodeId),

    /// Semantic violation: digest for an unknown channel, delta for an
    /// unknown stream, etc.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Lower-level I/O failure surfaced by a port.
    #[error("transport error: {0}")]
    TransportError(String),
}

/// Decode-time error from [`crate::codec`], convertible into
/// [`SyncError::MessageCorrupted`] at the dispatch boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown message tag: {0:#04x}")]
    UnknownTag(u8),
    #[error("length field overflows available buffer")]
    LengthOverflow,
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
    #[error("frame truncated: expected at least {needed} more bytes, got {available}")]
    Truncated { needed: usize, available: usize },
    #[error("empty NodeId in frame")]
    EmptyNodeId,
}

impl From<CodecError> for SyncError {
    fn from(e: CodecError) -> Self {
        SyncError::MessageCorrupted(e.to_string())
    }
}
