//! Peer-to-peer eventual-consistency engine: a SWIM-style failure detector
//! paired with a version-vector anti-entropy gossip engine.
//!
//! A node discovers peers over a pluggable transport ([`ports::MessagePort`]),
//! learns which peers are reachable via [`failure_detector::FailureDetector`],
//! and periodically exchanges log entries across channels/streams via
//! [`gossip::GossipEngine`]. Both components share a [`registry::PeerRegistry`]
//! and the two ports; entry storage, channel/stream provisioning, and
//! hybrid-logical-clock construction are collaborator traits ([`repository`])
//! implemented by the embedding application — this crate is a library only.

pub mod callbacks;
pub mod codec;
pub mod config;
pub mod error;
pub mod failure_detector;
pub mod gossip;
pub mod model;
pub mod node_id;
pub mod pending_delta;
pub mod pending_ping;
pub mod ports;
pub mod registry;
pub mod repository;
pub mod rtt;
pub mod vv;

pub use callbacks::Observer;
pub use codec::{ChannelDigest, Message, StreamDigest};
pub use config::Config;
pub use error::{CodecError, SyncError};
pub use failure_detector::FailureDetector;
pub use gossip::GossipEngine;
pub use model::{ChannelId, Hlc, LogEntry, StreamId};
pub use node_id::NodeId;
pub use ports::{MessagePort, Priority, TimePort};
pub use registry::{Peer, PeerMetrics, PeerRegistry, PeerStatus};
pub use repository::{ChannelDirectory, EntryRepository, HlcClock, NodeIdentityStore};
pub use rtt::{RttEstimate, RttTracker};
pub use vv::VersionVector;
