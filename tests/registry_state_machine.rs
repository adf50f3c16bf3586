//! Failure-detector-driven registry state transitions at the exact
//! threshold boundaries — complements `registry.rs`'s own unit tests, which
//! exercise `update_status`/`increment_failed_probe` directly rather than
//! through repeated probe rounds.

mod support;

use futures::StreamExt;
use meshsync_core::{Config, FailureDetector, NodeId, PeerRegistry, PeerStatus};
use std::sync::Arc;
use std::time::Duration;
use support::{MockTimePort, Network};

fn config_with_static_timeout(ms: u64) -> Config {
    let mut config = Config::default();
    config.ping_timeout = Some(Duration::from_millis(ms));
    config
}

/// Repeated unanswered probes carry a peer exactly through
/// `Reachable -> Suspected -> Unreachable`, transitioning on the round where
/// `failed_probe_count` first reaches each threshold, never before.
#[tokio::test(start_paused = true)]
async fn repeated_failures_cross_thresholds_at_exact_boundaries() {
    let network = Network::new();
    let node_a = NodeId::new("A");
    let node_b = NodeId::new("B");

    let port_a = network.port_for(node_a.clone());
    // B never responds — no responder task spawned for node_b at all.

    let mut config = config_with_static_timeout(500);
    config.failure_threshold = 3;
    config.unreachable_threshold = 5;

    let registry = Arc::new(PeerRegistry::new());
    registry.add_peer(node_b.clone(), 0).await;

    let detector = Arc::new(FailureDetector::new(
        node_a.clone(),
        Arc::clone(&registry),
        port_a.clone(),
        Arc::new(MockTimePort::new()),
        config,
        Arc::new(()),
    ));

    let detector_pump = Arc::clone(&detector);
    let mut incoming_a = port_a.incoming();
    tokio::spawn(async move {
        while let Some((sender, bytes)) = incoming_a.next().await {
            detector_pump.dispatch(sender, bytes).await;
        }
    });

    // Each round: 500ms direct timeout + 500ms indirect grace window (no
    // intermediaries registered), so 1100ms per round clears both with room
    // to spare.
    for round in 1..=5 {
        let probe = tokio::spawn({
            let detector = Arc::clone(&detector);
            async move { detector.probe_once().await }
        });
        tokio::time::advance(Duration::from_millis(1100)).await;
        probe.await.unwrap().unwrap();

        let peer = registry.get(&node_b).await.unwrap();
        assert_eq!(peer.failed_probe_count, round, "round {round}");

        let expected = if round < 3 {
            PeerStatus::Reachable
        } else if round < 5 {
            PeerStatus::Suspected
        } else {
            PeerStatus::Unreachable
        };
        assert_eq!(peer.status, expected, "status after round {round}");
    }
}

/// A single `handle_ping` from the suspected peer (proof of life arriving on
/// its own, independent of any outstanding probe) reverts status to
/// Reachable and zeroes the failure count — `update_contact`'s reversal
/// path, exercised here through the wire dispatch path rather than called
/// directly.
#[tokio::test(start_paused = true)]
async fn incoming_ping_from_suspected_peer_reverts_to_reachable() {
    let network = Network::new();
    let node_a = NodeId::new("A");
    let node_b = NodeId::new("B");

    let port_a = network.port_for(node_a.clone());

    let registry = Arc::new(PeerRegistry::new());
    registry.add_peer(node_b.clone(), 0).await;
    registry.update_status(&node_b, PeerStatus::Suspected).await;
    registry.increment_failed_probe(&node_b).await;
    registry.increment_failed_probe(&node_b).await;

    let detector = Arc::new(FailureDetector::new(
        node_a.clone(),
        Arc::clone(&registry),
        port_a.clone(),
        Arc::new(MockTimePort::new()),
        config_with_static_timeout(500),
        Arc::new(()),
    ));

    let incoming_ping = meshsync_core::Message::Ping {
        sender: node_b.clone(),
        sequence: 1,
    }
    .encode();
    detector.dispatch(node_b.clone(), incoming_ping).await;

    let peer = registry.get(&node_b).await.unwrap();
    assert_eq!(peer.status, PeerStatus::Reachable);
    assert_eq!(peer.failed_probe_count, 0);
}
