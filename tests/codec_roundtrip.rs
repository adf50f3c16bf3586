//! Codec robustness beyond the per-variant round trips already covered by
//! `codec.rs`'s own inline tests: truncation at every prefix length must
//! never panic, and arbitrary binary payloads must survive length-prefixed
//! framing untouched.

use meshsync_core::{ChannelDigest, ChannelId, Hlc, LogEntry, Message, NodeId, StreamDigest, StreamId, VersionVector};

#[test]
fn truncation_at_every_prefix_length_is_rejected_never_panics() {
    let mut version = VersionVector::new();
    version.observe(NodeId::new("author-a"), 3);
    version.observe(NodeId::new("author-b"), 9);

    let msg = Message::DigestRequest {
        sender: NodeId::new("requester"),
        digests: vec![ChannelDigest {
            channel_id: ChannelId::new("channel/with/slashes"),
            streams: vec![
                StreamDigest {
                    stream_id: StreamId::new("stream-1"),
                    version: version.clone(),
                },
                StreamDigest {
                    stream_id: StreamId::new("stream-2"),
                    version,
                },
            ],
        }],
    };
    let bytes = msg.encode();
    assert!(bytes.len() > 16, "fixture should be a nontrivial frame");

    for len in 0..bytes.len() {
        let prefix = &bytes[..len];
        // Must never panic; a prefix strictly shorter than the full frame
        // should never decode successfully.
        let result = Message::decode(prefix);
        assert!(result.is_err(), "prefix of length {len} decoded successfully");
    }

    // The full frame does decode.
    assert_eq!(Message::decode(&bytes).unwrap(), msg);
}

#[test]
fn delta_response_preserves_arbitrary_binary_payload() {
    // A payload that looks like it could be misread as a length prefix if
    // the framing code ever got careless about ordering reads.
    let adversarial_payload: Vec<u8> = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 1, 2, 3];

    let msg = Message::DeltaResponse {
        sender: NodeId::new("responder"),
        channel_id: ChannelId::new("ch"),
        stream_id: StreamId::new("s"),
        entries: vec![
            LogEntry::new(
                NodeId::new("author"),
                1,
                Hlc::new(1_700_000_000_000, 0),
                adversarial_payload.clone(),
            ),
            LogEntry::new(NodeId::new("author"), 2, Hlc::new(1_700_000_000_500, 1), vec![]),
        ],
    };

    let decoded = Message::decode(&msg.encode()).unwrap();
    match decoded {
        Message::DeltaResponse { entries, .. } => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].payload, adversarial_payload);
            assert!(entries[1].payload.is_empty());
            assert_eq!(entries[0].sequence, 1);
            assert_eq!(entries[1].sequence, 2);
        }
        other => panic!("expected DeltaResponse, got {other:?}"),
    }
}

#[test]
fn sender_is_readable_without_full_decode_knowledge() {
    let msg = Message::Ack {
        sender: NodeId::new("ack-sender"),
        sequence: 5,
    };
    assert_eq!(msg.sender(), &NodeId::new("ack-sender"));
}
