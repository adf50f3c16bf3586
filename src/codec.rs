//! Protocol codec: bidirectional, total, versioned by a single-byte tag.
//! Hand-rolled big-endian framing — not serde, matching the explicit wire
//! layout this protocol specifies. `byteorder` supplies the big-endian
//! primitive reads/writes.

use crate::error::CodecError;
use crate::model::{ChannelId, LogEntry, StreamId};
use crate::node_id::NodeId;
use crate::vv::VersionVector;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

const TAG_PING: u8 = 0x10;
const TAG_ACK: u8 = 0x11;
const TAG_PING_REQ: u8 = 0x12;
const TAG_DIGEST_REQUEST: u8 = 0x20;
const TAG_DIGEST_RESPONSE: u8 = 0x21;
const TAG_DELTA_REQUEST: u8 = 0x22;
const TAG_DELTA_RESPONSE: u8 = 0x23;

/// `{ stream_id, version: VersionVector }` nested inside a [`ChannelDigest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDigest {
    pub stream_id: StreamId,
    pub version: VersionVector,
}

/// `{ channel_id, streams: [StreamDigest] }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDigest {
    pub channel_id: ChannelId,
    pub streams: Vec<StreamDigest>,
}

/// One wire frame. Every variant carries an implicit `sender: NodeId`, which
/// the codec encodes/decodes as the first field after the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping {
        sender: NodeId,
        sequence: u32,
    },
    Ack {
        sender: NodeId,
        sequence: u32,
    },
    PingReq {
        sender: NodeId,
        sequence: u32,
        target: NodeId,
    },
    DigestRequest {
        sender: NodeId,
        digests: Vec<ChannelDigest>,
    },
    DigestResponse {
        sender: NodeId,
        digests: Vec<ChannelDigest>,
    },
    DeltaRequest {
        sender: NodeId,
        channel_id: ChannelId,
        stream_id: StreamId,
        since: VersionVector,
    },
    DeltaResponse {
        sender: NodeId,
        channel_id: ChannelId,
        stream_id: StreamId,
        entries: Vec<LogEntry>,
    },
}

impl Message {
    pub fn sender(&self) -> &NodeId {
        match self {
            Message::Ping { sender, .. }
            | Message::Ack { sender, .. }
            | Message::PingReq { sender, .. }
            | Message::DigestRequest { sender, .. }
            | Message::DigestResponse { sender, .. }
            | Message::DeltaRequest { sender, .. }
            | Message::DeltaResponse { sender, .. } => sender,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::Ping { sender, sequence } => {
                buf.push(TAG_PING);
                write_node_id(&mut buf, sender);
                buf.write_u32::<BigEndian>(*sequence).unwrap();
            }
            Message::Ack { sender, sequence } => {
                buf.push(TAG_ACK);
                write_node_id(&mut buf, sender);
                buf.write_u32::<BigEndian>(*sequence).unwrap();
            }
            Message::PingReq {
                sender,
                sequence,
                target,
            } => {
                buf.push(TAG_PING_REQ);
                write_node_id(&mut buf, sender);
                buf.write_u32::<BigEndian>(*sequence).unwrap();
                write_node_id(&mut buf, target);
            }
            Message::DigestRequest { sender, digests } => {
                buf.push(TAG_DIGEST_REQUEST);
                write_node_id(&mut buf, sender);
                write_digests(&mut buf, digests);
            }
            Message::DigestResponse { sender, digests } => {
                buf.push(TAG_DIGEST_RESPONSE);
                write_node_id(&mut buf, sender);
                write_digests(&mut buf, digests);
            }
            Message::DeltaRequest {
                sender,
                channel_id,
                stream_id,
                since,
            } => {
                buf.push(TAG_DELTA_REQUEST);
                write_node_id(&mut buf, sender);
                write_str(&mut buf, channel_id.as_str());
                write_str(&mut buf, stream_id.as_str());
                write_vv(&mut buf, since);
            }
            Message::DeltaResponse {
                sender,
                channel_id,
                stream_id,
                entries,
            } => {
                buf.push(TAG_DELTA_RESPONSE);
                write_node_id(&mut buf, sender);
                write_str(&mut buf, channel_id.as_str());
                write_str(&mut buf, stream_id.as_str());
                buf.write_u32::<BigEndian>(entries.len() as u32).unwrap();
                for entry in entries {
                    write_node_id(&mut buf, &entry.author);
                    buf.write_u64::<BigEndian>(entry.sequence).unwrap();
                    buf.write_u64::<BigEndian>(entry.timestamp.physical_ms)
                        .unwrap();
                    buf.write_u32::<BigEndian>(entry.timestamp.logical).unwrap();
                    buf.write_u32::<BigEndian>(entry.payload.len() as u32)
                        .unwrap();
                    buf.extend_from_slice(&entry.payload);
                }
            }
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cur = Cursor::new(bytes);
        let tag = read_u8(&mut cur)?;
        let sender = read_node_id(&mut cur)?;
        match tag {
            TAG_PING => Ok(Message::Ping {
                sender,
                sequence: read_u32(&mut cur)?,
            }),
            TAG_ACK => Ok(Message::Ack {
                sender,
                sequence: read_u32(&mut cur)?,
            }),
            TAG_PING_REQ => {
                let sequence = read_u32(&mut cur)?;
                let target = read_node_id(&mut cur)?;
                Ok(Message::PingReq {
                    sender,
                    sequence,
                    target,
                })
            }
            TAG_DIGEST_REQUEST => Ok(Message::DigestRequest {
                sender,
                digests: read_digests(&mut cur)?,
            }),
            TAG_DIGEST_RESPONSE => Ok(Message::DigestResponse {
                sender,
                digests: read_digests(&mut cur)?,
            }),
            TAG_DELTA_REQUEST => {
                let channel_id = ChannelId::new(read_string(&mut cur)?);
                let stream_id = StreamId::new(read_string(&mut cur)?);
                let since = read_vv(&mut cur)?;
                Ok(Message::DeltaRequest {
                    sender,
                    channel_id,
                    stream_id,
                    since,
                })
            }
            TAG_DELTA_RESPONSE => {
                let channel_id = ChannelId::new(read_string(&mut cur)?);
                let stream_id = StreamId::new(read_string(&mut cur)?);
                let count = read_u32(&mut cur)?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let author = read_node_id(&mut cur)?;
                    let sequence = read_u64(&mut cur)?;
                    let physical_ms = read_u64(&mut cur)?;
                    let logical = read_u32(&mut cur)?;
                    let payload_len = read_u32(&mut cur)? as usize;
                    let payload = read_bytes(&mut cur, payload_len)?;
                    entries.push(LogEntry::new(
                        author,
                        sequence,
                        crate::model::Hlc::new(physical_ms, logical),
                        payload,
                    ));
                }
                Ok(Message::DeltaResponse {
                    sender,
                    channel_id,
                    stream_id,
                    entries,
                })
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.write_u32::<BigEndian>(s.len() as u32).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

fn write_node_id(buf: &mut Vec<u8>, id: &NodeId) {
    write_str(buf, id.as_str());
}

fn write_vv(buf: &mut Vec<u8>, vv: &VersionVector) {
    let entries: Vec<_> = vv.iter().collect();
    buf.write_u32::<BigEndian>(entries.len() as u32).unwrap();
    for (author, seq) in entries {
        write_node_id(buf, author);
        buf.write_u64::<BigEndian>(*seq).unwrap();
    }
}

fn write_digests(buf: &mut Vec<u8>, digests: &[ChannelDigest]) {
    buf.write_u32::<BigEndian>(digests.len() as u32).unwrap();
    for digest in digests {
        write_str(buf, digest.channel_id.as_str());
        buf.write_u32::<BigEndian>(digest.streams.len() as u32)
            .unwrap();
        for stream in &digest.streams {
            write_str(buf, stream.stream_id.as_str());
            write_vv(buf, &stream.version);
        }
    }
}

fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    require(cur, 1)?;
    cur.read_u8().map_err(|_| CodecError::Truncated {
        needed: 1,
        available: 0,
    })
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    require(cur, 4)?;
    cur.read_u32::<BigEndian>()
        .map_err(|_| CodecError::LengthOverflow)
}

fn read_u64(cur: &mut Cursor<&[u8]>) -> Result<u64, CodecError> {
    require(cur, 8)?;
    cur.read_u64::<BigEndian>()
        .map_err(|_| CodecError::LengthOverflow)
}

fn read_bytes(cur: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, CodecError> {
    require(cur, len)?;
    let mut buf = vec![0u8; len];
    std::io::Read::read_exact(cur, &mut buf).map_err(|_| CodecError::Truncated {
        needed: len,
        available: remaining(cur),
    })?;
    Ok(buf)
}

fn read_string(cur: &mut Cursor<&[u8]>) -> Result<String, CodecError> {
    let len = read_u32(cur)? as usize;
    let bytes = read_bytes(cur, len)?;
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
}

fn read_node_id(cur: &mut Cursor<&[u8]>) -> Result<NodeId, CodecError> {
    let s = read_string(cur)?;
    NodeId::try_new(s).map_err(|_| CodecError::EmptyNodeId)
}

fn read_vv(cur: &mut Cursor<&[u8]>) -> Result<VersionVector, CodecError> {
    let count = read_u32(cur)?;
    let mut vv = VersionVector::new();
    for _ in 0..count {
        let author = read_node_id(cur)?;
        let seq = read_u64(cur)?;
        vv.set(author, seq);
    }
    Ok(vv)
}

fn read_digests(cur: &mut Cursor<&[u8]>) -> Result<Vec<ChannelDigest>, CodecError> {
    let count = read_u32(cur)?;
    let mut digests = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let channel_id = ChannelId::new(read_string(cur)?);
        let stream_count = read_u32(cur)?;
        let mut streams = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let stream_id = StreamId::new(read_string(cur)?);
            let version = read_vv(cur)?;
            streams.push(StreamDigest { stream_id, version });
        }
        digests.push(ChannelDigest {
            channel_id,
            streams,
        });
    }
    Ok(digests)
}

fn remaining(cur: &Cursor<&[u8]>) -> usize {
    (cur.get_ref().len() as u64).saturating_sub(cur.position()) as usize
}

fn require(cur: &Cursor<&[u8]>, needed: usize) -> Result<(), CodecError> {
    let available = remaining(cur);
    if available < needed {
        Err(CodecError::Truncated { needed, available })
    } else {
        Ok(())
    }
}
