//! Binary UDP packet codec for the peer synchronization protocol
//!
//! Every packet starts with a single type byte; multi-byte fields are
//! network byte order. Decoding rejects any datagram whose length does
//! not match the declared layout of its type.

use bytes::{Buf, BufMut};
use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

const TYPE_HELLO: u8 = 1;
const TYPE_HELLO_REPLY: u8 = 2;
const TYPE_CONNECT: u8 = 3;
const TYPE_ACK_CONNECT: u8 = 4;
const TYPE_SYNC_START: u8 = 11;
const TYPE_DELAY_REQUEST: u8 = 12;
const TYPE_DELAY_RESPONSE: u8 = 13;
const TYPE_LEADER: u8 = 21;
const TYPE_GET_TIME: u8 = 31;
const TYPE_TIME: u8 = 32;

/// Length of one HELLO_REPLY peer record: addr_len byte + IPv4 + port.
const PEER_RECORD_SIZE: usize = 1 + 4 + 2;
/// A datagram must never reach this size.
pub const MAX_PACKET_SIZE: usize = 65536;

/// Network packets exchanged between nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Ask a known peer for its peer list.
    Hello,
    /// Peer list response; excludes the requester and the responder.
    HelloReply { peers: Vec<SocketAddrV4> },
    /// Ask a discovered peer to add us.
    Connect,
    /// Confirmation that a CONNECT was accepted.
    AckConnect,
    /// Offer to synchronize the receiver, carrying our level and clock.
    SyncStart { sync_level: u8, timestamp: u64 },
    /// Follower's response to SYNC_START, starting the delay measurement.
    DelayRequest,
    /// Upstream's timestamped answer to DELAY_REQUEST.
    DelayResponse { sync_level: u8, timestamp: u64 },
    /// Administrative directive: become leader (0) or step down (255).
    Leader { sync_level: u8 },
    /// Ask the node for its synchronized clock.
    GetTime,
    /// Reply to GET_TIME with level and synchronized clock.
    Time { sync_level: u8, timestamp: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("length does not match declared layout")]
    BadLength,
    #[error("peer record address length is not 4")]
    BadAddressLength,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("HELLO_REPLY would exceed the maximum datagram size")]
    TooLarge,
}

impl Packet {
    /// Short name of the packet type, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Hello => "HELLO",
            Packet::HelloReply { .. } => "HELLO_REPLY",
            Packet::Connect => "CONNECT",
            Packet::AckConnect => "ACK_CONNECT",
            Packet::SyncStart { .. } => "SYNC_START",
            Packet::DelayRequest => "DELAY_REQUEST",
            Packet::DelayResponse { .. } => "DELAY_RESPONSE",
            Packet::Leader { .. } => "LEADER",
            Packet::GetTime => "GET_TIME",
            Packet::Time { .. } => "TIME",
        }
    }

    /// Decodes one datagram.
    pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
        let (&type_byte, mut body) = buf.split_first().ok_or(DecodeError::Empty)?;

        match type_byte {
            TYPE_HELLO => expect_empty(body, Packet::Hello),
            TYPE_CONNECT => expect_empty(body, Packet::Connect),
            TYPE_ACK_CONNECT => expect_empty(body, Packet::AckConnect),
            TYPE_DELAY_REQUEST => expect_empty(body, Packet::DelayRequest),
            TYPE_GET_TIME => expect_empty(body, Packet::GetTime),
            TYPE_HELLO_REPLY => {
                if body.len() < 2 {
                    return Err(DecodeError::BadLength);
                }
                let count = body.get_u16() as usize;
                if body.len() != count * PEER_RECORD_SIZE {
                    return Err(DecodeError::BadLength);
                }
                let mut peers = Vec::with_capacity(count);
                for _ in 0..count {
                    if body.get_u8() != 4 {
                        return Err(DecodeError::BadAddressLength);
                    }
                    let addr = Ipv4Addr::from(body.get_u32());
                    let port = body.get_u16();
                    peers.push(SocketAddrV4::new(addr, port));
                }
                Ok(Packet::HelloReply { peers })
            }
            TYPE_SYNC_START => {
                let (sync_level, timestamp) = decode_level_timestamp(body)?;
                Ok(Packet::SyncStart { sync_level, timestamp })
            }
            TYPE_DELAY_RESPONSE => {
                let (sync_level, timestamp) = decode_level_timestamp(body)?;
                Ok(Packet::DelayResponse { sync_level, timestamp })
            }
            TYPE_TIME => {
                let (sync_level, timestamp) = decode_level_timestamp(body)?;
                Ok(Packet::Time { sync_level, timestamp })
            }
            TYPE_LEADER => {
                if body.len() != 1 {
                    return Err(DecodeError::BadLength);
                }
                Ok(Packet::Leader { sync_level: body.get_u8() })
            }
            other => Err(DecodeError::UnknownType(other)),
        }
    }

    /// Encodes the packet into a datagram.
    ///
    /// Fails only for a HELLO_REPLY that would reach [`MAX_PACKET_SIZE`];
    /// such a reply must not be sent at all.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match self {
            Packet::Hello => Ok(vec![TYPE_HELLO]),
            Packet::Connect => Ok(vec![TYPE_CONNECT]),
            Packet::AckConnect => Ok(vec![TYPE_ACK_CONNECT]),
            Packet::DelayRequest => Ok(vec![TYPE_DELAY_REQUEST]),
            Packet::GetTime => Ok(vec![TYPE_GET_TIME]),
            Packet::HelloReply { peers } => {
                let size = 1 + 2 + peers.len() * PEER_RECORD_SIZE;
                if peers.len() > u16::MAX as usize || size >= MAX_PACKET_SIZE {
                    return Err(EncodeError::TooLarge);
                }
                let mut buf = Vec::with_capacity(size);
                buf.put_u8(TYPE_HELLO_REPLY);
                buf.put_u16(peers.len() as u16);
                for peer in peers {
                    buf.put_u8(4);
                    buf.put_u32(u32::from(*peer.ip()));
                    buf.put_u16(peer.port());
                }
                Ok(buf)
            }
            Packet::SyncStart { sync_level, timestamp } => {
                Ok(encode_level_timestamp(TYPE_SYNC_START, *sync_level, *timestamp))
            }
            Packet::DelayResponse { sync_level, timestamp } => {
                Ok(encode_level_timestamp(TYPE_DELAY_RESPONSE, *sync_level, *timestamp))
            }
            Packet::Time { sync_level, timestamp } => {
                Ok(encode_level_timestamp(TYPE_TIME, *sync_level, *timestamp))
            }
            Packet::Leader { sync_level } => Ok(vec![TYPE_LEADER, *sync_level]),
        }
    }
}

fn expect_empty(body: &[u8], packet: Packet) -> Result<Packet, DecodeError> {
    if body.is_empty() {
        Ok(packet)
    } else {
        Err(DecodeError::BadLength)
    }
}

fn decode_level_timestamp(mut body: &[u8]) -> Result<(u8, u64), DecodeError> {
    if body.len() != 1 + 8 {
        return Err(DecodeError::BadLength);
    }
    Ok((body.get_u8(), body.get_u64()))
}

fn encode_level_timestamp(type_byte: u8, sync_level: u8, timestamp: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 1 + 8);
    buf.put_u8(type_byte);
    buf.put_u8(sync_level);
    buf.put_u64(timestamp);
    buf
}

/// Hex dump of the first 10 bytes of an offending datagram.
pub fn hex_prefix(buf: &[u8]) -> String {
    buf.iter()
        .take(10)
        .map(|b| format!("{:02x}", b))
        .collect()
}
