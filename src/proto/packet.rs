//! # Control-channel envelope.
//!
//! A [`Packet`] is the unit exchanged on both the request/reply and the
//! publish/subscribe paths: a small header (type, sequence, operation code,
//! and for replies a status + info string) plus opaque body bytes. The
//! optional raw blob travels as a separate frame and never enters the
//! envelope.
//!
//! ## Reply validity
//! A REPLY is accepted only when its sequence and operation code equal the
//! REQUEST that elicited it and its status lies in `[200, 300)`; see
//! [`Packet::validate_reply`].

use prost::Message;

use crate::error::{Error, Result};

/// Envelope direction/type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PacketType {
    /// RPC request (controller → helper).
    Request = 0,
    /// RPC reply (helper → controller).
    Reply = 1,
    /// One-way published message (helper → subscribers).
    Message = 2,
}

/// Operation codes consumed by this core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OpCode {
    /// Stream metadata query.
    Metadata = 0,
    /// Media payload (pub/sub `media` channel, outside this core).
    Media = 1,
    /// Key-frame request.
    KeyFrame = 2,
    /// Media statistic query.
    MediaStatistic = 3,
    /// Client heartbeat (port-facing helpers).
    ClientHeartbeat = 4,
    /// Connected-client listing.
    ClientList = 5,
    /// Status broadcast (pub/sub `info` channel only).
    StreamInfo = 6,
}

/// Packet header shared by requests, replies, and published messages.
///
/// `status` and `info` are meaningful for replies only.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PacketHeader {
    /// Packet type, see [`PacketType`].
    #[prost(enumeration = "PacketType", tag = "1")]
    pub r#type: i32,
    /// Request/reply correlation sequence (32-bit, wraps).
    #[prost(uint32, tag = "2")]
    pub seq: u32,
    /// Operation code, see [`OpCode`].
    #[prost(enumeration = "OpCode", tag = "3")]
    pub code: i32,
    /// HTTP-like status (REPLY only).
    #[prost(int32, tag = "4")]
    pub status: i32,
    /// Human-readable info string (REPLY only).
    #[prost(string, tag = "5")]
    pub info: ::prost::alloc::string::String,
}

/// Serialized header + opaque body; the first frame of every wire message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Packet {
    /// Envelope header.
    #[prost(message, optional, tag = "1")]
    pub header: Option<PacketHeader>,
    /// Opaque body bytes, decoded per operation code.
    #[prost(bytes = "vec", tag = "2")]
    pub body: ::prost::alloc::vec::Vec<u8>,
}

impl Packet {
    /// Builds a REQUEST packet for the given sequence and operation.
    pub fn request(seq: u32, code: OpCode, body: Vec<u8>) -> Self {
        Self {
            header: Some(PacketHeader {
                r#type: PacketType::Request as i32,
                seq,
                code: code as i32,
                status: 0,
                info: String::new(),
            }),
            body,
        }
    }

    /// Builds a REPLY packet correlated with `seq`/`code`.
    pub fn reply(seq: u32, code: OpCode, status: i32, info: &str, body: Vec<u8>) -> Self {
        Self {
            header: Some(PacketHeader {
                r#type: PacketType::Reply as i32,
                seq,
                code: code as i32,
                status,
                info: info.to_string(),
            }),
            body,
        }
    }

    /// Builds a one-way MESSAGE packet (pub/sub path).
    pub fn message(code: OpCode, body: Vec<u8>) -> Self {
        Self {
            header: Some(PacketHeader {
                r#type: PacketType::Message as i32,
                seq: 0,
                code: code as i32,
                status: 0,
                info: String::new(),
            }),
            body,
        }
    }

    /// Serializes the envelope into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserializes an envelope, failing with `InvalidReply` on garbage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes).map_err(|_| Error::InvalidReply("undecodable packet"))
    }

    /// Header accessor that treats a missing header as a protocol violation.
    pub fn header_checked(&self) -> Result<&PacketHeader> {
        self.header
            .as_ref()
            .ok_or(Error::InvalidReply("missing header"))
    }

    /// Checks that this packet is a valid reply to request `seq`/`code`.
    ///
    /// Fails with [`Error::InvalidReply`] on a type/sequence/code mismatch
    /// and with [`Error::RemoteError`] when the status is outside `[200, 300)`.
    pub fn validate_reply(&self, seq: u32, code: OpCode) -> Result<&PacketHeader> {
        let header = self.header_checked()?;
        if header.r#type != PacketType::Reply as i32 {
            return Err(Error::InvalidReply("not a reply"));
        }
        if header.seq != seq {
            return Err(Error::InvalidReply("sequence mismatch"));
        }
        if header.code != code as i32 {
            return Err(Error::InvalidReply("operation code mismatch"));
        }
        if !(200..300).contains(&header.status) {
            return Err(Error::RemoteError {
                status: header.status,
                info: header.info.clone(),
            });
        }
        Ok(header)
    }
}
