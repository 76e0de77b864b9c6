//! Control-channel wire protocol: envelope, typed bodies, multipart framing.
//!
//! Both the RPC path and the pub/sub path carry the same envelope
//! ([`Packet`]): frame 1 is the serialized header+body message, an optional
//! frame 2 is a raw blob. Bodies are protobuf messages, one per operation
//! code.

mod bodies;
mod frame;
mod packet;

pub use bodies::{
    ClientHeartbeatRep, ClientHeartbeatReq, ClientInfoMsg, ClientListRep, ClientListReq,
    MediaStatisticMsg, StreamInfoMsg, StreamMetadataMsg, SubStreamMetadataMsg,
    SubStreamStatisticMsg,
};
pub use frame::{Multipart, MultipartCodec, CHANNEL_INFO, CHANNEL_MEDIA, SUBSCRIBE_VERB};
pub use packet::{OpCode, Packet, PacketHeader, PacketType};
