//! # Multipart framing over a byte stream.
//!
//! The original transport carried multipart messages natively; over a Unix
//! stream socket the same shape is expressed explicitly:
//!
//! ```text
//! message := [u8 part-count] ([u32-be length] [bytes])*
//! ```
//!
//! RPC exchanges use `[packet]` or `[packet, blob]`. The broadcast endpoint
//! speaks the same framing with a channel-name prefix: right after
//! connecting, a subscriber sends `["subscribe", <channel>]` once; the
//! publisher then delivers `[<channel>, <packet>]` or
//! `[<channel>, <packet>, <blob>]` messages for the subscribed channels.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Status channel name on the broadcast endpoint.
pub const CHANNEL_INFO: &str = "info";
/// Media payload channel name (outside this core's scope).
pub const CHANNEL_MEDIA: &str = "media";
/// First part of the one-shot subscription message.
pub const SUBSCRIBE_VERB: &str = "subscribe";

const MAX_PARTS: usize = 16;
const MAX_PART_LEN: usize = 16 * 1024 * 1024;

/// One wire message: an ordered list of byte parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multipart(pub Vec<Bytes>);

impl Multipart {
    /// Builds the `[packet]` / `[packet, blob]` shape used by RPC.
    pub fn packet(packet_bytes: Vec<u8>, blob: Option<Bytes>) -> Self {
        let mut parts = vec![Bytes::from(packet_bytes)];
        if let Some(blob) = blob {
            parts.push(blob);
        }
        Multipart(parts)
    }

    /// Builds the one-shot subscription message for `channel`.
    pub fn subscribe(channel: &str) -> Self {
        Multipart(vec![
            Bytes::from_static(SUBSCRIBE_VERB.as_bytes()),
            Bytes::copy_from_slice(channel.as_bytes()),
        ])
    }

    /// Builds a published message: channel prefix + packet + optional blob.
    pub fn published(channel: &str, packet_bytes: Vec<u8>, blob: Option<Bytes>) -> Self {
        let mut parts = vec![
            Bytes::copy_from_slice(channel.as_bytes()),
            Bytes::from(packet_bytes),
        ];
        if let Some(blob) = blob {
            parts.push(blob);
        }
        Multipart(parts)
    }
}

/// Encoder/decoder for [`Multipart`] messages.
///
/// The decoder never consumes input until a complete message is buffered,
/// so partial reads are safe. Oversized or empty messages are protocol
/// errors, not silent truncations.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultipartCodec;

impl Encoder<Multipart> for MultipartCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: Multipart, dst: &mut BytesMut) -> io::Result<()> {
        if msg.0.is_empty() || msg.0.len() > MAX_PARTS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("multipart message with {} parts", msg.0.len()),
            ));
        }
        let total: usize = msg.0.iter().map(|p| 4 + p.len()).sum();
        dst.reserve(1 + total);
        dst.put_u8(msg.0.len() as u8);
        for part in &msg.0 {
            if part.len() > MAX_PART_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "multipart part too large",
                ));
            }
            dst.put_u32(part.len() as u32);
            dst.put_slice(part);
        }
        Ok(())
    }
}

impl Decoder for MultipartCodec {
    type Item = Multipart;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Multipart>> {
        if src.is_empty() {
            return Ok(None);
        }
        let nparts = src[0] as usize;
        if nparts == 0 || nparts > MAX_PARTS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("multipart message with {nparts} parts"),
            ));
        }

        // Walk the frame without consuming; bail out until fully buffered.
        let mut offset = 1usize;
        for _ in 0..nparts {
            if src.len() < offset + 4 {
                return Ok(None);
            }
            let len = u32::from_be_bytes([
                src[offset],
                src[offset + 1],
                src[offset + 2],
                src[offset + 3],
            ]) as usize;
            if len > MAX_PART_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "multipart part too large",
                ));
            }
            offset += 4 + len;
        }
        if src.len() < offset {
            return Ok(None);
        }

        src.advance(1);
        let mut parts = Vec::with_capacity(nparts);
        for _ in 0..nparts {
            let len = src.get_u32() as usize;
            parts.push(src.split_to(len).freeze());
        }
        Ok(Some(Multipart(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Multipart) -> Multipart {
        let mut codec = MultipartCodec;
        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn test_single_part_round_trip() {
        let msg = Multipart::packet(vec![1, 2, 3], None);
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn test_packet_with_blob_round_trip() {
        let msg = Multipart::packet(vec![9; 40], Some(Bytes::from_static(b"blob")));
        let decoded = round_trip(msg.clone());
        assert_eq!(decoded, msg);
        assert_eq!(decoded.0.len(), 2);
    }

    #[test]
    fn test_published_message_shape() {
        let msg = Multipart::published(CHANNEL_INFO, vec![7], None);
        assert_eq!(&msg.0[0][..], CHANNEL_INFO.as_bytes());
    }

    #[test]
    fn test_partial_input_yields_none() {
        let mut codec = MultipartCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Multipart::packet(vec![5; 100], None), &mut buf)
            .unwrap();
        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_two_messages_in_one_buffer() {
        let mut codec = MultipartCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Multipart::packet(vec![1], None), &mut buf)
            .unwrap();
        codec
            .encode(Multipart::packet(vec![2], None), &mut buf)
            .unwrap();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first.0[0][..], &[1]);
        assert_eq!(&second.0[0][..], &[2]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_zero_part_count_is_an_error() {
        let mut codec = MultipartCodec;
        let mut buf = BytesMut::from(&[0u8][..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
