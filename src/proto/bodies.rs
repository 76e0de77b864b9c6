//! # Typed packet bodies, one message per operation code.
//!
//! Field numbering is stable; encode and decode share the same structs so
//! the two sides cannot drift apart. Timestamps follow the documented units:
//! `send_time` and `last_active_time` are seconds (f64), the statistic
//! `timestamp` is milliseconds (u64), and the last-frame time is split into
//! seconds + microseconds as carried on the wire.

/// Sub-stream descriptor inside a METADATA reply.
///
/// Kind-specific fields are flat: video uses `width`/`height`/`fps`/`gov`,
/// audio uses the `samples_*`/`channels`/`bits_per_sample` group, text uses
/// `x`/`y`/`font_size`/`font_type`. Unused fields stay zero.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubStreamMetadataMsg {
    /// Sub-stream index within the stream.
    #[prost(uint32, tag = "1")]
    pub index: u32,
    /// Media kind: 0 video, 1 audio, 2 text, 3 private.
    #[prost(uint32, tag = "2")]
    pub media_type: u32,
    /// Codec name, e.g. `"h264"`.
    #[prost(string, tag = "3")]
    pub codec_name: ::prost::alloc::string::String,
    /// Direction: 0 outbound, 1 inbound.
    #[prost(uint32, tag = "4")]
    pub direction: u32,
    /// Codec extra data (SPS/PPS and the like).
    #[prost(bytes = "vec", tag = "5")]
    pub extra_data: ::prost::alloc::vec::Vec<u8>,

    // video
    #[prost(uint32, tag = "6")]
    pub height: u32,
    #[prost(uint32, tag = "7")]
    pub width: u32,
    #[prost(uint32, tag = "8")]
    pub fps: u32,
    /// Group-of-pictures size.
    #[prost(uint32, tag = "9")]
    pub gov: u32,

    // audio
    #[prost(uint32, tag = "10")]
    pub samples_per_second: u32,
    #[prost(uint32, tag = "11")]
    pub channels: u32,
    #[prost(uint32, tag = "12")]
    pub bits_per_sample: u32,
    #[prost(uint32, tag = "13")]
    pub samples_per_frame: u32,

    // text
    #[prost(uint32, tag = "14")]
    pub x: u32,
    #[prost(uint32, tag = "15")]
    pub y: u32,
    #[prost(uint32, tag = "16")]
    pub font_size: u32,
    #[prost(uint32, tag = "17")]
    pub font_type: u32,
}

/// METADATA reply body.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamMetadataMsg {
    /// Play type: 0 live, 1 replay.
    #[prost(uint32, tag = "1")]
    pub play_type: u32,
    /// Source protocol string, e.g. `"rtsp"`.
    #[prost(string, tag = "2")]
    pub source_proto: ::prost::alloc::string::String,
    /// Stream length in seconds (0 for live).
    #[prost(double, tag = "3")]
    pub stream_len: f64,
    /// Synchronization-source id of the current incarnation.
    #[prost(uint32, tag = "4")]
    pub ssrc: u32,
    /// Nominal bitrate (bits per second).
    #[prost(uint32, tag = "5")]
    pub bps: u32,
    /// Sub-stream descriptors.
    #[prost(message, repeated, tag = "6")]
    pub sub_streams: ::prost::alloc::vec::Vec<SubStreamMetadataMsg>,
}

/// Per-sub-stream counters inside a MEDIA_STATISTIC reply.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubStreamStatisticMsg {
    /// Sub-stream index.
    #[prost(uint32, tag = "1")]
    pub index: u32,
    /// Media kind, same coding as metadata.
    #[prost(uint32, tag = "2")]
    pub media_type: u32,
    /// Total payload bytes.
    #[prost(uint64, tag = "3")]
    pub data_bytes: u64,
    /// Bytes belonging to key frames.
    #[prost(uint64, tag = "4")]
    pub key_bytes: u64,
    /// Lost frame count.
    #[prost(uint64, tag = "5")]
    pub lost_frames: u64,
    /// Data frame count.
    #[prost(uint64, tag = "6")]
    pub data_frames: u64,
    /// Key frame count.
    #[prost(uint64, tag = "7")]
    pub key_frames: u64,
    /// Size of the last group of pictures.
    #[prost(uint32, tag = "8")]
    pub last_gov: u32,
}

/// MEDIA_STATISTIC reply body.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MediaStatisticMsg {
    /// Synchronization-source id the counters belong to.
    #[prost(uint32, tag = "1")]
    pub ssrc: u32,
    /// Helper-side timestamp in milliseconds.
    #[prost(uint64, tag = "2")]
    pub timestamp: u64,
    /// Total bytes across all sub-streams.
    #[prost(uint64, tag = "3")]
    pub sum_bytes: u64,
    /// Per-sub-stream counters.
    #[prost(message, repeated, tag = "4")]
    pub sub_stream_stats: ::prost::alloc::vec::Vec<SubStreamStatisticMsg>,
}

/// CLIENT_LIST request body: a paging window.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientListReq {
    /// First client index to return.
    #[prost(uint32, tag = "1")]
    pub start_index: u32,
    /// Maximum number of clients to return.
    #[prost(uint32, tag = "2")]
    pub client_num: u32,
}

/// One connected client inside a CLIENT_LIST reply.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientInfoMsg {
    /// 4 or 6.
    #[prost(uint32, tag = "1")]
    pub client_ip_version: u32,
    #[prost(string, tag = "2")]
    pub client_ip: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub client_port: u32,
    #[prost(string, tag = "4")]
    pub client_token: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub client_protocol: ::prost::alloc::string::String,
    /// Free-text field.
    #[prost(string, tag = "6")]
    pub client_text: ::prost::alloc::string::String,
    /// Last activity time in seconds.
    #[prost(double, tag = "7")]
    pub last_active_time: f64,
}

/// CLIENT_LIST reply body.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientListRep {
    /// Total connected clients (not just this page).
    #[prost(uint32, tag = "1")]
    pub total_num: u32,
    /// Echo of the request's start index.
    #[prost(uint32, tag = "2")]
    pub start_index: u32,
    /// The requested page.
    #[prost(message, repeated, tag = "3")]
    pub client_list: ::prost::alloc::vec::Vec<ClientInfoMsg>,
}

/// CLIENT_HEARTBEAT request body: one client refreshing its lease.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientHeartbeatReq {
    /// The client keeping itself alive.
    #[prost(message, optional, tag = "1")]
    pub client: ::core::option::Option<ClientInfoMsg>,
}

/// CLIENT_HEARTBEAT reply body.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientHeartbeatRep {
    /// Lease duration in seconds; the client must beat again before it runs
    /// out or the helper drops it from the client list.
    #[prost(uint32, tag = "1")]
    pub lease: u32,
}

/// STREAM_INFO status message published on the `info` channel.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamInfoMsg {
    /// Stream state code; non-negative codes are non-error states.
    #[prost(int32, tag = "1")]
    pub state: i32,
    /// Play type: 0 live, 1 replay.
    #[prost(uint32, tag = "2")]
    pub play_type: u32,
    /// Source protocol string.
    #[prost(string, tag = "3")]
    pub source_proto: ::prost::alloc::string::String,
    /// Synchronization-source id of the current incarnation.
    #[prost(uint32, tag = "4")]
    pub ssrc: u32,
    /// Current bitrate (bits per second).
    #[prost(uint32, tag = "5")]
    pub cur_bps: u32,
    /// Last media frame time, seconds part.
    #[prost(int64, tag = "6")]
    pub last_frame_sec: i64,
    /// Last media frame time, microseconds part.
    #[prost(int32, tag = "7")]
    pub last_frame_usec: i32,
    /// Helper-side send time in seconds since the epoch.
    #[prost(double, tag = "8")]
    pub send_time: f64,
    /// Connected-client count.
    #[prost(uint32, tag = "9")]
    pub client_num: u32,
}

impl StreamInfoMsg {
    /// Last frame time as fractional seconds.
    #[inline]
    pub fn last_frame_time(&self) -> f64 {
        self.last_frame_sec as f64 + f64::from(self.last_frame_usec) / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_client_list_round_trip() {
        let req = ClientListReq {
            start_index: 0,
            client_num: 100,
        };
        let decoded = ClientListReq::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, req);

        let rep = ClientListRep {
            total_num: 2,
            start_index: 0,
            client_list: vec![ClientInfoMsg {
                client_ip_version: 4,
                client_ip: "10.0.0.7".into(),
                client_port: 31000,
                client_token: "tok-1".into(),
                client_protocol: "rtsp".into(),
                client_text: "player".into(),
                last_active_time: 1_700_000_123.5,
            }],
        };
        let decoded = ClientListRep::decode(rep.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, rep);
        assert_eq!(decoded.client_list[0].last_active_time, 1_700_000_123.5);
    }

    #[test]
    fn test_metadata_round_trip_keeps_substream_fields() {
        let meta = StreamMetadataMsg {
            play_type: 0,
            source_proto: "rtsp".into(),
            stream_len: 0.0,
            ssrc: 0xDEAD_BEEF,
            bps: 2_000_000,
            sub_streams: vec![SubStreamMetadataMsg {
                index: 0,
                media_type: 0,
                codec_name: "h264".into(),
                direction: 0,
                extra_data: vec![0, 0, 0, 1],
                height: 1080,
                width: 1920,
                fps: 25,
                gov: 50,
                ..Default::default()
            }],
        };
        let decoded = StreamMetadataMsg::decode(meta.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.sub_streams[0].gov, 50);
    }

    #[test]
    fn test_statistic_key_frames_is_a_count() {
        let stat = MediaStatisticMsg {
            ssrc: 1,
            timestamp: 1_700_000_000_000,
            sum_bytes: 10_000,
            sub_stream_stats: vec![SubStreamStatisticMsg {
                index: 0,
                media_type: 0,
                data_bytes: 9_000,
                key_bytes: 4_000,
                lost_frames: 1,
                data_frames: 240,
                key_frames: 10,
                last_gov: 50,
            }],
        };
        let decoded = MediaStatisticMsg::decode(stat.encode_to_vec().as_slice()).unwrap();
        let sub = &decoded.sub_stream_stats[0];
        // counts and byte totals must stay distinct fields
        assert_eq!(sub.key_frames, 10);
        assert_eq!(sub.key_bytes, 4_000);
    }

    #[test]
    fn test_stream_info_last_frame_time() {
        let info = StreamInfoMsg {
            last_frame_sec: 100,
            last_frame_usec: 250_000,
            ..Default::default()
        };
        assert!((info.last_frame_time() - 100.25).abs() < 1e-9);
    }
}
