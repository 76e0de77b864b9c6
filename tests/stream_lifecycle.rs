//! End-to-end stream lifecycle against an in-process fake helper.
//!
//! The fake binds both control sockets of one entity: the `api` responder
//! answers METADATA / MEDIA_STATISTIC / KEY_FRAME / CLIENT_LIST with the
//! current ssrc, and the `broadcast` publisher pushes STREAM_INFO every
//! 50 ms. Whenever an api connection closes the fake picks a new ssrc,
//! mimicking a source that reconnects after a restart request.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::UnixListener;
use tokio_util::codec::Framed;

use streamvisor::channel::ControlEndpoint;
use streamvisor::proto::{
    ClientListRep, MediaStatisticMsg, Multipart, MultipartCodec, OpCode, Packet, StreamInfoMsg,
    StreamMetadataMsg, CHANNEL_INFO,
};
use streamvisor::state::StatusSnapshot;
use streamvisor::stream::{register_passive_source_type, StreamConfig, StreamEntity, StreamMode};
use streamvisor::{Config, Controller, StreamState};

/// Makes crate logs visible under `RUST_LOG=streamvisor=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

fn spawn_fake_helper(endpoint: &ControlEndpoint) -> Arc<AtomicU32> {
    endpoint.ensure_dir().unwrap();
    let ssrc = Arc::new(AtomicU32::new(0x1000));
    let api = UnixListener::bind(&endpoint.api).unwrap();
    let broadcast = UnixListener::bind(&endpoint.broadcast).unwrap();
    tokio::spawn(run_api(api, Arc::clone(&ssrc)));
    tokio::spawn(run_broadcast(broadcast, Arc::clone(&ssrc)));
    ssrc
}

async fn run_api(listener: UnixListener, ssrc: Arc<AtomicU32>) {
    loop {
        let Ok((conn, _)) = listener.accept().await else {
            return;
        };
        let ssrc = Arc::clone(&ssrc);
        tokio::spawn(async move {
            let mut framed = Framed::new(conn, MultipartCodec);
            while let Some(Ok(msg)) = framed.next().await {
                let request = Packet::from_bytes(&msg.0[0]).unwrap();
                let header = request.header.clone().unwrap();
                let code = OpCode::try_from(header.code).unwrap();
                let current = ssrc.load(Ordering::SeqCst);
                let body = match code {
                    OpCode::Metadata => StreamMetadataMsg {
                        play_type: 0,
                        source_proto: "rtsp".into(),
                        stream_len: 0.0,
                        ssrc: current,
                        bps: 2_000_000,
                        sub_streams: vec![],
                    }
                    .encode_to_vec(),
                    OpCode::MediaStatistic => MediaStatisticMsg {
                        ssrc: current,
                        timestamp: 1,
                        sum_bytes: 0,
                        sub_stream_stats: vec![],
                    }
                    .encode_to_vec(),
                    OpCode::ClientList => ClientListRep {
                        total_num: 0,
                        start_index: 0,
                        client_list: vec![],
                    }
                    .encode_to_vec(),
                    _ => Vec::new(),
                };
                let reply = Packet::reply(header.seq, code, 200, "OK", body);
                if framed
                    .send(Multipart::packet(reply.to_bytes(), None))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            // the controller dropped the exchange socket: next incarnation
            ssrc.fetch_add(1, Ordering::SeqCst);
        });
    }
}

async fn run_broadcast(listener: UnixListener, ssrc: Arc<AtomicU32>) {
    loop {
        let Ok((conn, _)) = listener.accept().await else {
            return;
        };
        let ssrc = Arc::clone(&ssrc);
        tokio::spawn(async move {
            let mut framed = Framed::new(conn, MultipartCodec);
            let Some(Ok(handshake)) = framed.next().await else {
                return;
            };
            assert_eq!(&handshake.0[1][..], CHANNEL_INFO.as_bytes());
            loop {
                let info = StreamInfoMsg {
                    state: StreamState::Ok.code(),
                    play_type: 0,
                    source_proto: "rtsp".into(),
                    ssrc: ssrc.load(Ordering::SeqCst),
                    cur_bps: 1_900_000,
                    last_frame_sec: 0,
                    last_frame_usec: 0,
                    send_time: now_secs(),
                    client_num: 1,
                };
                let packet = Packet::message(OpCode::StreamInfo, info.encode_to_vec());
                let msg = Multipart::published(CHANNEL_INFO, packet.to_bytes(), None);
                if framed.send(msg).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });
    }
}

async fn wait_for(
    entity: &StreamEntity,
    what: &str,
    deadline: Duration,
    pred: impl Fn(&StatusSnapshot) -> bool,
) -> StatusSnapshot {
    let begun = Instant::now();
    loop {
        let snap = entity.status();
        if pred(&snap) {
            return snap;
        }
        assert!(
            begun.elapsed() < deadline,
            "timed out waiting for {what}; last state {} ssrc {:#x}",
            snap.state,
            snap.ssrc
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_stream_lifecycle_against_fake_helper() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        channel_root: dir.path().to_path_buf(),
        ..Config::default()
    };
    let controller = Controller::new(config);
    register_passive_source_type(controller.streams(), controller.context(), "fake").unwrap();

    let endpoint = ControlEndpoint::new(dir.path(), "cam-1");
    spawn_fake_helper(&endpoint);

    let stream_config = StreamConfig {
        mode: StreamMode::Passive,
        ..Default::default()
    };
    let stream = controller
        .streams()
        .create("fake", "cam-1", stream_config)
        .await
        .unwrap();

    // the status feed takes over within 2 s
    let snap = wait_for(&stream, "initial Ok", Duration::from_secs(2), |s| {
        s.state == StreamState::Ok
    })
    .await;
    assert_eq!(snap.source_proto, "rtsp");
    let first_ssrc = snap.ssrc;

    // RPC operations agree with each other on the incarnation
    let metadata = stream
        .get_stream_metadata(Duration::from_secs(5))
        .await
        .unwrap();
    let statistic = stream
        .get_stream_statistic(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(metadata.ssrc, statistic.ssrc);
    assert_eq!(metadata.ssrc, first_ssrc);

    let clients = stream
        .get_client_list(0, 100, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(clients.total_num, 0);
    stream.key_frame(Duration::from_secs(5)).await.unwrap();

    // long-poll observes the periodic feed
    stream.wait_next_update(Duration::from_secs(2)).await.unwrap();

    // restart: immediately Connecting, then Ok again on a new incarnation
    stream.restart().unwrap();
    assert_eq!(stream.status().state, StreamState::Connecting);
    let reconnected = wait_for(
        &stream,
        "post-restart Ok with a new ssrc",
        Duration::from_secs(3),
        |s| s.state == StreamState::Ok && s.ssrc != first_ssrc,
    )
    .await;
    assert_ne!(reconnected.ssrc, first_ssrc);

    // metadata now reports the new incarnation too
    let metadata = stream
        .get_stream_metadata(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(metadata.ssrc, reconnected.ssrc);

    controller.shutdown().await;
    assert!(controller.streams().is_empty());
    assert!(stream.is_destroyed());
}

#[tokio::test]
async fn test_duplicate_create_and_delete_of_missing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        channel_root: dir.path().to_path_buf(),
        ..Config::default()
    };
    let controller = Controller::new(config);
    register_passive_source_type(controller.streams(), controller.context(), "fake").unwrap();

    let stream_config = StreamConfig {
        mode: StreamMode::Passive,
        ..Default::default()
    };
    controller
        .streams()
        .create("fake", "cam-1", stream_config.clone())
        .await
        .unwrap();
    let err = controller
        .streams()
        .create("fake", "cam-1", stream_config)
        .await
        .unwrap_err();
    assert!(matches!(err, streamvisor::Error::DuplicateName(_)));

    let err = controller.streams().delete("nope").await.unwrap_err();
    assert!(matches!(err, streamvisor::Error::NotFound(_)));

    controller.shutdown().await;
}
