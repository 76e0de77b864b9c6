//! # Request/reply client for one entity's `api` endpoint.
//!
//! One [`RpcChannel`] per entity. A single exchange socket is cached on the
//! channel; ownership transfer is explicit (take, use, maybe return):
//!
//! ```text
//! call() ─► take cached socket (or connect a fresh one)
//!        ─► send [packet, blob?] ─► await reply ≤ timeout
//!        ─► complete reply: return socket to the cache slot
//!        ─► timeout / io error:  socket is dropped, never reused
//! ```
//!
//! A concurrent second call finds the cache slot empty and opens a
//! short-lived socket of its own; whichever call finishes first puts its
//! socket back, the other one drops. Two calls never touch the same socket.
//!
//! Sequence numbers are entity-local, start at 1 and wrap at 32 bits; a
//! reply is accepted only if it correlates with the request (see
//! [`Packet::validate_reply`]).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::time;
use tokio_util::codec::Framed;

use crate::channel::ControlEndpoint;
use crate::error::{Error, Result};
use crate::proto::{Multipart, MultipartCodec, OpCode, Packet, PacketHeader};

type Socket = Framed<UnixStream, MultipartCodec>;

struct RpcInner {
    api: std::path::PathBuf,
    seq: AtomicU32,
    cached: Mutex<Option<Socket>>,
    destroyed: AtomicBool,
}

/// RPC client bound to one entity's `api` endpoint. Cheap to clone.
#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<RpcInner>,
}

impl RpcChannel {
    pub fn new(endpoint: &ControlEndpoint) -> Self {
        Self {
            inner: Arc::new(RpcInner {
                api: endpoint.api.clone(),
                seq: AtomicU32::new(1),
                cached: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Drops the cached socket; the next call connects fresh. Used on
    /// entity restart so stale in-flight exchanges are never resumed.
    pub fn invalidate(&self) {
        self.lock_cache().take();
    }

    /// Fails every subsequent call fast with `Destroyed`.
    pub fn mark_destroyed(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.invalidate();
    }

    /// Performs one request→reply exchange.
    ///
    /// Returns the validated reply header, the reply body, and the optional
    /// raw blob frame. On timeout the socket is discarded and the call fails
    /// with [`Error::RequestTimeout`]; see the module docs for the socket
    /// ownership protocol.
    pub async fn call(
        &self,
        code: OpCode,
        body: Vec<u8>,
        blob: Option<Bytes>,
        timeout: Duration,
    ) -> Result<(PacketHeader, Vec<u8>, Option<Bytes>)> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);

        let mut socket = match self.lock_cache().take() {
            Some(socket) => socket,
            None => {
                let stream = UnixStream::connect(&self.inner.api).await?;
                Framed::new(stream, MultipartCodec)
            }
        };

        let request = Packet::request(seq, code, body);
        socket
            .send(Multipart::packet(request.to_bytes(), blob))
            .await?;

        let msg = match time::timeout(timeout, socket.next()).await {
            Err(_) => return Err(Error::RequestTimeout),
            Ok(None) => {
                return Err(Error::Channel(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "api connection closed",
                )))
            }
            Ok(Some(Err(err))) => return Err(err.into()),
            Ok(Some(Ok(msg))) => msg,
        };

        // A complete exchange happened; the socket is healthy even if the
        // reply turns out invalid at the application level.
        self.put_back(socket);

        let reply = Packet::from_bytes(&msg.0[0])?;
        let header = reply.validate_reply(seq, code)?.clone();
        let reply_blob = msg.0.get(1).cloned();
        Ok((header, reply.body, reply_blob))
    }

    fn put_back(&self, socket: Socket) {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let mut cached = self.lock_cache();
        if cached.is_none() {
            *cached = Some(socket);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Option<Socket>> {
        self.inner
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::UnixListener;

    /// Fake helper: accepts api connections and answers every request with
    /// `respond(header)`. Counts accepted connections.
    fn serve(
        listener: UnixListener,
        accepted: Arc<AtomicUsize>,
        respond: impl Fn(&PacketHeader) -> Option<Packet> + Send + Sync + 'static,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accepted.fetch_add(1, Ordering::SeqCst);
                let mut framed = Framed::new(stream, MultipartCodec);
                while let Some(Ok(msg)) = framed.next().await {
                    let request = Packet::from_bytes(&msg.0[0]).unwrap();
                    let header = request.header_checked().unwrap();
                    match respond(header) {
                        Some(reply) => {
                            let out = Multipart::packet(reply.to_bytes(), None);
                            if framed.send(out).await.is_err() {
                                break;
                            }
                        }
                        None => {} // never reply
                    }
                }
            }
        })
    }

    fn endpoint_in(dir: &std::path::Path) -> ControlEndpoint {
        let ep = ControlEndpoint::new(dir, "cam-1");
        ep.ensure_dir().unwrap();
        ep
    }

    #[tokio::test]
    async fn test_call_round_trip_reuses_socket() {
        let dir = tempfile::tempdir().unwrap();
        let ep = endpoint_in(dir.path());
        let listener = UnixListener::bind(&ep.api).unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let server = serve(listener, Arc::clone(&accepted), |h| {
            Some(Packet::reply(h.seq, OpCode::KeyFrame, 200, "OK", vec![]))
        });

        let rpc = RpcChannel::new(&ep);
        for _ in 0..3 {
            let (header, body, blob) = rpc
                .call(OpCode::KeyFrame, vec![], None, Duration::from_secs(2))
                .await
                .unwrap();
            assert_eq!(header.status, 200);
            assert!(body.is_empty());
            assert!(blob.is_none());
        }
        // all three calls went over one cached connection
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        server.abort();
    }

    #[tokio::test]
    async fn test_sequence_mismatch_is_invalid_reply() {
        let dir = tempfile::tempdir().unwrap();
        let ep = endpoint_in(dir.path());
        let listener = UnixListener::bind(&ep.api).unwrap();
        let server = serve(listener, Arc::new(AtomicUsize::new(0)), |h| {
            Some(Packet::reply(
                h.seq.wrapping_add(1),
                OpCode::KeyFrame,
                200,
                "OK",
                vec![],
            ))
        });

        let rpc = RpcChannel::new(&ep);
        let err = rpc
            .call(OpCode::KeyFrame, vec![], None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReply(_)));
        server.abort();
    }

    #[tokio::test]
    async fn test_remote_status_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let ep = endpoint_in(dir.path());
        let listener = UnixListener::bind(&ep.api).unwrap();
        let server = serve(listener, Arc::new(AtomicUsize::new(0)), |h| {
            Some(Packet::reply(
                h.seq,
                OpCode::Metadata,
                404,
                "no such stream",
                vec![],
            ))
        });

        let rpc = RpcChannel::new(&ep);
        match rpc
            .call(OpCode::Metadata, vec![], None, Duration::from_secs(2))
            .await
            .unwrap_err()
        {
            Error::RemoteError { status, info } => {
                assert_eq!(status, 404);
                assert_eq!(info, "no such stream");
            }
            other => panic!("unexpected error: {other}"),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_timeout_discards_socket() {
        let dir = tempfile::tempdir().unwrap();
        let ep = endpoint_in(dir.path());
        let listener = UnixListener::bind(&ep.api).unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let replies = Arc::new(AtomicUsize::new(0));
        let replies_in_server = Arc::clone(&replies);
        let server = serve(listener, Arc::clone(&accepted), move |h| {
            // first request: stay silent; later requests: answer
            if replies_in_server.fetch_add(1, Ordering::SeqCst) == 0 {
                None
            } else {
                Some(Packet::reply(h.seq, OpCode::KeyFrame, 200, "OK", vec![]))
            }
        });

        let rpc = RpcChannel::new(&ep);
        let err = rpc
            .call(OpCode::KeyFrame, vec![], None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestTimeout));

        // next call must not reuse the timed-out socket
        rpc.call(OpCode::KeyFrame, vec![], None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        server.abort();
    }

    #[tokio::test]
    async fn test_call_after_destroy_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let ep = endpoint_in(dir.path());
        // no server bound at all: destroy must fail before connecting
        let rpc = RpcChannel::new(&ep);
        rpc.mark_destroyed();
        let err = rpc
            .call(OpCode::KeyFrame, vec![], None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Destroyed));
    }
}
