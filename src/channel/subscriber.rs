//! # Status subscriber: one background task per entity.
//!
//! The task connects to the entity's `broadcast` endpoint, sends the
//! one-shot `["subscribe", "info"]` handshake, and then feeds every
//! STREAM_INFO message into the entity's [`StatusCell`]. It never raises:
//! decode failures are dropped, socket failures reconnect after a short
//! delay, and the silence check runs once per loop iteration regardless of
//! traffic.
//!
//! ## Rules
//! - **Cooperative**: every receive uses a short poll timeout so the loop
//!   observes cancellation promptly.
//! - **Generation-checked**: a task from a superseded generation exits
//!   without touching state, even if its token was never cancelled.
//! - **Self-healing**: any socket error drops the connection and retries
//!   after `reconnect_delay`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::channel::ControlEndpoint;
use crate::proto::{Multipart, MultipartCodec, OpCode, Packet, StreamInfoMsg, CHANNEL_INFO};
use crate::state::StatusCell;

/// Handle to a running subscriber task.
pub struct SubscriberHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Cancels the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }

    /// Cancels the task without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Timing knobs of the subscriber loop.
#[derive(Clone, Copy, Debug)]
pub struct SubscriberTiming {
    /// Receive poll timeout; bounds cancellation latency.
    pub poll: Duration,
    /// Sleep before reconnecting after a socket failure.
    pub reconnect_delay: Duration,
}

/// Spawns the subscriber task for one entity.
///
/// `generation` is the entity's current-generation counter; the task
/// captures its value at spawn time and exits as soon as the counter moves
/// past it.
pub fn spawn_subscriber(
    endpoint: ControlEndpoint,
    cell: Arc<StatusCell>,
    timing: SubscriberTiming,
    generation: Arc<AtomicU64>,
) -> SubscriberHandle {
    let token = CancellationToken::new();
    let my_gen = generation.load(Ordering::SeqCst);
    let task_token = token.clone();
    let task = tokio::spawn(event_loop(
        endpoint, cell, timing, generation, my_gen, task_token,
    ));
    SubscriberHandle { token, task }
}

async fn event_loop(
    endpoint: ControlEndpoint,
    cell: Arc<StatusCell>,
    timing: SubscriberTiming,
    generation: Arc<AtomicU64>,
    my_gen: u64,
    token: CancellationToken,
) {
    let stale = || token.is_cancelled() || generation.load(Ordering::SeqCst) != my_gen;

    loop {
        if stale() {
            return;
        }
        cell.check_silence();

        let stream = match UnixStream::connect(&endpoint.broadcast).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!(
                    endpoint = %endpoint.broadcast.display(),
                    %err,
                    "broadcast connect failed"
                );
                if sleep_cancellable(&token, timing.reconnect_delay).await {
                    return;
                }
                continue;
            }
        };
        let mut framed = Framed::new(stream, MultipartCodec);
        if let Err(err) = framed.send(Multipart::subscribe(CHANNEL_INFO)).await {
            tracing::debug!(%err, "subscribe handshake failed");
            if sleep_cancellable(&token, timing.reconnect_delay).await {
                return;
            }
            continue;
        }

        // Receive until the socket fails, then fall out and reconnect.
        loop {
            if stale() {
                return;
            }
            cell.check_silence();
            match time::timeout(timing.poll, framed.next()).await {
                Err(_) => continue, // poll timeout, check cancellation again
                Ok(Some(Ok(msg))) => handle_message(&cell, &msg),
                Ok(Some(Err(err))) => {
                    tracing::debug!(%err, "broadcast receive failed");
                    break;
                }
                Ok(None) => {
                    tracing::debug!("broadcast connection closed");
                    break;
                }
            }
        }
        drop(framed);
        if sleep_cancellable(&token, timing.reconnect_delay).await {
            return;
        }
    }
}

/// Returns `true` when cancelled during the sleep.
async fn sleep_cancellable(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = time::sleep(delay) => false,
    }
}

/// Decodes one published message; anything malformed is dropped.
fn handle_message(cell: &StatusCell, msg: &Multipart) {
    // published shape: [channel, packet, blob?]
    if msg.0.len() < 2 || msg.0[0] != CHANNEL_INFO.as_bytes() {
        return;
    }
    let packet = match Packet::from_bytes(&msg.0[1]) {
        Ok(packet) => packet,
        Err(err) => {
            tracing::debug!(%err, "undecodable status packet dropped");
            return;
        }
    };
    let Some(header) = packet.header.as_ref() else {
        return;
    };
    if header.code != OpCode::StreamInfo as i32 {
        return;
    }
    match StreamInfoMsg::decode(packet.body.as_slice()) {
        Ok(info) => {
            cell.apply(&info);
        }
        Err(err) => {
            tracing::debug!(%err, "undecodable stream info dropped");
        }
    }
}
