//! # Per-entity status state machine.
//!
//! [`StatusCell`] holds one entity's current status snapshot and applies
//! incoming STREAM_INFO events under the staleness and ordering rules:
//!
//! ```text
//!            ┌── valid STREAM_INFO (non-error code) ──┐
//!            ▼                                        │
//!      Connecting ───────────────────────────────► Ok │
//!            ▲                                        │
//!            │ reset()            STREAM_INFO (error code)
//!            │                    or silence timeout  │
//!            └──────────── Err* variants ◄────────────┘
//! ```
//!
//! ## Rules
//! - **Staleness**: an event whose send-time is older than
//!   `now - staleness_window` is discarded.
//! - **Ordering**: an event with the current ssrc and a send-time not newer
//!   than the last update is discarded (no backward movement).
//! - **Silence**: when `now - update_time >= silence_timeout` and the state
//!   is not already an error variant, the state is forced to `ErrTimeout`.
//! - **Wholesale replacement**: an accepted event replaces every status
//!   field and sets `update_time` to the event's send-time.
//!
//! All mutations go through the cell, so the snapshot is internally
//! consistent at any observation point.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use tokio::sync::Notify;
use tokio::time;

use crate::error::{Error, Result};
use crate::events::{Bus, Event, EventKind};
use crate::proto::StreamInfoMsg;

/// Stream states with their wire codes; negative codes are errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Helper launched, no valid status yet (code 0, initial).
    Connecting,
    /// Media flowing (code 1).
    Ok,
    /// Generic error (code -1).
    Err,
    /// Source connection failed (code -2).
    ErrConnectFail,
    /// Media stopped at the source (code -3).
    ErrMediaStop,
    /// Helper-side timing error (code -4).
    ErrTime,
    /// No status update within the silence timeout (code -5, local only).
    ErrTimeout,
}

impl StreamState {
    /// Maps a wire state code; unknown codes collapse onto `Ok`/`Err` by
    /// sign.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StreamState::Connecting,
            1 => StreamState::Ok,
            -1 => StreamState::Err,
            -2 => StreamState::ErrConnectFail,
            -3 => StreamState::ErrMediaStop,
            -4 => StreamState::ErrTime,
            -5 => StreamState::ErrTimeout,
            c if c > 0 => StreamState::Ok,
            _ => StreamState::Err,
        }
    }

    /// Wire code of this state.
    pub fn code(self) -> i32 {
        match self {
            StreamState::Connecting => 0,
            StreamState::Ok => 1,
            StreamState::Err => -1,
            StreamState::ErrConnectFail => -2,
            StreamState::ErrMediaStop => -3,
            StreamState::ErrTime => -4,
            StreamState::ErrTimeout => -5,
        }
    }

    /// True for every error variant.
    #[inline]
    pub fn is_error(self) -> bool {
        self.code() < 0
    }

    /// Short lowercase label for logs and event details.
    pub fn as_label(self) -> &'static str {
        match self {
            StreamState::Connecting => "connecting",
            StreamState::Ok => "ok",
            StreamState::Err => "err",
            StreamState::ErrConnectFail => "err_connect_fail",
            StreamState::ErrMediaStop => "err_media_stop",
            StreamState::ErrTime => "err_time",
            StreamState::ErrTimeout => "err_timeout",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One entity's status at a point in time.
#[derive(Clone, Debug)]
pub struct StatusSnapshot {
    /// Current state.
    pub state: StreamState,
    /// Play type: 0 live, 1 replay.
    pub play_type: u32,
    /// Source protocol string.
    pub source_proto: String,
    /// Synchronization-source id of the current incarnation.
    pub ssrc: u32,
    /// Current bitrate (bits per second).
    pub cur_bps: u32,
    /// Last media frame time, fractional seconds since the epoch.
    pub last_frame_time: f64,
    /// Send-time of the last accepted status event (seconds since epoch).
    pub update_time: f64,
    /// Connected-client count.
    pub client_num: u32,
}

/// Current wall-clock time as fractional seconds since the epoch.
pub(crate) fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Shared status holder for one entity.
pub struct StatusCell {
    entity: std::sync::Arc<str>,
    inner: Mutex<StatusSnapshot>,
    notify: Notify,
    staleness_window: Duration,
    silence_timeout: Duration,
    bus: Bus,
}

impl StatusCell {
    /// Creates a cell in `Connecting` with the silence clock starting now.
    pub fn new(
        entity: std::sync::Arc<str>,
        staleness_window: Duration,
        silence_timeout: Duration,
        bus: Bus,
    ) -> Self {
        Self {
            entity,
            inner: Mutex::new(StatusSnapshot {
                state: StreamState::Connecting,
                play_type: 0,
                source_proto: String::new(),
                ssrc: 0,
                cur_bps: 0,
                last_frame_time: 0.0,
                update_time: now_secs(),
                client_num: 0,
            }),
            notify: Notify::new(),
            staleness_window,
            silence_timeout,
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies a STREAM_INFO event; returns `true` if it was accepted.
    pub fn apply(&self, info: &StreamInfoMsg) -> bool {
        let now = now_secs();
        if info.send_time < now - self.staleness_window.as_secs_f64() {
            tracing::debug!(
                entity = %self.entity,
                send_time = info.send_time,
                "stale status event discarded"
            );
            return false;
        }

        let old_state;
        let new_state = StreamState::from_code(info.state);
        {
            let mut cur = self.lock();
            if info.ssrc == cur.ssrc && info.send_time <= cur.update_time {
                return false;
            }
            old_state = cur.state;
            *cur = StatusSnapshot {
                state: new_state,
                play_type: info.play_type,
                source_proto: info.source_proto.clone(),
                ssrc: info.ssrc,
                cur_bps: info.cur_bps,
                last_frame_time: info.last_frame_time(),
                update_time: info.send_time,
                client_num: info.client_num,
            };
        }

        self.bus.publish(
            Event::now(EventKind::StreamInfoReceived)
                .with_entity(self.entity.clone())
                .with_detail(new_state.as_label()),
        );
        if old_state != new_state {
            self.bus.publish(
                Event::now(EventKind::StreamStateChanged)
                    .with_entity(self.entity.clone())
                    .with_detail(format!("{old_state} -> {new_state}")),
            );
        }
        self.notify.notify_waiters();
        true
    }

    /// Forces `ErrTimeout` when the silence timeout elapsed and the state is
    /// not already an error variant.
    pub fn check_silence(&self) {
        let old_state;
        {
            let mut cur = self.lock();
            let gap = now_secs() - cur.update_time;
            if gap < self.silence_timeout.as_secs_f64() || cur.state.is_error() {
                return;
            }
            old_state = cur.state;
            cur.state = StreamState::ErrTimeout;
        }
        tracing::warn!(entity = %self.entity, "status silence timeout");
        self.bus.publish(
            Event::now(EventKind::StreamStateChanged)
                .with_entity(self.entity.clone())
                .with_detail(format!("{old_state} -> {}", StreamState::ErrTimeout)),
        );
        self.notify.notify_waiters();
    }

    /// Returns to `Connecting` and restarts the silence clock; the ssrc is
    /// kept so the next incarnation's status (with a fresh ssrc) is always
    /// accepted.
    pub fn reset(&self) {
        {
            let mut cur = self.lock();
            cur.state = StreamState::Connecting;
            cur.update_time = now_secs();
        }
        self.notify.notify_waiters();
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    /// Blocks until the next status change, up to `timeout` (long-poll).
    pub async fn wait_next_update(&self, timeout: Duration) -> Result<StatusSnapshot> {
        match time::timeout(timeout, self.notify.notified()).await {
            Ok(()) => Ok(self.snapshot()),
            Err(_) => Err(Error::RequestTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cell() -> StatusCell {
        StatusCell::new(
            Arc::from("cam-1"),
            Duration::from_secs(300),
            Duration::from_secs(300),
            Bus::new(16),
        )
    }

    fn info(state: i32, ssrc: u32, send_time: f64) -> StreamInfoMsg {
        StreamInfoMsg {
            state,
            ssrc,
            send_time,
            source_proto: "rtsp".into(),
            cur_bps: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_state_codes_round_trip() {
        for state in [
            StreamState::Connecting,
            StreamState::Ok,
            StreamState::Err,
            StreamState::ErrConnectFail,
            StreamState::ErrMediaStop,
            StreamState::ErrTime,
            StreamState::ErrTimeout,
        ] {
            assert_eq!(StreamState::from_code(state.code()), state);
        }
        assert!(StreamState::ErrTimeout.is_error());
        assert!(!StreamState::Connecting.is_error());
    }

    #[test]
    fn test_valid_event_moves_connecting_to_ok() {
        let cell = cell();
        assert_eq!(cell.snapshot().state, StreamState::Connecting);
        assert!(cell.apply(&info(1, 42, now_secs())));
        let snap = cell.snapshot();
        assert_eq!(snap.state, StreamState::Ok);
        assert_eq!(snap.ssrc, 42);
    }

    #[test]
    fn test_stale_event_is_discarded() {
        let cell = cell();
        let old = now_secs() - 400.0;
        assert!(!cell.apply(&info(1, 42, old)));
        assert_eq!(cell.snapshot().state, StreamState::Connecting);
    }

    #[test]
    fn test_same_ssrc_older_timestamp_is_discarded() {
        let cell = cell();
        let now = now_secs();
        assert!(cell.apply(&info(1, 42, now)));
        // duplicate / out-of-order event: same ssrc, not newer
        assert!(!cell.apply(&info(-1, 42, now)));
        assert_eq!(cell.snapshot().state, StreamState::Ok);
    }

    #[test]
    fn test_new_ssrc_is_accepted_regardless_of_timestamp_order() {
        let cell = cell();
        let now = now_secs();
        assert!(cell.apply(&info(1, 42, now)));
        assert!(cell.apply(&info(1, 43, now)));
        assert_eq!(cell.snapshot().ssrc, 43);
    }

    #[test]
    fn test_silence_forces_err_timeout() {
        let cell = StatusCell::new(
            Arc::from("cam-1"),
            Duration::from_secs(300),
            Duration::ZERO,
            Bus::new(16),
        );
        cell.check_silence();
        assert_eq!(cell.snapshot().state, StreamState::ErrTimeout);
    }

    #[test]
    fn test_silence_leaves_error_states_alone() {
        let cell = StatusCell::new(
            Arc::from("cam-1"),
            Duration::from_secs(300),
            Duration::ZERO,
            Bus::new(16),
        );
        cell.apply(&info(-2, 42, now_secs()));
        cell.check_silence();
        assert_eq!(cell.snapshot().state, StreamState::ErrConnectFail);
    }

    #[test]
    fn test_reset_returns_to_connecting() {
        let cell = cell();
        cell.apply(&info(1, 42, now_secs()));
        cell.reset();
        let snap = cell.snapshot();
        assert_eq!(snap.state, StreamState::Connecting);
        assert_eq!(snap.ssrc, 42);
    }

    #[tokio::test]
    async fn test_wait_next_update_wakes_on_apply() {
        let cell = Arc::new(cell());
        let waiter = Arc::clone(&cell);
        let handle = tokio::spawn(async move {
            waiter.wait_next_update(Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cell.apply(&info(1, 42, now_secs()));
        let snap = handle.await.unwrap().unwrap();
        assert_eq!(snap.state, StreamState::Ok);
    }

    #[tokio::test]
    async fn test_wait_next_update_times_out() {
        let cell = cell();
        let err = cell
            .wait_next_update(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestTimeout));
    }
}
