//! # Lifecycle events emitted by watchers, channels, and registries.
//!
//! [`EventKind`] classifies event types across three categories:
//! - **Process events**: child launch/exit/relaunch scheduling
//! - **Status events**: control-channel status updates and state changes
//! - **Directory events**: entity creation and deletion
//!
//! Each event carries a globally unique, monotonically increasing sequence
//! number (`seq`); use it to restore ordering when events are observed out of
//! order by a lagging receiver.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Process events ===
    /// A watcher launched (or relaunched) its child process.
    ///
    /// Sets: `entity` (watcher label), `detail` (pid).
    ProcessStarted,

    /// A child process exited; `detail` carries the exit code.
    ProcessExited,

    /// A relaunch was scheduled after an exit; `detail` carries the delay.
    RelaunchScheduled,

    // === Status events ===
    /// A STREAM_INFO message was accepted and applied to entity state.
    ///
    /// Sets: `entity`, `detail` (state label).
    StreamInfoReceived,

    /// An entity's observable state changed.
    ///
    /// Sets: `entity`, `detail` ("old -> new").
    StreamStateChanged,

    /// A sender's state changed (Ok / Err / Restarting).
    SenderStateChanged,

    /// A port process changed running status.
    PortStatusChanged,

    // === Directory events ===
    /// An entity was created and published in its registry.
    EntityCreated,

    /// An entity was removed from its registry and destroyed.
    EntityDeleted,
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - `entity` / `detail` are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the entity (or watcher label), if applicable.
    pub entity: Option<Arc<str>>,
    /// Human-readable detail (exit code, state transition, delay).
    pub detail: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            entity: None,
            detail: None,
        }
    }

    /// Attaches an entity name.
    #[inline]
    pub fn with_entity(mut self, entity: impl Into<Arc<str>>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Attaches a human-readable detail.
    #[inline]
    pub fn with_detail(mut self, detail: impl Into<Arc<str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
