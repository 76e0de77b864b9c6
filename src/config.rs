//! # Global runtime configuration.
//!
//! [`Config`] centralizes the timing knobs and filesystem roots shared by
//! watchers, control channels, and entities. It is used in two ways:
//! 1. **Controller creation**: `Controller::new(config)`
//! 2. **Entity defaults**: factories fall back to these values when an
//!    entity config leaves a field unset.
//!
//! ## Sentinel values
//! - restart intervals of `0s` → relaunch on the next monitor tick
//! - `staleness_window = 0s` → falls back to `silence_timeout`

use std::path::PathBuf;
use std::time::Duration;

/// Global configuration for the supervisor/control core.
///
/// ## Field semantics
/// - `channel_root`: directory under which per-entity socket pairs live
///   (`<root>/<name>/api`, `<root>/<name>/broadcast`)
/// - `rpc_timeout`: default per-call RPC timeout
/// - `poll_interval`: monitor and subscriber poll period (keeps loops
///   responsive to cancellation)
/// - `silence_timeout`: gap after which an entity is presumed dead
/// - `staleness_window`: maximum accepted age of a status event's send-time
/// - `reconnect_delay`: sleep after a subscriber socket failure
/// - `stop_grace`: wait after SIGTERM before the hard kill
/// - `error_restart_interval` / `success_restart_interval`: default relaunch
///   scheduling after a child exit
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory for per-entity control endpoints.
    pub channel_root: PathBuf,

    /// Default RPC timeout when the caller does not specify one.
    pub rpc_timeout: Duration,

    /// Poll period of the monitor and subscriber loops.
    pub poll_interval: Duration,

    /// Maximum allowed gap between status updates before the state is
    /// forced to the timeout error variant.
    pub silence_timeout: Duration,

    /// Status events whose send-time is older than `now - staleness_window`
    /// are discarded. `0` means "use `silence_timeout`".
    pub staleness_window: Duration,

    /// Sleep before reconnecting a failed subscriber socket.
    pub reconnect_delay: Duration,

    /// Grace period between the terminate signal and the hard kill.
    pub stop_grace: Duration,

    /// Default relaunch delay after a non-zero child exit.
    pub error_restart_interval: Duration,

    /// Default relaunch delay after a zero child exit.
    pub success_restart_interval: Duration,

    /// Capacity of the event bus ring buffer (min 1, clamped by Bus).
    pub bus_capacity: usize,
}

impl Config {
    /// Effective staleness window: configured value, or `silence_timeout`
    /// when left at zero.
    #[inline]
    pub fn staleness_window_or_default(&self) -> Duration {
        if self.staleness_window == Duration::ZERO {
            self.silence_timeout
        } else {
            self.staleness_window
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `channel_root = <system tmp>/streamvisor`
    /// - `rpc_timeout = 5s`
    /// - `poll_interval = 100ms`
    /// - `silence_timeout = 300s` (staleness window follows it)
    /// - `reconnect_delay = 1s`
    /// - `stop_grace = 3s`
    /// - `error_restart_interval = 30s`, `success_restart_interval = 0s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            channel_root: std::env::temp_dir().join("streamvisor"),
            rpc_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            silence_timeout: Duration::from_secs(300),
            staleness_window: Duration::ZERO,
            reconnect_delay: Duration::from_secs(1),
            stop_grace: Duration::from_secs(3),
            error_restart_interval: Duration::from_secs(30),
            success_restart_interval: Duration::ZERO,
            bus_capacity: 1024,
        }
    }
}
