//! # Relaunch scheduling policy.
//!
//! [`RestartPolicy`] maps a child's exit code to the delay before the
//! monitor relaunches it: `error_interval` after a non-zero exit,
//! `success_interval` after a clean exit. A zero interval schedules the
//! relaunch for the next monitor tick.

use std::time::Duration;

/// When to relaunch an exited child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before relaunch after a non-zero exit.
    pub error_interval: Duration,
    /// Delay before relaunch after a zero exit.
    pub success_interval: Duration,
}

impl RestartPolicy {
    /// Returns the relaunch delay for the given exit code.
    #[inline]
    pub fn relaunch_delay(&self, exit_code: i32) -> Duration {
        if exit_code == 0 {
            self.success_interval
        } else {
            self.error_interval
        }
    }
}

impl Default for RestartPolicy {
    /// `error_interval = 30s`, `success_interval = 0s` (immediate).
    fn default() -> Self {
        Self {
            error_interval: Duration::from_secs(30),
            success_interval: Duration::ZERO,
        }
    }
}
