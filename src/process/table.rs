//! # WatcherTable: id-keyed registry of live watchers.
//!
//! The table hands out monotonically increasing ids and owns the map of
//! live [`ProcWatcher`] handles. A watcher removes itself from its table
//! when its final stop completes, so `list` only ever shows watchers whose
//! process may still exist.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::events::Bus;
use crate::process::{CommandSpec, ProcWatcher, RestartPolicy, StatusListener};

struct TableInner {
    next_id: AtomicU64,
    watchers: Mutex<HashMap<u64, ProcWatcher>>,
    poll: Duration,
    grace: Duration,
    bus: Bus,
}

/// Shared registry of process watchers. Cheap to clone.
#[derive(Clone)]
pub struct WatcherTable {
    inner: Arc<TableInner>,
}

impl WatcherTable {
    pub fn new(config: &Config, bus: Bus) -> Self {
        Self {
            inner: Arc::new(TableInner {
                next_id: AtomicU64::new(1),
                watchers: Mutex::new(HashMap::new()),
                poll: config.poll_interval,
                grace: config.stop_grace,
                bus,
            }),
        }
    }

    /// Creates, registers and starts a watcher for `command`.
    ///
    /// On launch failure nothing is registered and the error propagates.
    pub fn spawn(
        &self,
        label: Arc<str>,
        command: CommandSpec,
        policy: RestartPolicy,
        listener: Option<StatusListener>,
    ) -> Result<ProcWatcher> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let watcher = ProcWatcher::new(
            id,
            label,
            command,
            policy,
            self.inner.poll,
            self.inner.grace,
            listener,
            self.inner.bus.clone(),
        );
        watcher.start()?;

        let inner = Arc::downgrade(&self.inner);
        watcher.set_deregister(Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .watchers
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&id);
            }
        }));
        self.lock().insert(id, watcher.clone());
        Ok(watcher)
    }

    /// Looks up a live watcher by id.
    pub fn get(&self, id: u64) -> Option<ProcWatcher> {
        self.lock().get(&id).cloned()
    }

    /// Snapshot of all live watchers.
    pub fn list(&self) -> Vec<ProcWatcher> {
        self.lock().values().cloned().collect()
    }

    /// Number of live watchers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stops every live watcher and waits for each to finish.
    pub async fn shutdown(&self) {
        let watchers = self.list();
        for watcher in watchers {
            watcher.stop(self.inner.grace).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ProcWatcher>> {
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
