//! # ProcWatcher: owns one child process and its restart lifecycle.
//!
//! One watcher supervises exactly one OS process at a time. A background
//! monitor task polls liveness at a short interval; when the child exits,
//! the watcher records the exit and schedules a relaunch per
//! [`RestartPolicy`](crate::process::RestartPolicy). A failed relaunch is
//! never fatal to the watcher: it surfaces as an error status and is retried
//! forever per policy.
//!
//! ## Lifecycle
//! ```text
//! start() ──► spawn child ──► monitor loop (poll every poll_interval)
//!                                  │ child exited
//!                                  ├─► record code/time, bump restart_count
//!                                  ├─► schedule relaunch at now + interval
//!                                  │     (interval 0 = next tick)
//!                                  └─► relaunch when due
//!
//! stop(wait) ──► cancel monitor ──► SIGTERM ──► wait ≤ `wait` ──► SIGKILL
//! restart_process() ──► SIGTERM only (monitor relaunches per policy)
//! ```
//!
//! A watcher that has been stopped is finished; owners create a fresh one to
//! start again. `stop` guarantees no live process remains when it returns.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::events::{Bus, Event, EventKind};
use crate::process::{CommandSpec, RestartPolicy};

/// Coarse process status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcStatus {
    /// No child running; last exit (if any) was clean.
    Stopped,
    /// Child is alive.
    Running,
    /// No child running; last exit or launch attempt failed.
    Error,
}

/// Point-in-time view of a watcher.
#[derive(Clone, Debug)]
pub struct WatcherSnapshot {
    /// Watcher id within its table.
    pub id: u64,
    /// Coarse status.
    pub status: ProcStatus,
    /// PID of the live child, if any.
    pub pid: Option<u32>,
    /// Exit code of the most recent exit (-1 when killed by signal).
    pub last_exit_code: Option<i32>,
    /// Wall-clock time of the most recent exit.
    pub last_exit_at: Option<SystemTime>,
    /// Number of recorded exits (each one schedules a relaunch).
    pub restart_count: u64,
    /// Time since the current child was launched.
    pub uptime: Option<Duration>,
}

/// Best-effort status callback; panics are swallowed.
pub type StatusListener = Arc<dyn Fn(&WatcherSnapshot) + Send + Sync>;

struct State {
    status: ProcStatus,
    pid: Option<u32>,
    last_exit_code: Option<i32>,
    last_exit_at: Option<SystemTime>,
    restart_count: u64,
    started_at: Option<Instant>,
    running: bool,
    stopped: bool,
}

pub(crate) struct WatcherInner {
    id: u64,
    label: Arc<str>,
    command: CommandSpec,
    policy: RestartPolicy,
    poll: Duration,
    grace: Mutex<Duration>,
    state: Mutex<State>,
    token: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
    listener: Option<StatusListener>,
    deregister: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    bus: Bus,
}

/// Handle to one supervised child process. Cheap to clone.
#[derive(Clone)]
pub struct ProcWatcher {
    inner: Arc<WatcherInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn send_sigterm(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

impl ProcWatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        label: Arc<str>,
        command: CommandSpec,
        policy: RestartPolicy,
        poll: Duration,
        grace: Duration,
        listener: Option<StatusListener>,
        bus: Bus,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                id,
                label,
                command,
                policy,
                poll,
                grace: Mutex::new(grace),
                state: Mutex::new(State {
                    status: ProcStatus::Stopped,
                    pid: None,
                    last_exit_code: None,
                    last_exit_at: None,
                    restart_count: 0,
                    started_at: None,
                    running: false,
                    stopped: false,
                }),
                token: CancellationToken::new(),
                monitor: Mutex::new(None),
                listener,
                deregister: Mutex::new(None),
                bus,
            }),
        }
    }

    /// Installs the table-removal hook; runs once, after the final stop.
    pub(crate) fn set_deregister(&self, hook: Box<dyn FnOnce() + Send>) {
        *lock(&self.inner.deregister) = Some(hook);
    }

    /// Watcher id within its table.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Launch spec this watcher supervises.
    pub fn command(&self) -> &CommandSpec {
        &self.inner.command
    }

    /// Launches the child and the monitor task.
    ///
    /// Idempotent: calling `start` on a running watcher is a no-op. Fails
    /// with `LaunchError` when the executable is missing or exec fails; a
    /// stopped watcher cannot be started again.
    pub fn start(&self) -> Result<()> {
        {
            let st = lock(&self.inner.state);
            if st.stopped {
                return Err(crate::error::Error::Destroyed);
            }
            if st.running {
                return Ok(());
            }
        }
        let child = self.inner.command.spawn()?;
        {
            let mut st = lock(&self.inner.state);
            st.running = true;
            st.status = ProcStatus::Running;
            st.pid = child.id();
            st.started_at = Some(Instant::now());
        }
        self.inner.bus.publish(
            Event::now(EventKind::ProcessStarted)
                .with_entity(self.inner.label.clone())
                .with_detail(format!("pid={:?}", child.id())),
        );
        notify(&self.inner);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(monitor(inner, child));
        *lock(&self.inner.monitor) = Some(handle);
        Ok(())
    }

    /// Stops the watcher: terminate signal, wait up to `wait`, then a hard
    /// kill. When this returns there is no live process for this watcher.
    pub async fn stop(&self, wait: Duration) {
        *lock(&self.inner.grace) = wait;
        self.inner.token.cancel();
        let handle = lock(&self.inner.monitor).take();
        match handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => mark_stopped(&self.inner),
        }
        if let Some(hook) = lock(&self.inner.deregister).take() {
            hook();
        }
    }

    /// Stop variant that performs the wait/kill off the caller's path and
    /// returns immediately. Termination is still guaranteed eventually.
    pub fn stop_async(&self) {
        self.inner.token.cancel();
        let handle = lock(&self.inner.monitor).take();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => mark_stopped(&inner),
            }
            if let Some(hook) = lock(&inner.deregister).take() {
                hook();
            }
        });
    }

    /// Sends the terminate signal only; the monitor relaunches per policy.
    ///
    /// This is the "graceful reconnect" path, distinct from `stop` + a new
    /// watcher.
    pub fn restart_process(&self) {
        let pid = lock(&self.inner.state).pid;
        if let Some(pid) = pid {
            send_sigterm(pid);
        }
    }

    /// Current snapshot (status, pid, exit record, restart count, uptime).
    pub fn snapshot(&self) -> WatcherSnapshot {
        snapshot_of(&self.inner)
    }

    /// True while the child process is alive.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.state).status == ProcStatus::Running
    }
}

fn snapshot_of(inner: &WatcherInner) -> WatcherSnapshot {
    let st = lock(&inner.state);
    WatcherSnapshot {
        id: inner.id,
        status: st.status,
        pid: st.pid,
        last_exit_code: st.last_exit_code,
        last_exit_at: st.last_exit_at,
        restart_count: st.restart_count,
        uptime: st.started_at.map(|at| at.elapsed()),
    }
}

fn notify(inner: &WatcherInner) {
    if let Some(listener) = &inner.listener {
        let snap = snapshot_of(inner);
        let listener = Arc::clone(listener);
        let _ = catch_unwind(AssertUnwindSafe(move || listener(&snap)));
    }
}

fn mark_stopped(inner: &WatcherInner) {
    {
        let mut st = lock(&inner.state);
        st.running = false;
        st.stopped = true;
        st.status = ProcStatus::Stopped;
        st.pid = None;
        st.started_at = None;
    }
    notify(inner);
}

/// Monitor loop: polls child liveness, records exits, relaunches per
/// policy, and performs the graceful shutdown handover on cancellation.
async fn monitor(inner: Arc<WatcherInner>, child: Child) {
    let mut child = Some(child);
    let mut next_launch: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = inner.token.cancelled() => break,
            _ = time::sleep(inner.poll) => {}
        }

        match child.as_mut() {
            Some(live) => match live.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code().unwrap_or(-1);
                    let delay = inner.policy.relaunch_delay(code);
                    {
                        let mut st = lock(&inner.state);
                        st.last_exit_code = Some(code);
                        st.last_exit_at = Some(SystemTime::now());
                        st.pid = None;
                        st.started_at = None;
                        st.status = if code == 0 {
                            ProcStatus::Stopped
                        } else {
                            ProcStatus::Error
                        };
                        st.restart_count += 1;
                    }
                    child = None;
                    next_launch = Some(Instant::now() + delay);
                    tracing::debug!(
                        label = %inner.label,
                        code,
                        delay_ms = delay.as_millis() as u64,
                        "child exited, relaunch scheduled"
                    );
                    inner.bus.publish(
                        Event::now(EventKind::ProcessExited)
                            .with_entity(inner.label.clone())
                            .with_detail(format!("exit_code={code}")),
                    );
                    inner.bus.publish(
                        Event::now(EventKind::RelaunchScheduled)
                            .with_entity(inner.label.clone())
                            .with_detail(format!("delay_ms={}", delay.as_millis())),
                    );
                    notify(&inner);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(label = %inner.label, %err, "child liveness poll failed");
                }
            },
            None => {
                let due = next_launch.is_some_and(|at| Instant::now() >= at);
                if due {
                    match inner.command.spawn() {
                        Ok(spawned) => {
                            {
                                let mut st = lock(&inner.state);
                                st.status = ProcStatus::Running;
                                st.pid = spawned.id();
                                st.started_at = Some(Instant::now());
                            }
                            inner.bus.publish(
                                Event::now(EventKind::ProcessStarted)
                                    .with_entity(inner.label.clone())
                                    .with_detail(format!("pid={:?}", spawned.id())),
                            );
                            notify(&inner);
                            child = Some(spawned);
                            next_launch = None;
                        }
                        Err(err) => {
                            // Retried forever per policy; never fatal.
                            tracing::warn!(label = %inner.label, %err, "relaunch failed");
                            lock(&inner.state).status = ProcStatus::Error;
                            next_launch =
                                Some(Instant::now() + inner.policy.relaunch_delay(-1));
                        }
                    }
                }
            }
        }
    }

    // Shutdown handover: terminate, wait up to grace, then hard kill.
    if let Some(mut live) = child {
        if let Some(pid) = live.id() {
            send_sigterm(pid);
        }
        let grace = *lock(&inner.grace);
        match time::timeout(grace, live.wait()).await {
            Ok(Ok(status)) => {
                let mut st = lock(&inner.state);
                st.last_exit_code = status.code().or(Some(-1));
                st.last_exit_at = Some(SystemTime::now());
            }
            _ => {
                let _ = live.kill().await;
            }
        }
    }
    mark_stopped(&inner);
}
