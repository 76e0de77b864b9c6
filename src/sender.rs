//! # Sender entities: re-publish a managed stream to a destination.
//!
//! A sender is a pure process-backed entity: it has no control channel of
//! its own, so its state is derived entirely from its watcher's status
//! transitions:
//!
//! ```text
//! Running      ─► Ok
//! clean exit   ─► Restarting   (monitor relaunches per policy)
//! error exit   ─► Err
//! ```
//!
//! State changes are published on the [`Bus`] as `SenderStateChanged`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::controller::ServiceContext;
use crate::error::{Error, Result};
use crate::events::{Bus, Event, EventKind};
use crate::process::{
    executable_reachable, CommandSpec, ProcStatus, ProcWatcher, RestartPolicy, StatusListener,
    WatcherSnapshot, WatcherTable,
};
use crate::registry::{Entity, Factory, Registry};

/// Observable sender state, derived from the helper process status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderState {
    /// Helper running.
    Ok,
    /// Helper exited with an error; relaunch pending.
    Err,
    /// Helper not running but expected back (initial, clean exit, restart).
    Restarting,
}

impl SenderState {
    pub fn as_label(self) -> &'static str {
        match self {
            SenderState::Ok => "ok",
            SenderState::Err => "err",
            SenderState::Restarting => "restarting",
        }
    }
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Configuration of one sender entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Destination URL the stream is re-published to (`-u`).
    pub dest_url: String,
    /// Destination container/protocol format (`-f`); empty = helper default.
    pub dest_format: String,
    /// Local source stream name (`-s`); exclusive with host/port.
    pub stream_name: String,
    /// Remote source host (`-H`), used when `stream_name` is empty.
    pub stream_host: String,
    /// Remote source port (`-p`), used with `stream_host`.
    pub stream_port: u16,
    /// Helper log file (`-l`).
    pub log_file: Option<String>,
    /// Helper log size limit in bytes (`-L`).
    pub log_size: u64,
    /// Helper log rotation count (`-r`).
    pub log_rotate: u32,
    /// Helper log verbosity (`--log-level`).
    pub log_level: u32,
    /// Relaunch delay after a non-zero helper exit; `None` = global default.
    pub err_restart_interval: Option<Duration>,
    /// Advisory lifetime used by outer layers to expire idle senders; the
    /// core carries it but does not act on it.
    pub age_time: Option<Duration>,
    /// Extra `--key=value` helper options.
    pub extra_options: BTreeMap<String, String>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            dest_url: String::new(),
            dest_format: String::new(),
            stream_name: String::new(),
            stream_host: String::new(),
            stream_port: 0,
            log_file: None,
            log_size: 10 * 1024 * 1024,
            log_rotate: 3,
            log_level: 6,
            err_restart_interval: None,
            age_time: None,
            extra_options: BTreeMap::new(),
        }
    }
}

impl SenderConfig {
    /// A sender needs a destination and exactly one way to reach its
    /// source: a local stream name, or a remote host + port.
    pub fn validate(&self) -> Result<()> {
        if self.dest_url.is_empty() {
            return Err(Error::Config("sender dest_url must not be empty".into()));
        }
        if self.stream_name.is_empty() && (self.stream_host.is_empty() || self.stream_port == 0) {
            return Err(Error::Config(
                "sender needs stream_name, or stream_host with stream_port".into(),
            ));
        }
        Ok(())
    }

    /// Builds the sender helper launch command.
    pub fn command(&self, executable: &str) -> CommandSpec {
        let mut cmd = CommandSpec::new(executable);
        if !self.stream_name.is_empty() {
            cmd = cmd.flag("-s", &self.stream_name);
        } else {
            cmd = cmd
                .flag("-H", &self.stream_host)
                .flag("-p", self.stream_port);
        }
        cmd = cmd.flag("-u", &self.dest_url);
        if !self.dest_format.is_empty() {
            cmd = cmd.flag("-f", &self.dest_format);
        }
        cmd.log_args(self.log_file.as_deref(), self.log_size, self.log_rotate)
            .flag("--log-level", self.log_level)
            .extra_options(&self.extra_options)
    }
}

struct SenderShared {
    name: Arc<str>,
    state: Mutex<SenderState>,
    bus: Bus,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SenderShared {
    fn transition(&self, new: SenderState) {
        let old = {
            let mut cur = lock(&self.state);
            if *cur == new {
                return;
            }
            std::mem::replace(&mut *cur, new)
        };
        self.bus.publish(
            Event::now(EventKind::SenderStateChanged)
                .with_entity(self.name.clone())
                .with_detail(format!("{old} -> {new}")),
        );
    }
}

fn watcher_listener(shared: Arc<SenderShared>) -> StatusListener {
    Arc::new(move |snap: &WatcherSnapshot| {
        let state = match snap.status {
            ProcStatus::Running => SenderState::Ok,
            ProcStatus::Stopped => SenderState::Restarting,
            ProcStatus::Error => SenderState::Err,
        };
        shared.transition(state);
    })
}

/// One managed sender.
pub struct SenderEntity {
    shared: Arc<SenderShared>,
    type_name: String,
    config: SenderConfig,
    runtime: Config,
    watchers: WatcherTable,
    executable: String,
    watcher: Mutex<Option<ProcWatcher>>,
    destroyed: AtomicBool,
}

impl SenderEntity {
    pub(crate) fn new(
        name: Arc<str>,
        type_name: String,
        config: SenderConfig,
        executable: String,
        ctx: &ServiceContext,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            shared: Arc::new(SenderShared {
                name,
                state: Mutex::new(SenderState::Restarting),
                bus: ctx.bus.clone(),
            }),
            type_name,
            config,
            runtime: ctx.runtime.clone(),
            watchers: ctx.watchers.clone(),
            executable,
            watcher: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }))
    }

    /// Launches the sender helper. Idempotent while the entity is alive.
    pub fn start(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        let mut slot = lock(&self.watcher);
        if slot.is_none() {
            let command = self.config.command(&self.executable);
            let policy = RestartPolicy {
                error_interval: self
                    .config
                    .err_restart_interval
                    .unwrap_or(self.runtime.error_restart_interval),
                success_interval: self.runtime.success_restart_interval,
            };
            *slot = Some(self.watchers.spawn(
                self.shared.name.clone(),
                command,
                policy,
                Some(watcher_listener(Arc::clone(&self.shared))),
            )?);
        }
        Ok(())
    }

    /// Terminates the helper; the monitor relaunches it per policy.
    pub fn restart(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        self.shared.transition(SenderState::Restarting);
        if let Some(watcher) = lock(&self.watcher).clone() {
            watcher.restart_process();
        }
        Ok(())
    }

    /// Current sender state.
    pub fn state(&self) -> SenderState {
        *lock(&self.shared.state)
    }

    /// Snapshot of the helper process, if started.
    pub fn process_snapshot(&self) -> Option<WatcherSnapshot> {
        lock(&self.watcher).as_ref().map(|w| w.snapshot())
    }

    /// Entity configuration.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    async fn teardown(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let watcher = lock(&self.watcher).take();
        if let Some(watcher) = watcher {
            watcher.stop(self.runtime.stop_grace).await;
        }
        tracing::info!(name = %self.shared.name, "sender destroyed");
        Ok(())
    }
}

#[async_trait]
impl Entity for SenderEntity {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    async fn destroy(&self) -> Result<()> {
        self.teardown().await
    }
}

/// Registers a sender type running `executable`.
///
/// Fails with `LaunchError` when the executable is missing.
pub fn register_sender_type(
    registry: &Registry<SenderConfig, SenderEntity>,
    ctx: ServiceContext,
    type_name: &str,
    executable: &str,
) -> Result<()> {
    if !executable_reachable(executable) {
        return Err(Error::Launch {
            program: executable.to_string(),
            reason: "executable not found".to_string(),
        });
    }
    let type_name_owned = type_name.to_string();
    let executable = executable.to_string();
    let factory: Factory<SenderConfig, SenderEntity> = Arc::new(move |name, config| {
        let ctx = ctx.clone();
        let type_name = type_name_owned.clone();
        let executable = executable.clone();
        Box::pin(async move {
            let entity = SenderEntity::new(name, type_name, config, executable, &ctx)?;
            entity.start()?;
            Ok(entity)
        })
    });
    registry.register_type(type_name, factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Bus;

    fn context() -> ServiceContext {
        let runtime = Config::default();
        let bus = Bus::new(16);
        let watchers = WatcherTable::new(&runtime, bus.clone());
        ServiceContext {
            runtime,
            bus,
            watchers,
        }
    }

    #[test]
    fn test_validate_requires_destination_and_source() {
        let mut cfg = SenderConfig::default();
        assert!(cfg.validate().is_err());
        cfg.dest_url = "rtmp://cdn/app".into();
        assert!(cfg.validate().is_err());
        cfg.stream_name = "cam-1".into();
        assert!(cfg.validate().is_ok());

        let remote = SenderConfig {
            dest_url: "rtmp://cdn/app".into(),
            stream_host: "10.0.0.2".into(),
            stream_port: 8100,
            ..Default::default()
        };
        assert!(remote.validate().is_ok());
    }

    #[test]
    fn test_command_prefers_stream_name_over_host() {
        let cfg = SenderConfig {
            dest_url: "rtmp://cdn/app".into(),
            dest_format: "flv".into(),
            stream_name: "cam-1".into(),
            stream_host: "ignored".into(),
            stream_port: 9,
            ..Default::default()
        };
        let cmd = cfg.command("stsw_sender");
        assert_eq!(
            cmd.args,
            vec![
                "-s",
                "cam-1",
                "-u",
                "rtmp://cdn/app",
                "-f",
                "flv",
                "--log-level",
                "6"
            ]
        );
    }

    #[test]
    fn test_command_uses_host_and_port_without_name() {
        let cfg = SenderConfig {
            dest_url: "rtmp://cdn/app".into(),
            stream_host: "10.0.0.2".into(),
            stream_port: 8100,
            ..Default::default()
        };
        let cmd = cfg.command("stsw_sender");
        assert!(cmd.args.starts_with(&[
            "-H".to_string(),
            "10.0.0.2".to_string(),
            "-p".to_string(),
            "8100".to_string()
        ]));
    }

    #[tokio::test]
    async fn test_state_follows_process_lifecycle() {
        let ctx = context();
        let cfg = SenderConfig {
            dest_url: "rtmp://cdn/app".into(),
            stream_name: "cam-1".into(),
            ..Default::default()
        };
        // "sleep" stands in for the helper; validation already passed, the
        // command is overridden through the executable name
        let entity = SenderEntity::new(
            Arc::from("send-1"),
            "test".into(),
            cfg,
            "/bin/sleep".into(),
            &ctx,
        )
        .unwrap();
        assert_eq!(entity.state(), SenderState::Restarting);
        // /bin/sleep rejects our argv and exits non-zero quickly
        entity.start().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(matches!(
            entity.state(),
            SenderState::Err | SenderState::Ok
        ));
        entity.destroy().await.unwrap();
        assert!(matches!(entity.restart(), Err(Error::Destroyed)));
    }

    #[tokio::test]
    async fn test_register_sender_type_checks_executable() {
        let registry = Registry::new("sender", Bus::new(16));
        let err =
            register_sender_type(&registry, context(), "rtmp", "no-such-sender-13fb").unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
    }
}
