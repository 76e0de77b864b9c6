//! # Port entities: long-lived listening-port gateway processes.
//!
//! A port is the simplest supervised object: one helper process serving a
//! listening port, with start/stop/restart/reload lifecycle but no control
//! channel. `reload` stops the helper and starts it again with a freshly
//! generated argv, which is how a `configure` update takes effect.

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

/// Transport the gateway listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Tcp,
    Udp,
}

/// Configuration of one port entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortConfig {
    /// Port the helper listens on (`-p`).
    pub listen_port: u16,
    /// Listening transport; UDP renders as `--transport=udp`.
    pub transport: Transport,
    /// Listen on IPv6 as well (`-6`).
    pub ipv6: bool,
    /// Helper log file (`-l`).
    pub log_file: Option<String>,
    /// Helper log size limit in bytes (`-L`).
    pub log_size: u64,
    /// Helper log rotation count (`-r`).
    pub log_rotate: u32,
    /// Relaunch delay after a non-zero helper exit; `None` = global default.
    pub err_restart_interval: Option<Duration>,
    /// Free-text description for the outer layers.
    pub desc: String,
    /// Extra `--key=value` helper options.
    pub extra_options: BTreeMap<String, String>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            transport: Transport::Tcp,
            ipv6: false,
            log_file: None,
            log_size: 10 * 1024 * 1024,
            log_rotate: 3,
            err_restart_interval: None,
            desc: String::new(),
            extra_options: BTreeMap::new(),
        }
    }
}

impl PortConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(Error::Config("port listen_port must not be zero".into()));
        }
        Ok(())
    }

    /// Builds the gateway helper launch command.
    pub fn command(&self, executable: &str) -> CommandSpec {
        let mut cmd = CommandSpec::new(executable).flag("-p", self.listen_port);
        if self.ipv6 {
            cmd = cmd.arg("-6");
        }
        cmd = cmd.log_args(self.log_file.as_deref(), self.log_size, self.log_rotate);
        if self.transport == Transport::Udp {
            cmd = cmd.arg("--transport=udp");
        }
        cmd.extra_options(&self.extra_options)
    }
}

struct PortShared {
    name: Arc<str>,
    bus: Bus,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn watcher_listener(shared: Arc<PortShared>) -> StatusListener {
    Arc::new(move |snap: &WatcherSnapshot| {
        let status = match snap.status {
            ProcStatus::Running => "running",
            ProcStatus::Stopped => "stopped",
            ProcStatus::Error => "error",
        };
        shared.bus.publish(
            Event::now(EventKind::PortStatusChanged)
                .with_entity(shared.name.clone())
                .with_detail(status),
        );
    })
}

/// One managed listening-port process.
pub struct PortEntity {
    shared: Arc<PortShared>,
    type_name: String,
    config: Mutex<PortConfig>,
    runtime: Config,
    watchers: WatcherTable,
    executable: String,
    watcher: Mutex<Option<ProcWatcher>>,
    destroyed: AtomicBool,
}

impl PortEntity {
    pub(crate) fn new(
        name: Arc<str>,
        type_name: String,
        config: PortConfig,
        executable: String,
        ctx: &ServiceContext,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            shared: Arc::new(PortShared {
                name,
                bus: ctx.bus.clone(),
            }),
            type_name,
            config: Mutex::new(config),
            runtime: ctx.runtime.clone(),
            watchers: ctx.watchers.clone(),
            executable,
            watcher: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }))
    }

    /// Launches the gateway helper. Idempotent while the entity is alive.
    pub fn start(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        let mut slot = lock(&self.watcher);
        if slot.is_none() {
            let config = lock(&self.config).clone();
            let command = config.command(&self.executable);
            let policy = RestartPolicy {
                error_interval: config
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

    /// Stops the helper; the entity stays alive and can be started again.
    pub async fn stop(&self) {
        let watcher = lock(&self.watcher).take();
        if let Some(watcher) = watcher {
            watcher.stop(self.runtime.stop_grace).await;
        }
    }

    /// Terminates the helper; the monitor relaunches it per policy.
    pub fn restart(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        if let Some(watcher) = lock(&self.watcher).clone() {
            watcher.restart_process();
        }
        Ok(())
    }

    /// Stops the helper and starts it again with a freshly generated argv,
    /// picking up any `configure` update.
    pub async fn reload(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        self.stop().await;
        self.start()
    }

    /// Replaces the configuration; takes effect on the next `reload` (or
    /// `start` after a `stop`).
    pub fn configure(&self, config: PortConfig) -> Result<()> {
        config.validate()?;
        *lock(&self.config) = config;
        Ok(())
    }

    /// True while the gateway process is alive.
    pub fn is_running(&self) -> bool {
        lock(&self.watcher)
            .as_ref()
            .map(|w| w.is_running())
            .unwrap_or(false)
    }

    /// Snapshot of the helper process, if started.
    pub fn process_snapshot(&self) -> Option<WatcherSnapshot> {
        lock(&self.watcher).as_ref().map(|w| w.snapshot())
    }

    /// Current configuration.
    pub fn config(&self) -> PortConfig {
        lock(&self.config).clone()
    }

    async fn teardown(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop().await;
        tracing::info!(name = %self.shared.name, "port destroyed");
        Ok(())
    }
}

#[async_trait]
impl Entity for PortEntity {
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

/// Registers a port type running `executable`.
///
/// Fails with `LaunchError` when the executable is missing.
pub fn register_port_type(
    registry: &Registry<PortConfig, PortEntity>,
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
    let factory: Factory<PortConfig, PortEntity> = Arc::new(move |name, config| {
        let ctx = ctx.clone();
        let type_name = type_name_owned.clone();
        let executable = executable.clone();
        Box::pin(async move {
            let entity = PortEntity::new(name, type_name, config, executable, &ctx)?;
            entity.start()?;
            Ok(entity)
        })
    });
    registry.register_type(type_name, factory)
}
