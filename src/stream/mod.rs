//! # Stream source entities.
//!
//! A [`StreamEntity`] ties together everything one managed source needs:
//! the supervised helper process (when active), the RPC channel to its
//! `api` endpoint, the subscriber task feeding its [`StatusCell`], and the
//! RPC operations exposed to external collaborators.
//!
//! ```text
//!                    ┌───────────────┐   spawn/stop   ┌─────────────┐
//!                    │  StreamEntity │ ─────────────► │ ProcWatcher │
//!                    └──────┬────────┘                └─────────────┘
//!            RPC call       │        subscriber task
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//!   RpcChannel        ControlEndpoint     StatusCell ◄── STREAM_INFO
//! ```

mod factory;
mod types;

pub use factory::{
    register_builtin_source_types, register_passive_source_type, register_process_source_type,
    FILE_LIVE_EXECUTABLE, PROXY_EXECUTABLE, RTSP_EXECUTABLE,
};
pub use types::{StreamConfig, StreamMode};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;

use crate::channel::{
    spawn_subscriber, ControlEndpoint, RpcChannel, SubscriberHandle, SubscriberTiming,
};
use crate::config::Config;
use crate::controller::ServiceContext;
use crate::error::{Error, Result};
use crate::process::{ProcWatcher, RestartPolicy, WatcherSnapshot, WatcherTable};
use crate::proto::{ClientListRep, ClientListReq, MediaStatisticMsg, OpCode, StreamMetadataMsg};
use crate::registry::Entity;
use crate::state::{StatusCell, StatusSnapshot};

/// One managed stream source.
pub struct StreamEntity {
    name: Arc<str>,
    type_name: String,
    config: StreamConfig,
    runtime: Config,
    endpoint: ControlEndpoint,
    cell: Arc<StatusCell>,
    rpc: RpcChannel,
    watchers: WatcherTable,
    executable: Option<String>,
    watcher: Mutex<Option<ProcWatcher>>,
    subscriber: Mutex<Option<SubscriberHandle>>,
    generation: Arc<AtomicU64>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for StreamEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEntity")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn decode_body<T: Message + Default>(body: &[u8], what: &'static str) -> Result<T> {
    T::decode(body).map_err(|_| Error::InvalidReply(what))
}

impl StreamEntity {
    /// Builds an unstarted entity; `executable` is `Some` for process-backed
    /// (active) sources.
    pub(crate) fn new(
        name: Arc<str>,
        type_name: String,
        config: StreamConfig,
        executable: Option<String>,
        ctx: &ServiceContext,
    ) -> Result<Arc<Self>> {
        config.validate(&name)?;
        let endpoint = ControlEndpoint::new(&ctx.runtime.channel_root, &name);
        let cell = Arc::new(StatusCell::new(
            name.clone(),
            ctx.runtime.staleness_window_or_default(),
            ctx.runtime.silence_timeout,
            ctx.bus.clone(),
        ));
        let rpc = RpcChannel::new(&endpoint);
        Ok(Arc::new(Self {
            name,
            type_name,
            config,
            runtime: ctx.runtime.clone(),
            endpoint,
            cell,
            rpc,
            watchers: ctx.watchers.clone(),
            executable,
            watcher: Mutex::new(None),
            subscriber: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            destroyed: AtomicBool::new(false),
        }))
    }

    /// Launches the helper process (active mode) and the subscriber task.
    /// Idempotent while the entity is alive.
    pub async fn start(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        self.endpoint.ensure_dir()?;

        if let Some(executable) = &self.executable {
            let mut slot = lock(&self.watcher);
            if slot.is_none() {
                let command = self.config.command(executable, &self.name);
                let policy = RestartPolicy {
                    error_interval: self
                        .config
                        .err_restart_interval
                        .unwrap_or(self.runtime.error_restart_interval),
                    success_interval: self.runtime.success_restart_interval,
                };
                *slot = Some(self.watchers.spawn(self.name.clone(), command, policy, None)?);
            }
        }

        let mut slot = lock(&self.subscriber);
        if slot.is_none() {
            *slot = Some(spawn_subscriber(
                self.endpoint.clone(),
                Arc::clone(&self.cell),
                SubscriberTiming {
                    poll: self.runtime.poll_interval,
                    reconnect_delay: self.runtime.reconnect_delay,
                },
                Arc::clone(&self.generation),
            ));
        }
        Ok(())
    }

    /// Graceful reconnect: state returns to `Connecting`, the cached RPC
    /// socket is dropped, and the helper gets the terminate signal (its
    /// monitor relaunches per policy).
    pub fn restart(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        self.cell.reset();
        self.rpc.invalidate();
        if let Some(watcher) = lock(&self.watcher).clone() {
            watcher.restart_process();
        }
        tracing::info!(name = %self.name, "stream restart requested");
        Ok(())
    }

    /// Fetches the METADATA reply.
    pub async fn get_stream_metadata(&self, timeout: Duration) -> Result<StreamMetadataMsg> {
        let (_, body, _) = self
            .rpc
            .call(OpCode::Metadata, Vec::new(), None, timeout)
            .await?;
        decode_body(&body, "undecodable metadata body")
    }

    /// Fetches the MEDIA_STATISTIC reply.
    pub async fn get_stream_statistic(&self, timeout: Duration) -> Result<MediaStatisticMsg> {
        let (_, body, _) = self
            .rpc
            .call(OpCode::MediaStatistic, Vec::new(), None, timeout)
            .await?;
        decode_body(&body, "undecodable statistic body")
    }

    /// Fetches one page of the connected-client list.
    pub async fn get_client_list(
        &self,
        start_index: u32,
        max_clients: u32,
        timeout: Duration,
    ) -> Result<ClientListRep> {
        let request = ClientListReq {
            start_index,
            client_num: max_clients,
        };
        let (_, body, _) = self
            .rpc
            .call(OpCode::ClientList, request.encode_to_vec(), None, timeout)
            .await?;
        decode_body(&body, "undecodable client list body")
    }

    /// Asks the helper to produce a key frame as soon as possible.
    pub async fn key_frame(&self, timeout: Duration) -> Result<()> {
        self.rpc
            .call(OpCode::KeyFrame, Vec::new(), None, timeout)
            .await?;
        Ok(())
    }

    /// Current status snapshot; never blocks.
    pub fn status(&self) -> StatusSnapshot {
        self.cell.snapshot()
    }

    /// Long-poll: blocks until the next status change, up to `timeout`.
    pub async fn wait_next_update(&self, timeout: Duration) -> Result<StatusSnapshot> {
        self.cell.wait_next_update(timeout).await
    }

    /// Snapshot of the helper process, when this source is process-backed.
    pub fn process_snapshot(&self) -> Option<WatcherSnapshot> {
        lock(&self.watcher).as_ref().map(|w| w.snapshot())
    }

    /// Control endpoint of this entity.
    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Entity configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    async fn teardown(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // old-generation subscriber tasks must never touch state again
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.rpc.mark_destroyed();
        let subscriber = lock(&self.subscriber).take();
        if let Some(subscriber) = subscriber {
            subscriber.shutdown().await;
        }
        let watcher = lock(&self.watcher).take();
        if let Some(watcher) = watcher {
            watcher.stop(self.runtime.stop_grace).await;
        }
        self.endpoint.cleanup();
        tracing::info!(name = %self.name, "stream destroyed");
        Ok(())
    }
}

#[async_trait]
impl Entity for StreamEntity {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    async fn destroy(&self) -> Result<()> {
        self.teardown().await
    }
}
