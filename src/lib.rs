//! # streamvisor
//!
//! Supervisor and control-channel core for external media helper
//! processes: spawns and restarts stream-source, sender, and port helpers
//! as child processes, and talks to each running source over a private
//! per-entity control channel (request/reply RPC plus a status broadcast
//! subscription).
//!
//! ```text
//!                         ┌────────────┐
//!                         │ Controller │
//!                         └─────┬──────┘
//!            ┌──────────────────┼──────────────────┐
//!            ▼                  ▼                  ▼
//!      Registry<Stream>   Registry<Sender>   Registry<Port>
//!            │                  │                  │
//!            ▼                  ▼                  ▼
//!      StreamEntity       SenderEntity        PortEntity
//!       │    │    │            │                  │
//!       │    │    └── RpcChannel ──► api socket   │
//!       │    └─────── subscriber ◄── broadcast    │
//!       ▼                      ▼                  ▼
//!   StatusCell            ProcWatcher ◄───── WatcherTable
//! ```
//!
//! ## Model
//! - **One watcher per process**: a [`process::ProcWatcher`] owns exactly
//!   one child, polls its liveness, and relaunches it per
//!   [`process::RestartPolicy`]. `stop` guarantees termination
//!   (terminate signal, grace wait, hard kill).
//! - **One channel per entity**: sockets live under
//!   `<channel_root>/<name>/{api,broadcast}`; RPC exchanges correlate by
//!   sequence number, status events feed the per-entity
//!   [`state::StatusCell`] under staleness/ordering/silence rules.
//! - **Name-keyed registries**: [`registry::Registry`] enforces unique
//!   names even under racing creations and guarantees the backing process
//!   is gone before a deleted entity is.
//! - **Lifecycle events**: everything observable goes through the
//!   broadcast [`events::Bus`].
//!
//! ## Quick start
//! ```no_run
//! use std::time::Duration;
//! use streamvisor::{Config, Controller};
//! use streamvisor::stream::{register_builtin_source_types, StreamConfig};
//!
//! # async fn demo() -> streamvisor::Result<()> {
//! let controller = Controller::new(Config::default());
//! register_builtin_source_types(controller.streams(), &controller.context())?;
//!
//! let config = StreamConfig {
//!     url: "rtsp://camera-1/stream".into(),
//!     ..Default::default()
//! };
//! let stream = controller.streams().create("rtsp", "cam-1", config).await?;
//! let status = stream.wait_next_update(Duration::from_secs(2)).await?;
//! println!("cam-1 is {}", status.state);
//!
//! controller.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod port;
pub mod process;
pub mod proto;
pub mod registry;
pub mod sender;
pub mod state;
pub mod stream;

pub use config::Config;
pub use controller::{Controller, ServiceContext};
pub use error::{Error, Result};
pub use events::{Bus, Event, EventKind};
pub use registry::{Entity, Registry};
pub use state::{StatusSnapshot, StreamState};
