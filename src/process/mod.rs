//! Child-process supervision: launch specs, restart policy, watchers.

mod command;
mod policy;
mod table;
mod watcher;

pub use command::CommandSpec;
pub(crate) use command::executable_reachable;
pub use policy::RestartPolicy;
pub use table::WatcherTable;
pub use watcher::{ProcStatus, ProcWatcher, StatusListener, WatcherSnapshot};
