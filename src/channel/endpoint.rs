//! # Control endpoint addressing.
//!
//! Every entity owns a pair of Unix-socket paths under
//! `<channel_root>/<name>/`: `api` for request/reply and `broadcast` for
//! publish/subscribe. The pair is derived from the entity name alone and is
//! never persisted.

use std::io;
use std::path::{Path, PathBuf};

/// The two socket addresses of one entity's control channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlEndpoint {
    dir: PathBuf,
    /// Request/reply socket path (`.../api`).
    pub api: PathBuf,
    /// Publish/subscribe socket path (`.../broadcast`).
    pub broadcast: PathBuf,
}

impl ControlEndpoint {
    /// Derives the endpoint pair for `name` under `root`.
    pub fn new(root: &Path, name: &str) -> Self {
        let dir = root.join(name);
        Self {
            api: dir.join("api"),
            broadcast: dir.join("broadcast"),
            dir,
        }
    }

    /// The per-entity directory containing both sockets.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the per-entity directory so helpers can bind their sockets.
    pub fn ensure_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    /// Best-effort removal of the per-entity directory on destroy.
    pub fn cleanup(&self) {
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(dir = %self.dir.display(), %err, "endpoint cleanup failed");
            }
        }
    }
}
