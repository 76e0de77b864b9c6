//! # Stream source configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::CommandSpec;
use crate::registry::validate_entity_name;

/// Whether this core runs the helper process or only talks to one that is
/// managed externally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// The helper is spawned and supervised by this core.
    Active,
    /// The helper is launched by someone else; only the control channel is
    /// used.
    Passive,
}

/// Configuration of one stream source entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Source URL handed to the helper (`-u`).
    pub url: String,
    /// TCP port the helper should serve media clients on (`-p`).
    pub api_tcp_port: u16,
    /// Helper log file (`-l`); absent = helper logs nowhere.
    pub log_file: Option<String>,
    /// Helper log size limit in bytes (`-L`).
    pub log_size: u64,
    /// Helper log rotation count (`-r`).
    pub log_rotate: u32,
    /// Relaunch delay after a non-zero helper exit; `None` = global default.
    pub err_restart_interval: Option<Duration>,
    /// Extra `--key=value` helper options; underscores render as hyphens.
    pub extra_options: BTreeMap<String, String>,
    /// Supervision mode.
    pub mode: StreamMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_tcp_port: 0,
            log_file: None,
            log_size: 10 * 1024 * 1024,
            log_rotate: 3,
            err_restart_interval: None,
            extra_options: BTreeMap::new(),
            mode: StreamMode::Active,
        }
    }
}

impl StreamConfig {
    /// Validates the configuration for an entity named `name`.
    pub fn validate(&self, name: &str) -> Result<()> {
        validate_entity_name(name)?;
        if self.mode == StreamMode::Active && self.url.is_empty() {
            return Err(Error::Config("stream url must not be empty".into()));
        }
        Ok(())
    }

    /// Builds the helper launch command:
    /// `-s <name> -p <port> [-l/-L/-r] -u <url> [--extras…]`.
    pub fn command(&self, executable: &str, name: &str) -> CommandSpec {
        CommandSpec::new(executable)
            .flag("-s", name)
            .flag("-p", self.api_tcp_port)
            .log_args(self.log_file.as_deref(), self.log_size, self.log_rotate)
            .flag("-u", &self.url)
            .extra_options(&self.extra_options)
    }
}
