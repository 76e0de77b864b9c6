//! # Launch specification for helper processes.
//!
//! [`CommandSpec`] carries a program name plus argv and knows the shared
//! flag conventions of the helper programs: `-s <name>`, `-p <port>`,
//! `-u <url>`, the `-l/-L/-r` log triple, and free-form `--key=value`
//! extras where underscores in keys are rendered as hyphens.

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{Error, Result};

/// A program plus its argument vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Argument vector (without argv\[0\]).
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a spec with an empty argument vector.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a flag with its value, e.g. `flag("-s", name)`.
    pub fn flag(mut self, flag: &str, value: impl ToString) -> Self {
        self.args.push(flag.to_string());
        self.args.push(value.to_string());
        self
    }

    /// Appends the `-l <file> -L <size> -r <rotate>` log triple when a log
    /// file is configured.
    pub fn log_args(self, log_file: Option<&str>, log_size: u64, log_rotate: u32) -> Self {
        match log_file {
            Some(file) if !file.is_empty() => self
                .flag("-l", file)
                .flag("-L", log_size)
                .flag("-r", log_rotate),
            _ => self,
        }
    }

    /// Appends `--key=value` extras; underscores in keys become hyphens.
    pub fn extra_options(mut self, extras: &BTreeMap<String, String>) -> Self {
        for (key, value) in extras {
            let key = key.replace('_', "-");
            self.args.push(format!("--{key}={value}"));
        }
        self
    }

    /// Spawns the child with all stdio suppressed.
    ///
    /// `kill_on_drop` is set so an abandoned handle can never leak a live
    /// process past the watcher.
    pub(crate) fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::Launch {
                program: self.program.clone(),
                reason: err.to_string(),
            })
    }
}

/// True when `program` names an existing file, directly or via `PATH`.
///
/// Used at type-registration time so a missing helper binary fails early
/// instead of at the first create.
pub(crate) fn executable_reachable(program: &str) -> bool {
    let path = std::path::Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    let Some(dirs) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&dirs).any(|dir| dir.join(program).is_file())
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_and_log_args() {
        let spec = CommandSpec::new("stsw_rtsp_source")
            .flag("-s", "cam-1")
            .flag("-p", 0)
            .log_args(Some("/var/log/cam-1.log"), 1024 * 1024, 3)
            .flag("-u", "rtsp://host/stream");
        assert_eq!(
            spec.args,
            vec![
                "-s", "cam-1", "-p", "0", "-l", "/var/log/cam-1.log", "-L", "1048576", "-r",
                "3", "-u", "rtsp://host/stream"
            ]
        );
    }

    #[test]
    fn test_log_args_skipped_without_file() {
        let spec = CommandSpec::new("x").log_args(None, 1024, 3);
        assert!(spec.args.is_empty());
    }

    #[test]
    fn test_extra_options_render_hyphens() {
        let mut extras = BTreeMap::new();
        extras.insert("native_frame_rate".to_string(), "1".to_string());
        extras.insert("probe_size".to_string(), "65536".to_string());
        let spec = CommandSpec::new("x").extra_options(&extras);
        assert_eq!(
            spec.args,
            vec!["--native-frame-rate=1", "--probe-size=65536"]
        );
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_is_launch_error() {
        let spec = CommandSpec::new("definitely-not-a-real-binary-7f3a");
        match spec.spawn() {
            Err(Error::Launch { program, .. }) => {
                assert_eq!(program, "definitely-not-a-real-binary-7f3a")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
