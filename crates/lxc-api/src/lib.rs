//! Typed Rust client for the `lxc` command-line tool.
//!
//! Covers the subset needed to manage throwaway test containers:
//! container info, init, start, stop, delete, exec, file push, raw config,
//! image lookup, and image import through the separate `lxd-images` tool.
//!
//! Every call returns the captured [`CommandOutput`]; interpreting exit
//! codes is left to the caller.

mod info;
mod runner;
mod types;

use std::path::Path;
use std::sync::Arc;

pub use info::{parse_ipv4, parse_status};
pub use runner::{CommandRunner, ProcessRunner, render_command};
pub use types::*;

const DEFAULT_LXC_BIN: &str = "lxc";
const DEFAULT_IMPORT_BIN: &str = "lxd-images";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the `lxc` CLI.
#[derive(Clone)]
pub struct LxcClient {
    runner: Arc<dyn CommandRunner>,
    lxc_bin: String,
    import_bin: String,
}

impl LxcClient {
    /// Client spawning real `lxc` / `lxd-images` processes.
    pub fn new() -> Self {
        Self::with_runner(Arc::new(ProcessRunner))
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            lxc_bin: DEFAULT_LXC_BIN.into(),
            import_bin: DEFAULT_IMPORT_BIN.into(),
        }
    }

    /// Override the hypervisor and image-import binaries.
    pub fn binaries(mut self, lxc_bin: impl Into<String>, import_bin: impl Into<String>) -> Self {
        self.lxc_bin = lxc_bin.into();
        self.import_bin = import_bin.into();
        self
    }

    pub fn lxc_bin(&self) -> &str {
        &self.lxc_bin
    }

    pub fn import_bin(&self) -> &str {
        &self.import_bin
    }

    async fn lxc(&self, args: Vec<String>, stdin: Option<&str>) -> Result<CommandOutput> {
        self.runner.run(&self.lxc_bin, &args, stdin).await
    }

    // ── Containers ──────────────────────────────────────────────────

    pub async fn info(&self, name: &str) -> Result<CommandOutput> {
        self.lxc(vec!["info".into(), name.into()], None).await
    }

    pub async fn init(&self, req: &InitRequest) -> Result<CommandOutput> {
        self.lxc(req.args(), None).await
    }

    pub async fn start(&self, name: &str) -> Result<CommandOutput> {
        self.lxc(vec!["start".into(), name.into()], None).await
    }

    pub async fn stop(&self, name: &str) -> Result<CommandOutput> {
        self.lxc(vec!["stop".into(), name.into()], None).await
    }

    pub async fn delete(&self, name: &str) -> Result<CommandOutput> {
        self.lxc(vec!["delete".into(), name.into()], None).await
    }

    /// Set `raw.<subsystem>` on a container, feeding the value on stdin.
    pub async fn config_set_raw(
        &self,
        name: &str,
        subsystem: &str,
        value: &str,
    ) -> Result<CommandOutput> {
        self.lxc(
            vec![
                "config".into(),
                "set".into(),
                name.into(),
                format!("raw.{subsystem}"),
                "-".into(),
            ],
            Some(value),
        )
        .await
    }

    // ── Exec / files ────────────────────────────────────────────────

    /// Run `command` inside the container.
    pub async fn exec(
        &self,
        name: &str,
        command: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput> {
        let mut args: Vec<String> = vec!["exec".into(), name.into(), "--".into()];
        args.extend(command.iter().map(|c| c.to_string()));
        self.lxc(args, stdin).await
    }

    /// Copy a local file to `remote_path` inside the container.
    pub async fn file_push(
        &self,
        local_path: &Path,
        name: &str,
        remote_path: &str,
    ) -> Result<CommandOutput> {
        self.lxc(
            vec![
                "file".into(),
                "push".into(),
                local_path.display().to_string(),
                format!("{name}/{}", remote_path.trim_start_matches('/')),
            ],
            None,
        )
        .await
    }

    // ── Images ──────────────────────────────────────────────────────

    pub async fn image_show(&self, alias: &str) -> Result<CommandOutput> {
        self.lxc(vec!["image".into(), "show".into(), alias.into()], None)
            .await
    }

    /// Import `os`/`release` from the image server under `alias`.
    ///
    /// Long-running; progress goes to the import tool's own output.
    pub async fn import_image(&self, os: &str, release: &str, alias: &str) -> Result<CommandOutput> {
        let args: Vec<String> = vec![
            "import".into(),
            os.into(),
            release.into(),
            "--alias".into(),
            alias.into(),
        ];
        self.runner.run(&self.import_bin, &args, None).await
    }

    /// The import command line, for operators who want to run it by hand.
    pub fn import_command_line(&self, os: &str, release: &str, alias: &str) -> String {
        format!("{} import {os} {release} --alias {alias}", self.import_bin)
    }
}

impl Default for LxcClient {
    fn default() -> Self {
        Self::new()
    }
}
