use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::types::CommandOutput;
use crate::{Error, Result};

/// Runs an external program and captures its exit status and output.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Run `program` with `args`, optionally feeding `stdin` to it.
    async fn run(&self, program: &str, args: &[String], stdin: Option<&str>)
    -> Result<CommandOutput>;
}

/// Render a command line the way a shell user would type it.
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Spawns local processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput> {
        let command = render_command(program, args);
        tracing::debug!(%command, "running local command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(body)) = (pipe, stdin) {
                match pipe.write_all(body.as_bytes()).await {
                    // The child may exit before reading its input; its exit
                    // status tells the caller what happened.
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                    other => other?,
                }
            }
            Ok::<_, std::io::Error>(())
        };

        let (_, output) = tokio::try_join!(feed, child.wait_with_output())?;

        let result = CommandOutput {
            command,
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(command = %result.command, exit_code = result.exit_code, "command finished");
        Ok(result)
    }
}
