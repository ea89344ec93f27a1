use borgpack_core::{Error, Result};
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Result of a finished subprocess.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Trimmed stderr, or a placeholder when the tool printed nothing.
    pub fn diagnostic(&self) -> String {
        let trimmed = self.stderr.trim();
        if trimmed.is_empty() {
            "no diagnostic output".to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn codec_failure(&self, tool: &str) -> Error {
        Error::CodecFailure {
            tool: tool.to_string(),
            status: self.status.to_string(),
            diagnostic: self.diagnostic(),
        }
    }
}

/// One process in a two-stage pipeline.
pub struct Stage {
    pub tool: String,
    pub command: Command,
}

impl Stage {
    pub fn new(tool: impl Into<String>, command: Command) -> Self {
        Self {
            tool: tool.into(),
            command,
        }
    }
}

/// Maps a failed spawn to `ToolUnavailable` when the binary is missing.
pub fn spawn_error(tool: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::tool_unavailable(tool)
    } else {
        Error::Io(err)
    }
}

/// Runs `command` to completion with stdin closed, capturing both output
/// streams. A non-zero exit is not an error here; callers decide.
pub async fn capture(tool: &str, command: &mut Command) -> Result<Captured> {
    debug!(command = ?command.as_std(), "running");
    command.stdin(Stdio::null()).kill_on_drop(true);

    let output = command.output().await.map_err(|e| spawn_error(tool, e))?;
    Ok(Captured {
        status: output.status,
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like `capture`, turning a non-zero exit into `CodecFailure`.
pub async fn run_codec(tool: &str, command: &mut Command) -> Result<Captured> {
    let captured = capture(tool, command).await?;
    if !captured.success() {
        return Err(captured.codec_failure(tool));
    }
    Ok(captured)
}

/// Runs `upstream | downstream`, with both stderr streams captured.
///
/// The caller wires upstream's stdin and downstream's stdout. Both commands
/// are dropped once spawned so the parent holds no pipe ends; an early exit
/// downstream then reaches upstream as SIGPIPE. When both stages fail and
/// upstream died from a signal, the downstream diagnostic is the one
/// reported.
pub async fn pipeline(upstream: Stage, downstream: Stage) -> Result<()> {
    let Stage {
        tool: upstream_tool,
        command: mut upstream_command,
    } = upstream;
    let Stage {
        tool: downstream_tool,
        command: mut downstream_command,
    } = downstream;
    debug!(
        upstream = ?upstream_command.as_std(),
        downstream = ?downstream_command.as_std(),
        "running pipeline"
    );

    upstream_command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let spawned = upstream_command.spawn();
    drop(upstream_command);
    let mut first = spawned.map_err(|e| spawn_error(&upstream_tool, e))?;

    let pipe: Stdio = first
        .stdout
        .take()
        .ok_or_else(|| Error::Io(std::io::Error::other("pipeline stdout was not captured")))?
        .try_into()?;
    downstream_command
        .stdin(pipe)
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let spawned = downstream_command.spawn();
    drop(downstream_command);
    let second = match spawned {
        Ok(child) => child,
        Err(e) => {
            let _ = first.kill().await;
            return Err(spawn_error(&downstream_tool, e));
        }
    };

    let (first, second) = tokio::join!(first.wait_with_output(), second.wait_with_output());
    let first = as_captured(first?);
    let second = as_captured(second?);

    match (first.success(), second.success()) {
        (true, true) => Ok(()),
        (false, false) if broken_pipe(&first.status) => {
            Err(second.codec_failure(&downstream_tool))
        }
        (false, _) => Err(first.codec_failure(&upstream_tool)),
        (true, false) => Err(second.codec_failure(&downstream_tool)),
    }
}

/// Killed by a signal, or a shell reporting SIGPIPE as 128 + 13.
fn broken_pipe(status: &ExitStatus) -> bool {
    status.signal().is_some() || status.code() == Some(141)
}

fn as_captured(output: std::process::Output) -> Captured {
    Captured {
        status: output.status,
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
