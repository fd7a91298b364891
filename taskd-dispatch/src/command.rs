//! Subprocess spawn and line-buffered streaming execution.

use std::process::Stdio;

use async_trait::async_trait;
use taskd_proto::StreamOutputResponse;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::privilege;

/// A single shell command to run, optionally under a different user identity.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell command line, passed to `/bin/sh -c`.
    pub command: String,
    /// Optional user identity to drop privileges to before exec (unix only).
    pub user: Option<String>,
}

impl CommandSpec {
    /// Builds a spec for the given command line with no privilege drop.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            user: None,
        }
    }

    /// Sets the user identity to execute as.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Destination for streamed [`StreamOutputResponse`] chunks.
///
/// Implementations apply their own backpressure (a bounded channel, a network
/// write that can block); `run_streaming` awaits each `send` before reading
/// more subprocess output, so a slow sink slows the producer rather than
/// buffering unboundedly in memory.
#[async_trait]
pub trait ChunkSink: Send {
    /// Delivers one chunk. An error means the receiver is gone; the caller
    /// should stop reading from the subprocess.
    async fn send(&mut self, chunk: StreamOutputResponse) -> DispatchResult<()>;
}

#[async_trait]
impl<S: ChunkSink + ?Sized> ChunkSink for &mut S {
    async fn send(&mut self, chunk: StreamOutputResponse) -> DispatchResult<()> {
        (**self).send(chunk).await
    }
}

fn build_command(spec: &CommandSpec) -> DispatchResult<Command> {
    if spec.command.trim().is_empty() {
        return Err(DispatchError::InvalidRequest(
            "command must not be empty".into(),
        ));
    }

    let mut command = Command::new("/bin/sh");
    command
        .arg("-c")
        .arg(&spec.command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(user) = &spec.user {
        privilege::apply(&mut command, user)?;
    }

    Ok(command)
}

/// Runs `spec`, streaming each output line to `sink` as it is produced, and
/// finally sends exactly one terminal chunk carrying the exit code (or an
/// error chunk if the subprocess never started).
///
/// Stdout and stderr are drained concurrently so a chatty process on one
/// stream cannot stall delivery of the other.
pub async fn run_streaming(
    spec: CommandSpec,
    mut sink: impl ChunkSink,
) -> DispatchResult<()> {
    let mut command = match build_command(&spec) {
        Ok(command) => command,
        Err(err) => {
            sink.send(StreamOutputResponse::finished_with_error(err.to_string()))
                .await?;
            return Err(err);
        }
    };

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            let message = format!("failed to start subprocess: {err}");
            sink.send(StreamOutputResponse::finished_with_error(&message))
                .await?;
            return Err(DispatchError::SpawnFailed(message));
        }
    };

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut stdout_done = false;
    let mut stderr_done = false;
    while !stdout_done || !stderr_done {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => sink.send(StreamOutputResponse::stdout(line)).await?,
                    Ok(None) => stdout_done = true,
                    Err(err) => {
                        warn!(%err, "stdout read failed");
                        stdout_done = true;
                    }
                }
            }
            line = stderr_lines.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => sink.send(StreamOutputResponse::stderr(line)).await?,
                    Ok(None) => stderr_done = true,
                    Err(err) => {
                        warn!(%err, "stderr read failed");
                        stderr_done = true;
                    }
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|err| DispatchError::SpawnFailed(err.to_string()))?;
    let exit_code = status.code().unwrap_or(-1);
    debug!(exit_code, command = %spec.command, "subprocess finished");
    sink.send(StreamOutputResponse::finished_with_exit_code(exit_code))
        .await
}

/// Collected result of a non-streaming run, used by callers (the task
/// interpreter) that want the full output rather than incremental chunks.
#[derive(Debug, Default)]
pub struct CompletedCommand {
    /// Full captured stdout, newline-joined.
    pub stdout: String,
    /// Full captured stderr, newline-joined.
    pub stderr: String,
    /// Process exit code, absent if the subprocess never started.
    pub exit_code: Option<i32>,
}

impl CompletedCommand {
    /// `true` iff the subprocess started and exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

struct AggregatingSink {
    stdout: Vec<String>,
    stderr: Vec<String>,
    exit_code: Option<i32>,
    error: Option<String>,
}

#[async_trait]
impl ChunkSink for AggregatingSink {
    async fn send(&mut self, chunk: StreamOutputResponse) -> DispatchResult<()> {
        if let Some(line) = chunk.stdout_chunk {
            self.stdout.push(line);
        }
        if let Some(line) = chunk.stderr_chunk {
            self.stderr.push(line);
        }
        if chunk.finished {
            self.exit_code = chunk.exit_code;
            self.error = chunk.error;
        }
        Ok(())
    }
}

/// Runs `spec` to completion, aggregating all output rather than streaming it.
///
/// # Errors
///
/// Returns an error only when the subprocess could not be spawned at all;
/// a nonzero exit code is reported via [`CompletedCommand::success`], not
/// as an `Err`.
pub async fn run_to_completion(spec: CommandSpec) -> DispatchResult<CompletedCommand> {
    let mut sink = AggregatingSink {
        stdout: Vec::new(),
        stderr: Vec::new(),
        exit_code: None,
        error: None,
    };
    let command = build_command(&spec)?;
    run_spawned(command, &mut sink).await?;

    if let Some(error) = sink.error {
        return Err(DispatchError::SpawnFailed(error));
    }
    Ok(CompletedCommand {
        stdout: sink.stdout.join("\n"),
        stderr: sink.stderr.join("\n"),
        exit_code: sink.exit_code,
    })
}

async fn run_spawned(mut command: Command, sink: &mut AggregatingSink) -> DispatchResult<()> {
    let mut child = command
        .spawn()
        .map_err(|err| DispatchError::SpawnFailed(err.to_string()))?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut stdout_done = false;
    let mut stderr_done = false;
    while !stdout_done || !stderr_done {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => sink.stdout.push(line),
                    Ok(None) => stdout_done = true,
                    Err(_) => stdout_done = true,
                }
            }
            line = stderr_lines.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => sink.stderr.push(line),
                    Ok(None) => stderr_done = true,
                    Err(_) => stderr_done = true,
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|err| DispatchError::SpawnFailed(err.to_string()))?;
    sink.exit_code = Some(status.code().unwrap_or(-1));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink(Vec<StreamOutputResponse>);

    #[async_trait]
    impl ChunkSink for VecSink {
        async fn send(&mut self, chunk: StreamOutputResponse) -> DispatchResult<()> {
            self.0.push(chunk);
            Ok(())
        }
    }

    #[tokio::test]
    async fn streams_stdout_then_finishes_with_exit_code() {
        let spec = CommandSpec::new("echo hello");
        let mut sink = VecSink(Vec::new());
        run_streaming(spec, &mut sink).await.unwrap();

        let last = sink.0.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.exit_code, Some(0));
        assert!(sink.0.iter().any(|c| c.stdout_chunk.as_deref() == Some("hello")));
    }

    #[tokio::test]
    async fn empty_command_is_rejected_without_spawning() {
        let spec = CommandSpec::new("   ");
        let mut sink = VecSink(Vec::new());
        let err = run_streaming(spec, &mut sink).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
        assert!(sink.0.last().unwrap().finished);
    }

    #[tokio::test]
    async fn run_to_completion_reports_nonzero_exit() {
        let result = run_to_completion(CommandSpec::new("exit 7")).await.unwrap();
        assert_eq!(result.exit_code, Some(7));
        assert!(!result.success());
    }
}
