//! Adapters around the tools doing the actual work: an external renderer
//! process and the Sass compiler.
//!
//! External processes go through [`Cmd`], which captures both output
//! streams and reports every line to the log with a label, so a chatty
//! tool reads like part of our own output.

pub mod render;
pub mod style;

use std::ffi::{OsStr, OsString};
use std::process::{ExitStatus, Stdio};

use camino::Utf8PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::ToolError;

/// Command builder for external process execution.
#[derive(Debug, Clone, Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<Utf8PathBuf>,
    label: Option<String>,
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Cmd {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Create from a command array (e.g., `["npx", "eleventy"]`).
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Result<Self, ToolError> {
        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| ToolError::Empty("external tool".into()))?;

        Ok(Self::new(program).args(args))
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Prefix used for the logged output lines; defaults to the program.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.program_name())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        command
    }

    fn spawn_child(&self) -> Result<Child, ToolError> {
        self.command()
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.program_name(),
                source,
            })
    }

    /// Runs the command to completion, logging its output.
    ///
    /// A nonzero exit status is an error.
    pub async fn run(&self) -> Result<ToolOutput, ToolError> {
        let label = self.display_label();
        tracing::debug!(program = %self.program_name(), args = ?self.args, "spawning");

        let mut child = self.spawn_child()?;
        let stdout = child.stdout.take().map(|out| pump(out, label.clone()));
        let stderr = child.stderr.take().map(|err| pump(err, label.clone()));

        let status = child.wait().await?;
        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;

        if !status.success() {
            return Err(ToolError::Failed {
                program: self.program_name(),
                code: status.code(),
            });
        }

        Ok(ToolOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Spawns the command for a long-running session; output lines are
    /// logged as they arrive.
    pub fn spawn(&self) -> Result<Child, ToolError> {
        let label = self.display_label();
        tracing::debug!(program = %self.program_name(), args = ?self.args, "spawning");

        let mut child = self.spawn_child()?;
        if let Some(out) = child.stdout.take() {
            pump(out, label.clone());
        }
        if let Some(err) = child.stderr.take() {
            pump(err, label);
        }

        Ok(child)
    }

    pub(crate) fn describe(&self) -> String {
        self.program_name()
    }
}

/// Reads `stream` line by line into the log, returning everything read.
fn pump<R>(stream: R, label: String) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut acc = String::new();

        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                tracing::info!("{label}: {line}");
            }
            acc.push_str(&line);
            acc.push('\n');
        }

        acc
    })
}

async fn collect(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
