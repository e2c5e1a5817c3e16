//! Process-launch collaborator
//!
//! The platform launchers and the command toolchain never touch
//! `tokio::process` directly; they go through [`ProcessRunner`] so sessions can
//! be driven against a recording fake in tests.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;

use crate::command::ShellCommand;
use crate::process::{forward_output, spawn_error, ShellProcess};
use qdev_core::prelude::*;

/// How long `run` keeps reading output after the command has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to a process started with [`ProcessRunner::spawn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

/// Launches external programs on behalf of the session.
#[trait_variant::make(ProcessRunner: Send)]
pub trait LocalProcessRunner {
    /// Resolve an executable name to a path, failing with `ToolNotFound`
    fn locate(&self, program: &str) -> Result<PathBuf>;

    /// Run a command to completion; a non-zero exit is an error
    async fn run(&self, command: &ShellCommand) -> Result<()>;

    /// Start a long-running command and keep it managed by the runner
    async fn spawn(&self, command: &ShellCommand) -> Result<ProcessId>;

    /// Stop a process started with `spawn` and wait until it is gone
    async fn kill(&self, id: ProcessId) -> Result<()>;

    /// Whether a spawned process is still alive
    async fn is_running(&self, id: ProcessId) -> bool;
}

/// [`ProcessRunner`] backed by real OS processes
#[derive(Default)]
pub struct SystemRunner {
    processes: Mutex<HashMap<ProcessId, ShellProcess>>,
    next_id: AtomicU64,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop every process still managed by this runner
    pub async fn shutdown_all(&self) {
        let drained: Vec<(ProcessId, ShellProcess)> =
            self.processes.lock().await.drain().collect();
        for (id, mut process) in drained {
            if let Err(e) = process.shutdown().await {
                warn!("Failed to stop {} ({}): {}", process.program(), id, e);
            }
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn locate(&self, program: &str) -> Result<PathBuf> {
        which::which(program).map_err(|e| {
            debug!("Lookup of {} failed: {}", program, e);
            Error::tool_not_found(program)
        })
    }

    async fn run(&self, command: &ShellCommand) -> Result<()> {
        info!("Running: {}", command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(&command.program, e))?;
        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_output(out, command.program.clone(), false)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_output(err, command.program.clone(), true)));

        let status = child.wait().await?;

        // A background child can keep the pipes open after the command exits.
        let mut output = Vec::new();
        for mut reader in [stdout, stderr].into_iter().flatten() {
            match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await {
                Ok(Ok(lines)) => output.extend(lines),
                Ok(Err(e)) => warn!("Output reader for {} failed: {}", command.program, e),
                Err(_) => {
                    debug!("{} left its output open, detaching", command.program);
                    reader.abort();
                }
            }
        }

        if status.success() {
            Ok(())
        } else {
            Err(Error::ProcessExit {
                program: command.to_string(),
                code: status.code(),
                output,
            })
        }
    }

    async fn spawn(&self, command: &ShellCommand) -> Result<ProcessId> {
        let process = ShellProcess::spawn(command)?;
        let id = ProcessId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.processes.lock().await.insert(id, process);
        Ok(id)
    }

    async fn kill(&self, id: ProcessId) -> Result<()> {
        let process = self.processes.lock().await.remove(&id);
        match process {
            Some(mut process) => process.shutdown().await,
            None => {
                debug!("kill({}) ignored: process is not managed", id);
                Ok(())
            }
        }
    }

    async fn is_running(&self, id: ProcessId) -> bool {
        self.processes
            .lock()
            .await
            .get(&id)
            .map(ShellProcess::is_running)
            .unwrap_or(false)
    }
}
