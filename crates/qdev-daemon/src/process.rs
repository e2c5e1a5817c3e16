//! Managed child process

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Notify};

use crate::command::ShellCommand;
use qdev_core::prelude::*;

/// How long `shutdown()` waits for the wait task to reap a killed child
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Output lines kept per stream for error reports
const OUTPUT_TAIL_LINES: usize = 20;

/// A long-running external process (dev server, emulator runner, desktop shell).
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task.
/// `ShellProcess` retains a kill channel to request termination, an atomic flag
/// for synchronous `has_exited()` checks, and a [`Notify`] so `shutdown()` can
/// await the exit without polling.
pub struct ShellProcess {
    /// Program name for logging
    program: String,
    /// Process ID for logging
    pid: Option<u32>,
    /// Tells the wait task to kill the process. Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

impl ShellProcess {
    /// Spawn `command` with piped output forwarded to the log
    pub fn spawn(command: &ShellCommand) -> Result<Self> {
        info!("Spawning: {}", command);

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

        let pid = child.id();
        info!("{} started with PID: {:?}", command.program, pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, command.program.clone(), false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, command.program.clone(), true));
        }

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            command.program.clone(),
            kill_rx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            program: command.program.clone(),
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    /// Background task: owns `child`, waits for it to exit.
    ///
    /// Ends either when the process exits on its own or when `kill_rx` fires,
    /// in which case the child is killed first and then reaped.
    async fn wait_for_exit(
        mut child: Child,
        program: String,
        kill_rx: oneshot::Receiver<()>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => info!("{} exited with status: {:?}", program, status),
                    Err(e) => error!("Error waiting for {}: {}", program, e),
                }
            }
            _ = kill_rx => {
                debug!("Kill requested for {}", program);
                if let Err(e) = child.kill().await {
                    error!("Failed to kill {}: {}", program, e);
                }
                match child.wait().await {
                    Ok(status) => info!("{} killed, exit status: {:?}", program, status),
                    Err(e) => error!("Error waiting for {} after kill: {}", program, e),
                }
            }
        }

        // Flag before notifying so `has_exited()` is true for woken waiters.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();
    }

    /// Stop the process and wait until it has been reaped.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.has_exited() {
            debug!("{} already exited", self.program);
            return Ok(());
        }

        info!("Stopping {} (PID {:?})", self.program, self.pid);

        // Register for the notification before the final check so an exit that
        // lands in between is not missed.
        let notified = self.exit_notify.notified();
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
        if self.has_exited() {
            return Ok(());
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, notified).await {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::process(format!(
                "timed out waiting for {} to exit",
                self.program
            ))),
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("{} dropped while it may still be running", self.program);
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}

/// Log every line of a child's output stream and return the last few.
///
/// Child output never reaches our own stdout, which carries the headless
/// event stream.
pub(crate) async fn forward_output<R>(stream: R, program: String, is_stderr: bool) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream).lines();
    let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);

    while let Ok(Some(line)) = reader.next_line().await {
        if is_stderr {
            debug!(target: "qdev_daemon::output", "[{} stderr] {}", program, line);
        } else {
            debug!(target: "qdev_daemon::output", "[{}] {}", program, line);
        }
        if tail.len() == OUTPUT_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    trace!("{} output reader finished", program);
    tail.into()
}

pub(crate) fn spawn_error(program: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::tool_not_found(program)
    } else {
        Error::ProcessSpawn {
            reason: format!("{}: {}", program, e),
        }
    }
}
