//! Test utilities for process plumbing
//!
//! Provides [`RecordingRunner`], a [`ProcessRunner`] that never starts a real
//! process and records every request for later assertions.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::command::ShellCommand;
use crate::runner::{ProcessId, ProcessRunner};
use qdev_core::prelude::*;

/// One request received by a [`RecordingRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCall {
    Run(ShellCommand),
    Spawn(ShellCommand, ProcessId),
    Kill(ProcessId),
}

#[derive(Default)]
struct Inner {
    calls: Vec<RunnerCall>,
    live: HashSet<ProcessId>,
    next_id: u64,
    missing_tools: HashSet<String>,
    failing: Vec<String>,
}

/// Fake runner that records calls instead of executing them.
#[derive(Default)]
pub struct RecordingRunner {
    inner: Mutex<Inner>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `locate(tool)` fail with `ToolNotFound`
    pub fn with_missing_tool(self, tool: &str) -> Self {
        self.lock().missing_tools.insert(tool.to_string());
        self
    }

    /// Make `run`/`spawn` fail for any command whose rendering contains `needle`
    pub fn with_failure(self, needle: &str) -> Self {
        self.lock().failing.push(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.lock().calls.clone()
    }

    /// Rendered command lines of every `run` and `spawn`, in order
    pub fn command_lines(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RunnerCall::Run(cmd) | RunnerCall::Spawn(cmd, _) => Some(cmd.to_string()),
                RunnerCall::Kill(_) => None,
            })
            .collect()
    }

    pub fn live_processes(&self) -> usize {
        self.lock().live.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failure(&self, command: &ShellCommand) -> Result<()> {
        let line = command.to_string();
        if self.lock().failing.iter().any(|needle| line.contains(needle)) {
            return Err(Error::ProcessExit {
                program: line,
                code: Some(1),
                output: Vec::new(),
            });
        }
        Ok(())
    }
}

impl ProcessRunner for RecordingRunner {
    fn locate(&self, program: &str) -> Result<PathBuf> {
        if self.lock().missing_tools.contains(program) {
            Err(Error::tool_not_found(program))
        } else {
            Ok(PathBuf::from("/usr/bin").join(program))
        }
    }

    async fn run(&self, command: &ShellCommand) -> Result<()> {
        self.lock().calls.push(RunnerCall::Run(command.clone()));
        self.check_failure(command)
    }

    async fn spawn(&self, command: &ShellCommand) -> Result<ProcessId> {
        self.check_failure(command)?;
        let mut inner = self.lock();
        let id = ProcessId(inner.next_id);
        inner.next_id += 1;
        inner.live.insert(id);
        inner.calls.push(RunnerCall::Spawn(command.clone(), id));
        Ok(id)
    }

    async fn kill(&self, id: ProcessId) -> Result<()> {
        let mut inner = self.lock();
        inner.live.remove(&id);
        inner.calls.push(RunnerCall::Kill(id));
        Ok(())
    }

    async fn is_running(&self, id: ProcessId) -> bool {
        self.lock().live.contains(&id)
    }
}
