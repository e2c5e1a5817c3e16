//! # qdev-daemon - External Process Management
//!
//! Spawns and supervises the external programs a dev session depends on:
//! dev-server commands, build commands, emulator runners and desktop shells.
//!
//! Depends on [`qdev_core`] for error handling.
//!
//! ## Public API
//!
//! - [`ShellCommand`] - Program, arguments, working directory and environment
//! - [`ShellProcess`] - A managed child process with output forwarding and shutdown
//! - [`ProcessRunner`] - Collaborator trait used by launchers and the toolchain
//! - [`SystemRunner`] - [`ProcessRunner`] backed by real OS processes

pub mod command;
pub mod process;
pub mod runner;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use command::ShellCommand;
pub use process::ShellProcess;
pub use runner::{LocalProcessRunner, ProcessId, ProcessRunner, SystemRunner};
