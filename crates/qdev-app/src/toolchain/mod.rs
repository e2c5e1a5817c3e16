//! Command-driven collaborators used by the `qdev` binary
//!
//! The orchestrator only knows the [`BuildCompiler`] and [`EndpointFactory`]
//! contracts. These implementations fill them with shell commands from the
//! `[build]`, `[serve]` and `[hooks]` config sections, run through a
//! [`ProcessRunner`](qdev_daemon::ProcessRunner).
//!
//! [`BuildCompiler`]: crate::collaborators::BuildCompiler
//! [`EndpointFactory`]: crate::collaborators::EndpointFactory

pub mod compiler;
pub mod endpoint;

pub use compiler::CommandCompiler;
pub use endpoint::{CommandEndpoint, CommandEndpointFactory};
