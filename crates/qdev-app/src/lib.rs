//! qdev-app - Session orchestration for qdev
//!
//! This crate implements the session controller state machine and everything
//! it drives: address negotiation, the lifecycle hook pipeline, platform
//! launchers, configuration loading and the command-driven toolchain.

pub mod collaborators;
pub mod config;
pub mod controller;
pub mod engine_event;
pub mod hooks;
pub mod launcher;
pub mod network;
pub mod session;
pub mod toolchain;

// Re-export primary types
pub use collaborators::{
    hook_fn, BuildCompiler, BuildConfig, EndpointFactory, HookFn, LocalBuildCompiler,
    LocalServingEndpoint, ServingEndpoint,
};
pub use controller::SessionController;
pub use engine_event::SessionEvent;
pub use hooks::{Extension, ExtensionApi, ExtensionContext, ExtensionRegistry, HookSource};
pub use launcher::{LaunchContext, PlatformLauncher};
pub use network::{AddressNegotiator, RouteIpResolver, TcpPortProber};
pub use session::{Session, SessionOptions, Trigger, TriggerSender};
