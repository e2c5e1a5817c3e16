//! Application error types with rich context

use thiserror::Error;

use crate::types::HookPhase;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Network Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No free port found on {host} starting at {port}")]
    NetworkPortUnavailable { host: String, port: u16 },

    #[error("Address {host} is not available on this machine: {reason}")]
    NetworkAddressUnavailable { host: String, reason: String },

    #[error("Network error while probing {host}:{port}: {reason}")]
    UnknownNetwork {
        host: String,
        port: u16,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Build / Serve Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Compiler error: {message}")]
    Compiler { message: String },

    #[error("Dev server error: {message}")]
    Endpoint { message: String },

    // ─────────────────────────────────────────────────────────────
    // Lifecycle Errors
    // ─────────────────────────────────────────────────────────────
    #[error("{phase} hook from {origin} failed: {message}")]
    Hook {
        phase: HookPhase,
        origin: String,
        message: String,
    },

    #[error("Platform launcher error: {message}")]
    Launcher { message: String },

    // ─────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("'{tool}' not found. Ensure it is installed and in your PATH.")]
    ToolNotFound { tool: String },

    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("'{program}' exited with code: {code:?}{}", output_tail(.output))]
    ProcessExit {
        program: String,
        code: Option<i32>,
        /// Last lines the process printed
        output: Vec<String>,
    },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn port_unavailable(host: impl Into<String>, port: u16) -> Self {
        Self::NetworkPortUnavailable {
            host: host.into(),
            port,
        }
    }

    pub fn address_unavailable(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkAddressUnavailable {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_network(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::UnknownNetwork {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    pub fn compiler(message: impl Into<String>) -> Self {
        Self::Compiler {
            message: message.into(),
        }
    }

    pub fn endpoint(message: impl Into<String>) -> Self {
        Self::Endpoint {
            message: message.into(),
        }
    }

    pub fn hook(phase: HookPhase, origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            phase,
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn launcher(message: impl Into<String>) -> Self {
        Self::Launcher {
            message: message.into(),
        }
    }

    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Address-layer failures whose severity depends on session history
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::NetworkPortUnavailable { .. }
                | Error::NetworkAddressUnavailable { .. }
                | Error::UnknownNetwork { .. }
        )
    }

    /// Check if this error must terminate the session regardless of history
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Compiler { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

fn output_tail(output: &[String]) -> String {
    output.iter().map(|line| format!("\n  {}", line)).collect()
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
