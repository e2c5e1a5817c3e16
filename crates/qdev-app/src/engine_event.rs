//! Domain events emitted by the session controller for external consumers
//!
//! Events are broadcast as the controller moves through a cycle, via
//! `SessionController::subscribe()`. The binary renders them as terminal
//! notices or as NDJSON in headless mode.

use qdev_core::{Address, HookPhase, SessionPhase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    // ─────────────────────────────────────────────────────────
    // State Machine
    // ─────────────────────────────────────────────────────────
    PhaseChanged {
        old_phase: SessionPhase,
        new_phase: SessionPhase,
    },

    // ─────────────────────────────────────────────────────────
    // Address Negotiation
    // ─────────────────────────────────────────────────────────
    /// The requested port was busy and another one was picked
    PortSubstituted {
        requested: u16,
        resolved: u16,
        message: String,
    },

    /// Negotiation failed; `fatal` means the session is ending
    AddressFailed { message: String, fatal: bool },

    // ─────────────────────────────────────────────────────────
    // Dev Server
    // ─────────────────────────────────────────────────────────
    Listening { address: Address, url: String },

    EndpointStopped { address: Address },

    // ─────────────────────────────────────────────────────────
    // Triggers
    // ─────────────────────────────────────────────────────────
    RebuildStarted,

    AppRegenerated,

    // ─────────────────────────────────────────────────────────
    // Hooks
    // ─────────────────────────────────────────────────────────
    HookPhaseCompleted { phase: HookPhase },

    // ─────────────────────────────────────────────────────────
    // Errors
    // ─────────────────────────────────────────────────────────
    Error { message: String, fatal: bool },
}

impl SessionEvent {
    /// Short machine-readable name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::PhaseChanged { .. } => "phase_changed",
            SessionEvent::PortSubstituted { .. } => "port_substituted",
            SessionEvent::AddressFailed { .. } => "address_failed",
            SessionEvent::Listening { .. } => "listening",
            SessionEvent::EndpointStopped { .. } => "endpoint_stopped",
            SessionEvent::RebuildStarted => "rebuild_started",
            SessionEvent::AppRegenerated => "app_regenerated",
            SessionEvent::HookPhaseCompleted { .. } => "hook_phase_completed",
            SessionEvent::Error { .. } => "error",
        }
    }
}
