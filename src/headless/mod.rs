//! Headless mode - JSON event output for scripting and CI
//!
//! With `--headless`, session events are written to stdout as NDJSON
//! (newline-delimited JSON), one event per line, instead of the human-readable
//! notices printed to stderr. Each event has an "event" field indicating its
//! type, along with event-specific data.
//!
//! # Example Output
//!
//! ```json
//! {"event":"session_phase","phase":"resolving","timestamp":1704700001000}
//! {"event":"port_substituted","requested":8080,"resolved":8081,"message":"Port 8080 is already in use, using port 8081 instead","timestamp":1704700001010}
//! {"event":"listening","host":"0.0.0.0","port":8081,"url":"http://127.0.0.1:8081/","timestamp":1704700002000}
//! ```

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use qdev_app::SessionEvent;
use qdev_core::{HookPhase, SessionPhase};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Session controller changed state
    SessionPhase { phase: SessionPhase, timestamp: i64 },

    /// Requested port was busy, another one was picked
    PortSubstituted {
        requested: u16,
        resolved: u16,
        message: String,
        timestamp: i64,
    },

    /// Address negotiation failed
    AddressFailed {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    /// Dev server accepted connections
    Listening {
        host: String,
        port: u16,
        url: String,
        timestamp: i64,
    },

    /// Dev server stopped and released its address
    EndpointStopped {
        host: String,
        port: u16,
        timestamp: i64,
    },

    /// A full rebuild cycle began
    RebuildStarted { timestamp: i64 },

    /// Incremental app regeneration finished
    AppRegenerated { timestamp: i64 },

    /// Every hook of a lifecycle phase completed
    Hook { phase: HookPhase, timestamp: i64 },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        // Write to stdout with newline (NDJSON format)
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        // Flush to ensure immediate output
        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }
}

impl From<&SessionEvent> for HeadlessEvent {
    fn from(event: &SessionEvent) -> Self {
        let timestamp = Self::now();
        match event.clone() {
            SessionEvent::PhaseChanged { new_phase, .. } => Self::SessionPhase {
                phase: new_phase,
                timestamp,
            },
            SessionEvent::PortSubstituted {
                requested,
                resolved,
                message,
            } => Self::PortSubstituted {
                requested,
                resolved,
                message,
                timestamp,
            },
            SessionEvent::AddressFailed { message, fatal } => Self::AddressFailed {
                message,
                fatal,
                timestamp,
            },
            SessionEvent::Listening { address, url } => Self::Listening {
                host: address.host,
                port: address.port,
                url,
                timestamp,
            },
            SessionEvent::EndpointStopped { address } => Self::EndpointStopped {
                host: address.host,
                port: address.port,
                timestamp,
            },
            SessionEvent::RebuildStarted => Self::RebuildStarted { timestamp },
            SessionEvent::AppRegenerated => Self::AppRegenerated { timestamp },
            SessionEvent::HookPhaseCompleted { phase } => Self::Hook { phase, timestamp },
            SessionEvent::Error { message, fatal } => Self::Error {
                message,
                fatal,
                timestamp,
            },
        }
    }
}
