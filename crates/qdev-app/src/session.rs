//! Long-lived orchestration state for one dev invocation
//!
//! Everything the controller carries between cycles lives on [`Session`]:
//! the requested address, the negotiator's sticky host, the live endpoint,
//! the current build config snapshot and the rebuild chain. Nothing here is
//! process-global, so several sessions can coexist (tests do this).

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use qdev_core::prelude::*;
use qdev_core::{Address, DevMode, MobileTarget, SessionPhase};

use crate::collaborators::BuildConfig;
use crate::hooks::ExtensionContext;
use crate::launcher::LaunchContext;
use crate::network::{AddressNegotiator, AddressRequest, AddressState, Resolution};

/// External change notification appended to the rebuild chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Build-dependent output changed: resolve, compile, restart
    BuildChanged,
    /// App sources changed: incremental regeneration only
    AppChanged,
    /// Stop the endpoint and platform process, then end the session
    Shutdown,
}

/// Cloneable handle for feeding triggers into a session's rebuild chain
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: Option<mpsc::UnboundedSender<Trigger>>,
}

impl TriggerSender {
    /// Queue `trigger` behind every cycle already in the chain
    pub fn send(&self, trigger: Trigger) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ChannelClosed)?;
        tx.send(trigger).map_err(|_| Error::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Strictly sequential queue of pending cycles.
///
/// Triggers are only ever consumed by the controller task, one at a time,
/// so a trigger that arrives mid-cycle waits for that cycle to settle.
pub struct RebuildChain {
    tx: Option<mpsc::UnboundedSender<Trigger>>,
    rx: mpsc::UnboundedReceiver<Trigger>,
}

impl RebuildChain {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx: Some(tx), rx }
    }

    pub fn sender(&self) -> TriggerSender {
        TriggerSender {
            tx: self.tx.clone(),
        }
    }

    /// Drop the chain's own sender so the queue closes once every
    /// outstanding [`TriggerSender`] is gone.
    pub fn seal(&mut self) {
        self.tx = None;
    }

    /// Next queued trigger; `None` once sealed and all senders are dropped
    pub async fn next(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }
}

impl Default for RebuildChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Inputs for one session
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub host: Option<String>,
    /// Defaults to the mode's port when absent
    pub port: Option<u16>,
    pub mode: DevMode,
    pub target: Option<MobileTarget>,
    pub devtools: bool,
    /// Unrecognized trailing CLI arguments, forwarded to the platform launcher
    pub extra_args: Vec<String>,
    pub project_root: PathBuf,
}

pub struct Session<E> {
    // ─────────────────────────────────────────────────────────
    // Requested configuration
    // ─────────────────────────────────────────────────────────
    pub host: Option<String>,
    pub port: u16,
    pub mode: DevMode,
    pub target: Option<MobileTarget>,
    pub devtools: bool,
    pub extra_args: Vec<String>,
    pub project_root: PathBuf,

    // ─────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────
    pub phase: SessionPhase,

    /// Sticky host, discovery memo and first-success flag
    pub address: AddressState,

    /// Set once the first cycle reaches `Listening`
    pub has_listened: bool,

    pub before_dev_done: bool,
    pub after_dev_done: bool,

    // ─────────────────────────────────────────────────────────
    // Serving
    // ─────────────────────────────────────────────────────────
    /// The one live endpoint, if any
    pub endpoint: Option<E>,

    /// Address `endpoint` is bound to
    pub bound: Option<Address>,

    /// Build config snapshot of the latest cycle that got past compilation
    pub build_config: Option<BuildConfig>,

    pub chain: RebuildChain,

    // ─────────────────────────────────────────────────────────
    // Timing
    // ─────────────────────────────────────────────────────────
    pub created_at: DateTime<Local>,

    /// Full cycles started this session
    pub rebuild_count: u32,

    pub last_listening_at: Option<DateTime<Local>>,
}

impl<E> Session<E> {
    pub fn new(options: SessionOptions) -> Self {
        let port = options.port.unwrap_or_else(|| options.mode.default_port());
        Self {
            host: options.host,
            port,
            mode: options.mode,
            target: options.target,
            devtools: options.devtools,
            extra_args: options.extra_args,
            project_root: options.project_root,
            phase: SessionPhase::Idle,
            address: AddressState::default(),
            has_listened: false,
            before_dev_done: false,
            after_dev_done: false,
            endpoint: None,
            bound: None,
            build_config: None,
            chain: RebuildChain::new(),
            created_at: Local::now(),
            rebuild_count: 0,
            last_listening_at: None,
        }
    }

    /// Move to `phase`, returning the transition if it changed anything
    pub fn set_phase(&mut self, phase: SessionPhase) -> Option<(SessionPhase, SessionPhase)> {
        if self.phase == phase {
            return None;
        }
        let old = self.phase;
        self.phase = phase;
        debug!("Session phase {} -> {}", old, phase);
        Some((old, phase))
    }

    /// Phase to settle in after a cycle was abandoned
    pub fn resting_phase(&self) -> SessionPhase {
        if self.endpoint.is_some() && self.has_listened {
            SessionPhase::Listening
        } else {
            SessionPhase::Idle
        }
    }

    /// Resolve this cycle's address, threading the session's address state
    pub fn negotiate(&mut self, negotiator: &AddressNegotiator) -> Result<Resolution> {
        let request = AddressRequest {
            host: self.host.as_deref(),
            port: self.port,
            mode: self.mode,
            held: self.bound.as_ref(),
        };
        negotiator.resolve(request, &mut self.address)
    }

    pub fn extension_context(&self) -> ExtensionContext {
        ExtensionContext {
            mode: self.mode,
            target: self.target,
            devtools: self.devtools,
        }
    }

    pub fn launch_context(&self) -> LaunchContext {
        LaunchContext {
            project_root: self.project_root.clone(),
            mode: self.mode,
            target: self.target,
            devtools: self.devtools,
        }
    }
}
