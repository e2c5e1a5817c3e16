//! Session controller: the top-level state machine
//!
//! ```text
//! Idle ─▶ Resolving ─▶ Building ─▶ (Stopping) ─▶ Starting ─▶ Listening
//!            │                                                  │
//!            └──▶ Failed (first resolution only)   "build changed" ◀┘
//! ```
//!
//! The controller owns the [`Session`] and drains its rebuild chain on a
//! single task, so cycles never overlap. "App changed" bypasses the state
//! machine and only asks the compiler for an incremental regeneration.
//!
//! Errors are fatal (returned from [`SessionController::run`]) while the
//! session has never reached `Listening`. After that only compiler errors
//! end the session; everything else is logged, broadcast as a
//! [`SessionEvent::Error`], and the previous endpoint keeps serving where
//! one is alive.

#[cfg(test)]
mod tests;

use tokio::sync::broadcast;

use qdev_core::prelude::*;
use qdev_core::{HookPhase, SessionPhase};
use qdev_daemon::ProcessRunner;

use crate::collaborators::{BuildCompiler, EndpointFactory, ServingEndpoint};
use crate::engine_event::SessionEvent;
use crate::hooks::{self, Extension, ExtensionRegistry};
use crate::launcher::PlatformLauncher;
use crate::network::{failure_policy, AddressNegotiator, FailurePolicy};
use crate::session::{Session, SessionOptions, Trigger, TriggerSender};

/// Capacity of the session event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct SessionController<C, F, R>
where
    F: EndpointFactory,
{
    session: Session<F::Endpoint>,
    compiler: C,
    factory: F,
    negotiator: AddressNegotiator,
    launcher: PlatformLauncher<R>,
    extensions: ExtensionRegistry,
    events: broadcast::Sender<SessionEvent>,
    /// A fatal error already went out as its own event
    failure_reported: bool,
}

impl<C, F, R> SessionController<C, F, R>
where
    C: BuildCompiler,
    F: EndpointFactory,
    R: ProcessRunner,
{
    pub fn new(
        options: SessionOptions,
        compiler: C,
        factory: F,
        negotiator: AddressNegotiator,
        launcher: PlatformLauncher<R>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session: Session::new(options),
            compiler,
            factory,
            negotiator,
            launcher,
            extensions: ExtensionRegistry::new(),
            events,
            failure_reported: false,
        }
    }

    /// Install an extension; its hooks are registered when the session starts
    pub fn add_extension(&mut self, extension: std::sync::Arc<dyn Extension>) {
        self.extensions.add(extension);
    }

    /// Handle for appending triggers to the rebuild chain.
    ///
    /// Take every sender you need before calling [`run`](Self::run); the
    /// session ends when all of them are dropped.
    pub fn trigger_sender(&self) -> TriggerSender {
        self.session.chain.sender()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &Session<F::Endpoint> {
        &self.session
    }

    /// Run the session until a `Shutdown` trigger, the trigger channel
    /// closing, or a fatal error.
    ///
    /// The endpoint and platform process are stopped on every exit path.
    pub async fn run(mut self) -> Result<()> {
        self.session.chain.seal();

        let result = self.drive().await;
        if let Err(e) = &result {
            error!("Session failed: {}", e);
            if !self.failure_reported {
                self.emit(SessionEvent::Error {
                    message: e.to_string(),
                    fatal: true,
                });
            }
            self.set_phase(SessionPhase::Failed);
        }

        self.shutdown().await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        self.start().await?;

        while let Some(trigger) = self.session.chain.next().await {
            match trigger {
                Trigger::BuildChanged => {
                    info!("Build changed, restarting dev server");
                    self.rebuild().await?;
                }
                Trigger::AppChanged => {
                    info!("App changed, regenerating");
                    self.regenerate_app().await?;
                }
                Trigger::Shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Session start: prepare, register extensions, init the launcher, then
    /// run the first cycle.
    async fn start(&mut self) -> Result<()> {
        info!(
            "Starting {} session (port {})",
            self.session.mode, self.session.port
        );

        if let Err(e) = self.compiler.prepare().await {
            return self.escalate(compiler_failure(e));
        }

        let ctx = self.session.extension_context();
        self.extensions.register_extensions(&ctx);

        let launch_ctx = self.session.launch_context();
        if let Err(e) = self.launcher.init(&launch_ctx).await {
            return self.escalate(e);
        }

        self.rebuild().await
    }

    /// One full cycle: resolve, compile, (stop), start, launch.
    async fn rebuild(&mut self) -> Result<()> {
        self.session.rebuild_count += 1;
        self.emit(SessionEvent::RebuildStarted);

        // Resolve before touching the live endpoint so a failure leaves it up.
        self.set_phase(SessionPhase::Resolving);
        let resolution = match self.session.negotiate(&self.negotiator) {
            Ok(resolution) => resolution,
            Err(e) => return self.address_failure(e),
        };
        if let Some(message) = resolution.warning {
            self.emit(SessionEvent::PortSubstituted {
                requested: self.session.port,
                resolved: resolution.address.port,
                message,
            });
        }
        let address = resolution.address;

        self.set_phase(SessionPhase::Building);
        if let Err(e) = self.compiler.compile().await {
            return self.escalate(compiler_failure(e));
        }
        let mut config = self.compiler.build_config();
        config.devtools |= self.session.devtools;
        config.dev_server = Some(address.clone());
        self.session.build_config = Some(config.clone());

        if !self.session.before_dev_done {
            self.session.before_dev_done = true;
            if let Err(e) = self.run_hooks(HookPhase::BeforeDev).await {
                return self.escalate(e);
            }
        }

        if let Some(mut previous) = self.session.endpoint.take() {
            self.set_phase(SessionPhase::Stopping);
            let released = self.session.bound.take();
            if let Err(e) = previous.stop().await {
                return self.escalate(e);
            }
            if let Some(released) = released {
                debug!("Stopped dev server on {}", released);
                self.emit(SessionEvent::EndpointStopped { address: released });
            }
        }

        self.set_phase(SessionPhase::Starting);
        let mut endpoint = match self.factory.create(&config, &address) {
            Ok(endpoint) => endpoint,
            Err(e) => return self.escalate(e),
        };
        if let Err(e) = endpoint.listen().await {
            return self.escalate(e);
        }
        self.session.endpoint = Some(endpoint);
        self.session.bound = Some(address.clone());

        if let Err(e) = self.launcher.run(&config, &self.session.extra_args).await {
            return self.escalate(e);
        }

        self.set_phase(SessionPhase::Listening);
        self.session.has_listened = true;
        self.session.last_listening_at = Some(chrono::Local::now());
        let url = address.http_url();
        info!("Dev server listening at {}", url);
        self.emit(SessionEvent::Listening { address, url });

        if !self.session.after_dev_done {
            self.session.after_dev_done = true;
            if let Err(e) = self.run_hooks(HookPhase::AfterDev).await {
                return self.escalate(e);
            }
        }

        Ok(())
    }

    async fn regenerate_app(&mut self) -> Result<()> {
        match self.compiler.regenerate_app().await {
            Ok(()) => {
                self.emit(SessionEvent::AppRegenerated);
                Ok(())
            }
            Err(e) => self.escalate(compiler_failure(e)),
        }
    }

    async fn run_hooks(&mut self, phase: HookPhase) -> Result<()> {
        let config = self.session.build_config.clone().unwrap_or_default();
        hooks::run_phase(phase, &config, &self.extensions).await?;
        self.emit(SessionEvent::HookPhaseCompleted { phase });
        Ok(())
    }

    fn address_failure(&mut self, err: Error) -> Result<()> {
        match failure_policy(&self.session.address) {
            FailurePolicy::Fatal => {
                warn!("Could not resolve a dev server address: {}", err);
                self.emit(SessionEvent::AddressFailed {
                    message: err.to_string(),
                    fatal: true,
                });
                self.failure_reported = true;
                self.set_phase(SessionPhase::Failed);
                Err(err)
            }
            FailurePolicy::AbandonCycle => {
                warn!(
                    "Could not resolve a dev server address, keeping the current one: {}",
                    err
                );
                self.emit(SessionEvent::AddressFailed {
                    message: err.to_string(),
                    fatal: false,
                });
                let resting = self.session.resting_phase();
                self.set_phase(resting);
                Ok(())
            }
        }
    }

    /// Return `err` if it must end the session, otherwise log it and abandon
    /// the current cycle.
    fn escalate(&mut self, err: Error) -> Result<()> {
        if err.is_fatal() || !self.session.has_listened {
            self.set_phase(SessionPhase::Failed);
            return Err(err);
        }

        error!("{}", err);
        self.emit(SessionEvent::Error {
            message: err.to_string(),
            fatal: false,
        });
        let resting = self.session.resting_phase();
        self.set_phase(resting);
        Ok(())
    }

    async fn shutdown(&mut self) {
        let failed = self.session.phase == SessionPhase::Failed;

        if let Some(mut endpoint) = self.session.endpoint.take() {
            if !failed {
                self.set_phase(SessionPhase::Stopping);
            }
            if let Err(e) = endpoint.stop().await {
                warn!("Failed to stop dev server: {}", e);
            }
            if let Some(address) = self.session.bound.take() {
                self.emit(SessionEvent::EndpointStopped { address });
            }
        }

        if let Err(e) = self.launcher.stop().await {
            warn!("Failed to stop {} launcher: {}", self.launcher.name(), e);
        }

        if !failed {
            self.set_phase(SessionPhase::Idle);
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if let Some((old_phase, new_phase)) = self.session.set_phase(phase) {
            self.emit(SessionEvent::PhaseChanged {
                old_phase,
                new_phase,
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Anything the compiler reports is a compiler error, whatever its cause
fn compiler_failure(err: Error) -> Error {
    match err {
        Error::Compiler { .. } => err,
        other => Error::compiler(other.to_string()),
    }
}
