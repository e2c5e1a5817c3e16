//! [`ServingEndpoint`] that runs the `[serve]` command as a child process
//!
//! The command gets `HOST` and `PORT` in its environment. `listen` returns
//! once the port accepts TCP connections; `stop` returns once the process is
//! gone, which releases the port.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use qdev_core::prelude::*;
use qdev_core::Address;
use qdev_daemon::{ProcessId, ProcessRunner, ShellCommand};

use crate::collaborators::{BuildConfig, EndpointFactory, ServingEndpoint};
use crate::config::ServeSettings;
use crate::launcher::{DEVTOOLS_ENV, DEV_URL_ENV};

/// Delay between readiness probes
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct CommandEndpointFactory<R> {
    runner: Arc<R>,
    project_root: PathBuf,
    serve: ServeSettings,
}

impl<R> CommandEndpointFactory<R> {
    pub fn new(runner: Arc<R>, project_root: PathBuf, serve: ServeSettings) -> Self {
        Self {
            runner,
            project_root,
            serve,
        }
    }
}

impl<R> EndpointFactory for CommandEndpointFactory<R>
where
    R: ProcessRunner + Send + Sync + 'static,
{
    type Endpoint = CommandEndpoint<R>;

    fn create(&self, config: &BuildConfig, address: &Address) -> Result<CommandEndpoint<R>> {
        let line = self.serve.command.as_deref().ok_or_else(|| {
            Error::config("no dev server command configured (set [serve] command)")
        })?;

        let mut command = ShellCommand::shell(line)
            .current_dir(&self.project_root)
            .env("HOST", &address.host)
            .env("PORT", address.port.to_string())
            .env(DEV_URL_ENV, address.http_url());
        if config.devtools {
            command = command.env(DEVTOOLS_ENV, "1");
        }

        Ok(CommandEndpoint {
            runner: self.runner.clone(),
            command,
            address: address.clone(),
            startup_timeout: Duration::from_millis(self.serve.startup_timeout_ms),
            process: None,
        })
    }
}

pub struct CommandEndpoint<R> {
    runner: Arc<R>,
    command: ShellCommand,
    address: Address,
    startup_timeout: Duration,
    process: Option<ProcessId>,
}

impl<R> CommandEndpoint<R>
where
    R: ProcessRunner + Send + Sync + 'static,
{
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Poll until the port accepts connections or the process dies
    async fn wait_until_ready(&self, id: ProcessId) -> Result<()> {
        let target = (self.address.connect_host().to_string(), self.address.port);
        loop {
            if !self.runner.is_running(id).await {
                return Err(Error::endpoint(format!(
                    "dev server exited before listening on {}",
                    self.address
                )));
            }
            if TcpStream::connect((target.0.as_str(), target.1)).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

impl<R> ServingEndpoint for CommandEndpoint<R>
where
    R: ProcessRunner + Send + Sync + 'static,
{
    async fn listen(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }

        let id = self
            .runner
            .spawn(&self.command)
            .await
            .map_err(|e| Error::endpoint(format!("failed to start dev server: {}", e)))?;
        self.process = Some(id);
        debug!("Dev server {} started, waiting for {}", id, self.address);

        let ready = tokio::time::timeout(self.startup_timeout, self.wait_until_ready(id)).await;
        let outcome = match ready {
            Ok(result) => result,
            Err(_) => Err(Error::endpoint(format!(
                "dev server did not accept connections on {} within {}ms",
                self.address,
                self.startup_timeout.as_millis()
            ))),
        };

        if outcome.is_err() {
            self.process = None;
            if let Err(e) = self.runner.kill(id).await {
                warn!("Failed to stop dev server {}: {}", id, e);
            }
        }
        outcome
    }

    async fn stop(&mut self) -> Result<()> {
        match self.process.take() {
            Some(id) => {
                debug!("Stopping dev server {} on {}", id, self.address);
                self.runner.kill(id).await
            }
            None => Ok(()),
        }
    }
}
