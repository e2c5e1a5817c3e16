//! Electron: restart the desktop shell pointed at the dev server

use std::path::PathBuf;
use std::sync::Arc;

use qdev_core::prelude::*;
use qdev_daemon::{ProcessId, ProcessRunner, ShellCommand};

use super::{LaunchContext, DEVTOOLS_ENV, DEV_URL_ENV};
use crate::collaborators::BuildConfig;
use crate::config::ElectronSettings;

pub struct ElectronLauncher<R> {
    runner: Arc<R>,
    settings: ElectronSettings,
    project_root: Option<PathBuf>,
    current: Option<ProcessId>,
}

impl<R: ProcessRunner> ElectronLauncher<R> {
    pub fn new(runner: Arc<R>, settings: ElectronSettings) -> Self {
        Self {
            runner,
            settings,
            project_root: None,
            current: None,
        }
    }

    pub async fn init(&mut self, ctx: &LaunchContext) -> Result<()> {
        self.runner.locate(&self.settings.bin)?;
        self.project_root = Some(ctx.project_root.clone());
        Ok(())
    }

    /// Stop the previous shell (if any) and start a new one
    pub async fn run(&mut self, config: &BuildConfig, extra_args: &[String]) -> Result<()> {
        let root = self
            .project_root
            .clone()
            .ok_or_else(|| Error::launcher("electron launcher used before init"))?;
        let url = config
            .app_url()
            .ok_or_else(|| Error::launcher("dev server address missing from build config"))?;

        self.stop().await?;

        let mut command = ShellCommand::new(&self.settings.bin)
            .arg(&self.settings.main)
            .args(extra_args.iter().cloned())
            .current_dir(root)
            .env(DEV_URL_ENV, url);
        if config.devtools {
            command = command.env(DEVTOOLS_ENV, "1");
        }

        self.current = Some(self.runner.spawn(&command).await?);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(id) = self.current.take() {
            debug!("Stopping electron shell {}", id);
            self.runner.kill(id).await?;
        }
        Ok(())
    }
}
