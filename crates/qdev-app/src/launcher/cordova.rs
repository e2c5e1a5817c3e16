//! Cordova: rerun `cordova run <target>` against the dev server

use std::path::PathBuf;
use std::sync::Arc;

use qdev_core::prelude::*;
use qdev_core::MobileTarget;
use qdev_daemon::{ProcessId, ProcessRunner, ShellCommand};

use super::{LaunchContext, DEV_URL_ENV};
use crate::collaborators::BuildConfig;
use crate::config::CordovaSettings;

pub struct CordovaLauncher<R> {
    runner: Arc<R>,
    target: MobileTarget,
    settings: CordovaSettings,
    project_dir: Option<PathBuf>,
    current: Option<ProcessId>,
}

impl<R: ProcessRunner> CordovaLauncher<R> {
    pub fn new(runner: Arc<R>, target: MobileTarget, settings: CordovaSettings) -> Self {
        Self {
            runner,
            target,
            settings,
            project_dir: None,
            current: None,
        }
    }

    pub async fn init(&mut self, ctx: &LaunchContext) -> Result<()> {
        self.runner.locate(&self.settings.bin)?;

        let dir = ctx.project_root.join(&self.settings.dir);
        if !dir.is_dir() {
            return Err(Error::launcher(format!(
                "Cordova project not found at {}",
                dir.display()
            )));
        }
        self.project_dir = Some(dir);
        Ok(())
    }

    /// Replace any running `cordova run` with a fresh one
    pub async fn run(&mut self, config: &BuildConfig, extra_args: &[String]) -> Result<()> {
        let dir = self
            .project_dir
            .clone()
            .ok_or_else(|| Error::launcher("cordova launcher used before init"))?;
        let url = config
            .app_url()
            .ok_or_else(|| Error::launcher("dev server address missing from build config"))?;

        self.stop().await?;

        let command = ShellCommand::new(&self.settings.bin)
            .args(["run", self.target.as_str()])
            .args(extra_args.iter().cloned())
            .current_dir(dir)
            .env(DEV_URL_ENV, url);
        self.current = Some(self.runner.spawn(&command).await?);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(id) = self.current.take() {
            self.runner.kill(id).await?;
        }
        Ok(())
    }
}
