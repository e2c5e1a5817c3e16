//! Capacitor: sync web assets into the native project, open the IDE once

use std::path::{Path, PathBuf};
use std::sync::Arc;

use qdev_core::prelude::*;
use qdev_core::MobileTarget;
use qdev_daemon::{ProcessRunner, ShellCommand};

use super::{LaunchContext, DEV_URL_ENV};
use crate::collaborators::BuildConfig;
use crate::config::CapacitorSettings;

pub struct CapacitorLauncher<R> {
    runner: Arc<R>,
    target: MobileTarget,
    settings: CapacitorSettings,
    project_dir: Option<PathBuf>,
    ide_opened: bool,
}

impl<R: ProcessRunner> CapacitorLauncher<R> {
    pub fn new(runner: Arc<R>, target: MobileTarget, settings: CapacitorSettings) -> Self {
        Self {
            runner,
            target,
            settings,
            project_dir: None,
            ide_opened: false,
        }
    }

    pub async fn init(&mut self, ctx: &LaunchContext) -> Result<()> {
        self.runner.locate(&self.settings.bin)?;

        let dir = ctx.project_root.join(&self.settings.dir);
        if !dir.is_dir() {
            return Err(Error::launcher(format!(
                "Capacitor project not found at {}",
                dir.display()
            )));
        }
        self.project_dir = Some(dir);
        Ok(())
    }

    fn cap(&self, dir: &Path, subcommand: &str) -> ShellCommand {
        ShellCommand::new(&self.settings.bin)
            .args(["cap", subcommand, self.target.as_str()])
            .current_dir(dir)
    }

    /// `cap sync` on every start; `cap open` only the first time
    pub async fn run(&mut self, config: &BuildConfig, extra_args: &[String]) -> Result<()> {
        let dir = self
            .project_dir
            .clone()
            .ok_or_else(|| Error::launcher("capacitor launcher used before init"))?;
        let url = config
            .app_url()
            .ok_or_else(|| Error::launcher("dev server address missing from build config"))?;

        let sync = self
            .cap(&dir, "sync")
            .args(extra_args.iter().cloned())
            .env(DEV_URL_ENV, url);
        self.runner.run(&sync).await?;

        if !self.ide_opened {
            info!("Opening {} IDE", self.target);
            self.runner.run(&self.cap(&dir, "open")).await?;
            self.ide_opened = true;
        }
        Ok(())
    }
}
