//! [`BuildCompiler`] backed by the `[build]` and `[hooks]` shell commands

use std::path::PathBuf;
use std::sync::Arc;

use qdev_core::prelude::*;
use qdev_daemon::{ProcessRunner, ShellCommand};

use crate::collaborators::{hook_fn, BuildCompiler, BuildConfig, HookFn};
use crate::config::{BuildSettings, HookSettings};
use crate::launcher::DEV_URL_ENV;

pub struct CommandCompiler<R> {
    runner: Arc<R>,
    project_root: PathBuf,
    build: BuildSettings,
    hooks: HookSettings,
    devtools: bool,
}

impl<R> CommandCompiler<R>
where
    R: ProcessRunner + Send + Sync + 'static,
{
    pub fn new(
        runner: Arc<R>,
        project_root: PathBuf,
        build: BuildSettings,
        hooks: HookSettings,
        devtools: bool,
    ) -> Self {
        Self {
            runner,
            project_root,
            build,
            hooks,
            devtools,
        }
    }

    /// Run one configured step; an unset step is a no-op
    async fn run_step(&self, step: &str, line: Option<&str>) -> Result<()> {
        let Some(line) = line else {
            trace!("No {} command configured", step);
            return Ok(());
        };

        info!("Running {} command: {}", step, line);
        let command = ShellCommand::shell(line).current_dir(&self.project_root);
        self.runner
            .run(&command)
            .await
            .map_err(|e| Error::compiler(format!("{} failed: {}", step, e)))
    }

    fn shell_hook(&self, line: &str) -> HookFn {
        let runner = self.runner.clone();
        let command = ShellCommand::shell(line).current_dir(&self.project_root);
        hook_fn(move |config: BuildConfig| {
            let runner = runner.clone();
            let mut command = command.clone();
            if let Some(url) = config.app_url() {
                command = command.env(DEV_URL_ENV, url);
            }
            async move { runner.run(&command).await }
        })
    }
}

impl<R> BuildCompiler for CommandCompiler<R>
where
    R: ProcessRunner + Send + Sync + 'static,
{
    async fn prepare(&mut self) -> Result<()> {
        self.run_step("prepare", self.build.prepare.as_deref()).await
    }

    async fn compile(&mut self) -> Result<()> {
        self.run_step("compile", self.build.compile.as_deref()).await
    }

    async fn regenerate_app(&mut self) -> Result<()> {
        let line = self
            .build
            .regenerate
            .as_deref()
            .or(self.build.compile.as_deref());
        self.run_step("regenerate", line).await
    }

    fn build_config(&self) -> BuildConfig {
        BuildConfig {
            before_dev: self.hooks.before_dev.as_deref().map(|l| self.shell_hook(l)),
            after_dev: self.hooks.after_dev.as_deref().map(|l| self.shell_hook(l)),
            devtools: self.devtools,
            dev_server: None,
        }
    }
}
