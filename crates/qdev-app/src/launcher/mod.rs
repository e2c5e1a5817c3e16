//! Platform launchers
//!
//! Non-web modes need a second process next to the dev server: a device
//! runner (Cordova), a native IDE (Capacitor) or a desktop shell (Electron).
//! [`PlatformLauncher`] is the closed set of those, selected by [`DevMode`].
//!
//! `init` runs once per session before the first dev server start; `run`
//! runs after every successful start to launch or refresh the platform side.

pub mod capacitor;
pub mod cordova;
pub mod electron;

use std::path::PathBuf;
use std::sync::Arc;

use qdev_core::prelude::*;
use qdev_core::{DevMode, MobileTarget};
use qdev_daemon::ProcessRunner;

use crate::collaborators::BuildConfig;
use crate::config::Settings;

pub use capacitor::CapacitorLauncher;
pub use cordova::CordovaLauncher;
pub use electron::ElectronLauncher;

/// Environment variable carrying the dev server URL to platform processes
pub const DEV_URL_ENV: &str = "QDEV_DEV_URL";

/// Set to `1` when devtools should open in the platform shell
pub const DEVTOOLS_ENV: &str = "QDEV_DEVTOOLS";

/// Session facts a launcher needs at init time
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub project_root: PathBuf,
    pub mode: DevMode,
    pub target: Option<MobileTarget>,
    pub devtools: bool,
}

pub enum PlatformLauncher<R> {
    /// spa, ssr, pwa: nothing to launch
    Web,
    Cordova(CordovaLauncher<R>),
    Capacitor(CapacitorLauncher<R>),
    Electron(ElectronLauncher<R>),
}

impl<R: ProcessRunner> PlatformLauncher<R> {
    /// Pick the launcher for `mode`; mobile modes require a target
    pub fn for_mode(
        mode: DevMode,
        target: Option<MobileTarget>,
        settings: &Settings,
        runner: Arc<R>,
    ) -> Result<Self> {
        let require_target = || {
            target.ok_or_else(|| {
                Error::config(format!(
                    "mode '{}' requires a target platform (android or ios)",
                    mode
                ))
            })
        };

        Ok(match mode {
            DevMode::Spa | DevMode::Ssr | DevMode::Pwa => PlatformLauncher::Web,
            DevMode::Cordova => PlatformLauncher::Cordova(CordovaLauncher::new(
                runner,
                require_target()?,
                settings.cordova.clone(),
            )),
            DevMode::Capacitor => PlatformLauncher::Capacitor(CapacitorLauncher::new(
                runner,
                require_target()?,
                settings.capacitor.clone(),
            )),
            DevMode::Electron => {
                PlatformLauncher::Electron(ElectronLauncher::new(runner, settings.electron.clone()))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlatformLauncher::Web => "web",
            PlatformLauncher::Cordova(_) => "cordova",
            PlatformLauncher::Capacitor(_) => "capacitor",
            PlatformLauncher::Electron(_) => "electron",
        }
    }

    pub async fn init(&mut self, ctx: &LaunchContext) -> Result<()> {
        debug!("Initializing {} launcher", self.name());
        match self {
            PlatformLauncher::Web => Ok(()),
            PlatformLauncher::Cordova(l) => l.init(ctx).await,
            PlatformLauncher::Capacitor(l) => l.init(ctx).await,
            PlatformLauncher::Electron(l) => l.init(ctx).await,
        }
    }

    /// Launch or refresh the platform side against the current dev server.
    ///
    /// `extra_args` are the unrecognized trailing CLI arguments.
    pub async fn run(&mut self, config: &BuildConfig, extra_args: &[String]) -> Result<()> {
        match self {
            PlatformLauncher::Web => Ok(()),
            PlatformLauncher::Cordova(l) => l.run(config, extra_args).await,
            PlatformLauncher::Capacitor(l) => l.run(config, extra_args).await,
            PlatformLauncher::Electron(l) => l.run(config, extra_args).await,
        }
    }

    /// Stop any process this launcher keeps alive
    pub async fn stop(&mut self) -> Result<()> {
        match self {
            PlatformLauncher::Web | PlatformLauncher::Capacitor(_) => Ok(()),
            PlatformLauncher::Cordova(l) => l.stop().await,
            PlatformLauncher::Electron(l) => l.stop().await,
        }
    }
}
