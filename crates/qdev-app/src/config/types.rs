//! Configuration types for qdev
//!
//! Defines:
//! - `Settings` - Project settings from `.qdev/config.toml`
//! - Related sub-sections

use serde::{Deserialize, Serialize};

/// Project settings (.qdev/config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub dev: DevSettings,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub serve: ServeSettings,

    #[serde(default)]
    pub hooks: HookSettings,

    #[serde(default)]
    pub cordova: CordovaSettings,

    #[serde(default)]
    pub capacitor: CapacitorSettings,

    #[serde(default)]
    pub electron: ElectronSettings,
}

/// Dev server address and session defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevSettings {
    /// Host to bind; absent means all interfaces
    #[serde(default)]
    pub host: Option<String>,

    /// Port to bind; absent means the mode's default port
    #[serde(default)]
    pub port: Option<u16>,

    /// Highest port tried when the requested one is taken
    #[serde(default = "default_port_search_limit")]
    pub port_search_limit: u16,

    /// Open devtools in the platform shell
    #[serde(default)]
    pub devtools: bool,
}

impl Default for DevSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            port_search_limit: default_port_search_limit(),
            devtools: false,
        }
    }
}

fn default_port_search_limit() -> u16 {
    u16::MAX
}

/// Commands that produce the build output the dev server serves
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BuildSettings {
    /// Run once at session start (dependency checks, codegen)
    #[serde(default)]
    pub prepare: Option<String>,

    /// Full rebuild, run on every "build changed" cycle
    #[serde(default)]
    pub compile: Option<String>,

    /// Incremental regeneration, run on "app changed"; falls back to `compile`
    #[serde(default)]
    pub regenerate: Option<String>,
}

/// The dev-server command
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServeSettings {
    /// Command line started with `HOST` and `PORT` in its environment
    #[serde(default)]
    pub command: Option<String>,

    /// How long to wait for the port to accept connections
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            command: None,
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

fn default_startup_timeout_ms() -> u64 {
    30_000
}

/// User lifecycle hooks (shell commands)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HookSettings {
    #[serde(default)]
    pub before_dev: Option<String>,

    #[serde(default)]
    pub after_dev: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CordovaSettings {
    /// Cordova project directory, relative to the project root
    #[serde(default = "default_cordova_dir")]
    pub dir: String,

    #[serde(default = "default_cordova_bin")]
    pub bin: String,
}

impl Default for CordovaSettings {
    fn default() -> Self {
        Self {
            dir: default_cordova_dir(),
            bin: default_cordova_bin(),
        }
    }
}

fn default_cordova_dir() -> String {
    "src-cordova".to_string()
}

fn default_cordova_bin() -> String {
    "cordova".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapacitorSettings {
    /// Capacitor project directory, relative to the project root
    #[serde(default = "default_capacitor_dir")]
    pub dir: String,

    /// Program used to invoke the capacitor CLI (`<bin> cap ...`)
    #[serde(default = "default_capacitor_bin")]
    pub bin: String,
}

impl Default for CapacitorSettings {
    fn default() -> Self {
        Self {
            dir: default_capacitor_dir(),
            bin: default_capacitor_bin(),
        }
    }
}

fn default_capacitor_dir() -> String {
    "src-capacitor".to_string()
}

fn default_capacitor_bin() -> String {
    "npx".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElectronSettings {
    /// Main process entry, relative to the project root
    #[serde(default = "default_electron_main")]
    pub main: String,

    #[serde(default = "default_electron_bin")]
    pub bin: String,
}

impl Default for ElectronSettings {
    fn default() -> Self {
        Self {
            main: default_electron_main(),
            bin: default_electron_bin(),
        }
    }
}

fn default_electron_main() -> String {
    ".qdev/electron/electron-main.js".to_string()
}

fn default_electron_bin() -> String {
    "electron".to_string()
}
