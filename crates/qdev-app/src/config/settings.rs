//! Settings parser for .qdev/config.toml

use super::types::Settings;
use qdev_core::prelude::*;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "config.toml";
pub const QDEV_DIR: &str = ".qdev";

/// Load settings from `.qdev/config.toml`.
///
/// A missing or unreadable file falls back to defaults.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(QDEV_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create a default `.qdev/config.toml` if none exists.
///
/// Returns `true` when a file was written.
pub fn init_config_dir(project_path: &Path) -> Result<bool> {
    let qdev_dir = project_path.join(QDEV_DIR);

    if !qdev_dir.exists() {
        std::fs::create_dir_all(&qdev_dir)
            .map_err(|e| Error::config(format!("Failed to create .qdev dir: {}", e)))?;
    }

    let config_path = qdev_dir.join(CONFIG_FILENAME);
    if config_path.exists() {
        return Ok(false);
    }

    let default_content = r#"# qdev configuration

[dev]
# host = "localhost"     # loopback aliases bind all interfaces
# port = 9000
# port_search_limit = 65535
devtools = false

[build]
# prepare = "npm run codegen"
# compile = "npm run build:dev"
# regenerate = "npm run build:app"

[serve]
# command = "npx serve dist --listen tcp://$HOST:$PORT"
startup_timeout_ms = 30000

[hooks]
# before_dev = "node scripts/before-dev.js"
# after_dev = "node scripts/after-dev.js"

[cordova]
dir = "src-cordova"

[capacitor]
dir = "src-capacitor"

[electron]
main = ".qdev/electron/electron-main.js"
"#;

    std::fs::write(&config_path, default_content)
        .with_context(|| format!("Failed to write {:?}", config_path))?;
    info!("Created {:?}", config_path);
    Ok(true)
}
