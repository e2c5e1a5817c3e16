//! Configuration file parsing for qdev
//!
//! Supports:
//! - `.qdev/config.toml` - Project settings (address, build/serve commands,
//!   lifecycle hooks, platform shells)

pub mod settings;
pub mod types;

pub use settings::{init_config_dir, load_settings, CONFIG_FILENAME, QDEV_DIR};
pub use types::*;
