//! # qdev-core - Core Domain Types
//!
//! Foundation crate for qdev. Provides domain types, error handling and
//! logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`DevMode`] - What is being served (spa, ssr, pwa, cordova, capacitor, electron)
//! - [`MobileTarget`] - Native platform for the mobile-hybrid modes
//! - [`Address`] - Requested or resolved host/port pair
//! - [`SessionPhase`] - Session controller state
//! - [`HookPhase`] - Named lifecycle hook points
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with network/fatal classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use qdev_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all qdev crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use types::{
    is_loopback_alias, Address, DevMode, HookPhase, MobileTarget, SessionPhase, LOOPBACK_ALIASES,
    WILDCARD_HOST,
};
