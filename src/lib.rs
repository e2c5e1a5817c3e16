//! qdev Library
//!
//! Binary-side wiring for qdev: the session runner and headless event output.
//! The orchestration itself lives in `qdev-app`.

pub mod headless;
pub mod runner;

// Re-export main entry point
pub use runner::run_session;
