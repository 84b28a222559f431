//! aideck: tool-calling agent loop and activity categorisation engine.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod activity;
pub mod agent;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod logs;
pub mod models;
pub mod tools;

/// Return the aideck home directory.
///
/// Resolution order:
/// 1. `AIDECK_HOME` environment variable
/// 2. `$HOME/.aideck`
pub fn aideck_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("AIDECK_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".aideck")
    }
}
