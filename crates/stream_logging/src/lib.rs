#![deny(missing_docs)]
//! Shared logging utilities for the leadstream workspace.
//!
//! This crate provides the `stream_*` logging macros used across the codebase,
//! a level parser for configuration files and a minimal test initializer for
//! the global logger.

use log::LevelFilter;

/// Log target used by every `stream_*` macro.
///
/// Keeping one target lets the binary raise or lower the verbosity of the
/// search pipeline without touching third-party crates (reqwest, hyper).
pub const LOG_TARGET: &str = "leadstream";

/// Logs a trace-level message under the leadstream target.
#[macro_export]
macro_rules! stream_trace {
    ($($arg:tt)*) => {{
        log::trace!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs a debug-level message under the leadstream target.
#[macro_export]
macro_rules! stream_debug {
    ($($arg:tt)*) => {{
        log::debug!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs an info-level message under the leadstream target.
#[macro_export]
macro_rules! stream_info {
    ($($arg:tt)*) => {{
        log::info!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs a warn-level message under the leadstream target.
#[macro_export]
macro_rules! stream_warn {
    ($($arg:tt)*) => {{
        log::warn!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Logs an error-level message under the leadstream target.
#[macro_export]
macro_rules! stream_error {
    ($($arg:tt)*) => {{
        log::error!(target: $crate::LOG_TARGET, $($arg)*);
    }};
}

/// Parses a level name as written in config files (`"info"`, `"DEBUG"`, `"off"`).
///
/// Returns `None` for unknown names so callers can fall back to their default.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse::<LevelFilter>().ok()
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
