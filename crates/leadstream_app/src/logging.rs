//! Logger setup for the leadstream binary, driven by `AppConfig`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogDestination {
    #[default]
    File,
    /// stderr for warnings and errors, stdout otherwise.
    Terminal,
    Both,
}

/// Resolved logging options.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub destination: LogDestination,
    pub level: LevelFilter,
    pub file: PathBuf,
}

/// Install the global logger. A log file that cannot be opened falls back
/// to the terminal so a search never runs unlogged.
pub fn initialize(settings: &LogSettings) {
    let config = build_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if settings.destination != LogDestination::Terminal {
        match open_log_file(&settings.file) {
            Ok(file) => loggers.push(WriteLogger::new(settings.level, config.clone(), file)),
            Err(err) => eprintln!(
                "Warning: could not open log file {:?}: {}",
                settings.file, err
            ),
        }
    }
    if settings.destination != LogDestination::File || loggers.is_empty() {
        loggers.push(TermLogger::new(
            settings.level,
            config,
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    // Only the pipeline's own target; reqwest and hyper stay quiet.
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .add_filter_allow_str(stream_logging::LOG_TARGET)
        .build()
}

/// Truncates the previous run's log; creates missing parent directories.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}
