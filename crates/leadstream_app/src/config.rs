use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use leadstream_engine::{BackendSettings, ControllerSettings};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Cli;
use crate::logging::{LogDestination, LogSettings};

pub const DEFAULT_CONFIG_FILE: &str = "leadstream.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("unknown log level {0:?}")]
    LogLevel(String),
}

/// Settings read from `leadstream.ron`; every field has a default so a
/// partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub search_path: String,
    pub transcribe_path: String,
    pub history_path: String,
    pub user_id: String,
    pub timeout_secs: u64,
    pub cache_path: PathBuf,
    pub log_level: String,
    pub log_destination: LogDestination,
    pub log_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let backend = BackendSettings::default();
        Self {
            backend_url: backend.base_url,
            search_path: backend.search_path,
            transcribe_path: backend.transcribe_path,
            history_path: backend.history_path,
            user_id: "anonymous".to_string(),
            timeout_secs: ControllerSettings::default().session_timeout.as_secs(),
            cache_path: PathBuf::from("leadstream_session.ron"),
            log_level: "info".to_string(),
            log_destination: LogDestination::File,
            log_file: PathBuf::from("leadstream.log"),
        }
    }
}

impl AppConfig {
    /// Load `explicit`, or `./leadstream.ron` if it exists, or the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        match fs::read_to_string(&path) {
            Ok(text) => Self::from_ron(&text).map_err(|source| ConfigError::Parse { path, source }),
            Err(err) if !required && err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Command-line flags win over file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.backend_url {
            self.backend_url = url.clone();
        }
        if let Some(user_id) = &cli.user_id {
            self.user_id = user_id.clone();
        }
        if let Some(timeout) = cli.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(cache) = &cli.cache {
            self.cache_path = cache.clone();
        }
        match cli.verbose {
            0 => {}
            1 => self.log_level = "debug".to_string(),
            _ => self.log_level = "trace".to_string(),
        }
    }

    pub fn log_level(&self) -> Result<LevelFilter, ConfigError> {
        stream_logging::parse_level(&self.log_level)
            .ok_or_else(|| ConfigError::LogLevel(self.log_level.clone()))
    }

    pub fn log_settings(&self) -> Result<LogSettings, ConfigError> {
        Ok(LogSettings {
            destination: self.log_destination,
            level: self.log_level()?,
            file: self.log_file.clone(),
        })
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.backend_url.clone(),
            search_path: self.search_path.clone(),
            transcribe_path: self.transcribe_path.clone(),
            history_path: self.history_path.clone(),
            ..BackendSettings::default()
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            session_timeout: Duration::from_secs(self.timeout_secs.max(1)),
            ..ControllerSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::from_ron(
            r#"(backend_url: "https://leads.example.test", log_destination: Both)"#,
        )
        .unwrap();

        assert_eq!(config.backend_url, "https://leads.example.test");
        assert_eq!(config.log_destination, LogDestination::Both);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.search_path, "/api/search/stream");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let explicit = temp.path().join("absent.ron");

        assert!(matches!(
            AppConfig::load(Some(&explicit)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn malformed_file_reports_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("leadstream.ron");
        fs::write(&path, "(timeout_secs: \"soon\")").unwrap();

        match AppConfig::load(Some(&path)) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn cli_flags_override_file() {
        let cli = Cli::try_parse_from([
            "leadstream",
            "florist",
            "--location",
            "Ghent",
            "--lat",
            "51.05",
            "--lng",
            "3.72",
            "--user-id",
            "ops",
            "--timeout-secs",
            "30",
            "-v",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        config.apply_cli(&cli);

        assert_eq!(config.user_id, "ops");
        assert_eq!(config.controller_settings().session_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level().unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn log_settings_follow_the_file() {
        let config = AppConfig::from_ron(
            r#"(log_level: "warn", log_destination: Terminal, log_file: "logs/leads.log")"#,
        )
        .unwrap();

        assert_eq!(
            config.log_settings().unwrap(),
            LogSettings {
                destination: LogDestination::Terminal,
                level: LevelFilter::Warn,
                file: PathBuf::from("logs/leads.log"),
            }
        );
        assert_eq!(
            AppConfig::default().log_settings().unwrap().file,
            PathBuf::from("leadstream.log")
        );
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let config = AppConfig {
            log_level: "chatty".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(config.log_level(), Err(ConfigError::LogLevel(_))));
        assert!(matches!(config.log_settings(), Err(ConfigError::LogLevel(_))));
    }
}
