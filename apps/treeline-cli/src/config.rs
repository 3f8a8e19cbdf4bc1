//! Centralized configuration for the `tl` binary.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than halfway through a demo-mode switch.

use std::env;
use std::fmt;
use std::path::PathBuf;

use domain::lifecycle::DemoDbPaths;

/// Database file holding the user's real data.
pub const REAL_DB_FILE: &str = "treeline.db";

/// File holding persisted CLI settings, including the demo-mode flag.
pub const SETTINGS_FILE: &str = "settings.json";

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// CLI configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding databases and settings (default: ~/.treeline)
    pub treeline_dir: PathBuf,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        // Treeline directory
        let treeline_dir = match lookup("TREELINE_DIR") {
            Some(dir) if dir.trim().is_empty() => {
                return Err(ConfigError {
                    field: "TREELINE_DIR",
                    message: "Must not be empty".into(),
                })
            }
            Some(dir) => PathBuf::from(dir),
            None => directories_next::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".treeline"))
                .ok_or_else(|| ConfigError {
                    field: "TREELINE_DIR",
                    message: "No home directory found; set TREELINE_DIR".into(),
                })?,
        };

        // Log format
        let log_format =
            LogFormat::from_str(&lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            treeline_dir,
            log_format,
        })
    }

    /// Build a config rooted at `dir`, for tests and embedding.
    #[cfg(test)]
    pub fn in_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            treeline_dir: dir.into(),
            log_format: LogFormat::Pretty,
        }
    }

    pub fn real_db_path(&self) -> PathBuf {
        self.treeline_dir.join(REAL_DB_FILE)
    }

    pub fn demo_db_paths(&self) -> DemoDbPaths {
        DemoDbPaths::in_dir(&self.treeline_dir)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.treeline_dir.join(SETTINGS_FILE)
    }
}
