//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SnapError};

/// Default `action` tag stamped on every output record.
pub const DEFAULT_ACTION: &str = "list_scheduled_tasks";

/// Full tasksnap configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub collection: CollectionConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

/// Filesystem locations used by a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Human-readable diagnostic log.
    pub log_file: PathBuf,
    /// Active-response NDJSON drop file.
    pub output_file: PathBuf,
    /// Where the sink stages its temp file. `None` means the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

/// Bounds on what is pulled from the OS sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectionConfig {
    /// Cap on processed tasks; 0 = unlimited.
    pub max_tasks: usize,
    /// Upper bound on history events read from the operational log.
    pub history_max_events: usize,
}

/// Diagnostic log rotation and console echo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_size_bytes: u64,
    pub max_backups: u32,
    pub console: bool,
}

/// Envelope values stamped on every record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub action: String,
    /// Overrides the detected host name when set.
    pub host: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let dir = active_response_dir();
        Self {
            log_file: dir.join("list-scheduled-tasks.log"),
            output_file: dir.join("active-responses.log"),
            scratch_dir: None,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_tasks: 0,
            history_max_events: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024,
            max_backups: 5,
            console: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            action: DEFAULT_ACTION.to_string(),
            host: None,
        }
    }
}

/// `active-response` directory of the monitoring agent install.
fn active_response_dir() -> PathBuf {
    agent_root().join("active-response")
}

#[cfg(windows)]
fn agent_root() -> PathBuf {
    env::var_os("ProgramFiles(x86)")
        .map_or_else(
            || PathBuf::from(r"C:\Program Files (x86)"),
            PathBuf::from,
        )
        .join("ossec-agent")
}

#[cfg(not(windows))]
fn agent_root() -> PathBuf {
    PathBuf::from("/var/ossec")
}

impl Config {
    /// Default configuration path: beside the diagnostic log.
    #[must_use]
    pub fn default_path() -> PathBuf {
        active_response_dir().join("tasksnap.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SnapError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(SnapError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `TASKSNAP_*` overrides resolved through `lookup`.
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("TASKSNAP_LOG_FILE") {
            self.paths.log_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("TASKSNAP_OUTPUT_FILE") {
            self.paths.output_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("TASKSNAP_SCRATCH_DIR") {
            self.paths.scratch_dir = Some(PathBuf::from(raw));
        }

        if let Some(raw) = lookup("TASKSNAP_MAX_TASKS") {
            self.collection.max_tasks = parse_env("TASKSNAP_MAX_TASKS", &raw)?;
        }
        if let Some(raw) = lookup("TASKSNAP_HISTORY_MAX_EVENTS") {
            self.collection.history_max_events = parse_env("TASKSNAP_HISTORY_MAX_EVENTS", &raw)?;
        }

        if let Some(raw) = lookup("TASKSNAP_LOG_MAX_SIZE_BYTES") {
            self.logging.max_size_bytes = parse_env("TASKSNAP_LOG_MAX_SIZE_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("TASKSNAP_LOG_MAX_BACKUPS") {
            self.logging.max_backups = parse_env("TASKSNAP_LOG_MAX_BACKUPS", &raw)?;
        }
        if let Some(raw) = lookup("TASKSNAP_LOG_CONSOLE") {
            self.logging.console = parse_env("TASKSNAP_LOG_CONSOLE", &raw)?;
        }

        if let Some(raw) = lookup("TASKSNAP_ACTION") {
            self.output.action = raw;
        }
        if let Some(raw) = lookup("TASKSNAP_HOST") {
            self.output.host = Some(raw);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.action.trim().is_empty() {
            return Err(SnapError::InvalidConfig {
                details: "output.action must not be empty".to_string(),
            });
        }
        if self.output.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(SnapError::InvalidConfig {
                details: "output.host must not be empty when set".to_string(),
            });
        }
        for (name, path) in [
            ("paths.log_file", &self.paths.log_file),
            ("paths.output_file", &self.paths.output_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(SnapError::InvalidConfig {
                    details: format!("{name} must not be empty"),
                });
            }
        }
        if self.logging.max_size_bytes == 0 {
            return Err(SnapError::InvalidConfig {
                details: "logging.max_size_bytes must be > 0".to_string(),
            });
        }
        if self.logging.max_backups == 0 {
            return Err(SnapError::InvalidConfig {
                details: "logging.max_backups must be >= 1".to_string(),
            });
        }
        if self.collection.history_max_events == 0 {
            return Err(SnapError::InvalidConfig {
                details: "collection.history_max_events must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| SnapError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
