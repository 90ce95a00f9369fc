//! Diagnostic logger: human-readable, size-rotated text log for operators.
//!
//! Each line is `[yyyy-MM-dd HH:mm:ss.fff][LEVEL] message` in local time.
//! Rotation happens once, when the logger is opened: a file already larger
//! than `max_size_bytes` is shifted to `.1` and older backups move up by one,
//! with the oldest discarded.
//!
//! Three-level fallback chain:
//! 1. Log file
//! 2. stderr with `[TASKSNAP-LOG]` prefix
//! 3. Silent discard (a snapshot run must never fail because of logging)

use std::fmt;
use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;
use parking_lot::Mutex;

use crate::core::config::{Config, LoggingConfig};
use crate::core::errors::{Result, SnapError};

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Verbose detail.
    Debug,
    /// Normal progress.
    Info,
    /// Degraded but continuing.
    Warn,
    /// A failure that ended the run.
    Error,
}

impl Level {
    /// Tag written between brackets.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Configuration for the diagnostic logger.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log file path.
    pub path: PathBuf,
    /// Size above which the file is rotated when the logger opens.
    pub max_size_bytes: u64,
    /// Number of numbered backups kept.
    pub max_backups: u32,
    /// Echo lines to stderr.
    pub console: bool,
}

impl LogConfig {
    /// Build from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let LoggingConfig {
            max_size_bytes,
            max_backups,
            console,
        } = config.logging;
        Self {
            path: config.paths.log_file.clone(),
            max_size_bytes,
            max_backups,
            console,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    File,
    Stderr,
    Discard,
}

struct Inner {
    file: Option<File>,
    state: WriterState,
}

/// Per-run diagnostic logger. Shared by reference; writes are serialized
/// through an internal lock.
pub struct DiagnosticLogger {
    config: LogConfig,
    inner: Mutex<Inner>,
}

impl DiagnosticLogger {
    /// Rotate if needed, then open the log for appending. Falls through the
    /// degradation chain on failure.
    pub fn open(config: LogConfig) -> Self {
        rotate_if_oversized(&config.path, config.max_size_bytes, config.max_backups);
        let inner = match open_append(&config.path) {
            Ok(file) => Inner {
                file: Some(file),
                state: WriterState::File,
            },
            Err(e) => {
                let _ = writeln!(io::stderr(), "[TASKSNAP-LOG] log file unavailable, using stderr: {e}");
                Inner {
                    file: None,
                    state: WriterState::Stderr,
                }
            }
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    /// Logger that only echoes to stderr (or nowhere). Used before the
    /// configuration is known and in tests.
    #[must_use]
    pub fn detached(console: bool) -> Self {
        Self {
            config: LogConfig {
                path: PathBuf::new(),
                max_size_bytes: u64::MAX,
                max_backups: 1,
                console,
            },
            inner: Mutex::new(Inner {
                file: None,
                state: WriterState::Discard,
            }),
        }
    }

    /// Append one line.
    pub fn log(&self, level: Level, message: impl AsRef<str>) {
        let line = format_line(chrono::Local::now(), level, message.as_ref());
        if self.config.console {
            echo(level, &line);
        }

        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                WriterState::File => {
                    let written = inner
                        .file
                        .as_mut()
                        .is_some_and(|f| f.write_all(format!("{line}\n").as_bytes()).is_ok());
                    if written {
                        return;
                    }
                    inner.file = None;
                    inner.state = WriterState::Stderr;
                }
                WriterState::Stderr => {
                    if self.config.console {
                        // Already echoed.
                        return;
                    }
                    if writeln!(io::stderr(), "[TASKSNAP-LOG] {line}").is_ok() {
                        return;
                    }
                    inner.state = WriterState::Discard;
                }
                WriterState::Discard => return,
            }
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message);
    }

    /// Flush the file handle.
    pub fn flush(&self) {
        if let Some(f) = self.inner.lock().file.as_mut() {
            let _ = f.flush();
        }
    }

    /// Current degradation state.
    pub fn state(&self) -> &'static str {
        match self.inner.lock().state {
            WriterState::File => "file",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }
}

// ──────────────────────── helpers ────────────────────────

fn format_line(now: chrono::DateTime<chrono::Local>, level: Level, message: &str) -> String {
    format!("[{}][{level}] {message}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
}

fn echo(level: Level, line: &str) {
    let colored_line = match level {
        Level::Debug => line.dimmed(),
        Level::Info => line.normal(),
        Level::Warn => line.yellow(),
        Level::Error => line.red().bold(),
    };
    let _ = writeln!(io::stderr(), "{colored_line}");
}

/// Shift `log.(i)` → `log.(i+1)` and `log` → `log.1` when `log` exceeds `max_size`.
fn rotate_if_oversized(base: &Path, max_size: u64, max_backups: u32) {
    let Ok(meta) = fs::metadata(base) else {
        return;
    };
    if meta.len() <= max_size {
        return;
    }

    let oldest = rotated_name(base, max_backups);
    let _ = fs::remove_file(&oldest);
    for i in (1..max_backups).rev() {
        let _ = rename(rotated_name(base, i), rotated_name(base, i + 1));
    }
    let _ = rename(base, rotated_name(base, 1));
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SnapError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SnapError::io(path, source))
}

/// Build a rotated filename: `foo.log` → `foo.log.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

// ──────────────────────── tests ────────────────────────
