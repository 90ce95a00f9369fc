//! SNAP-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SnapError>;

/// Top-level error type for the task snapshot tool.
#[derive(Debug, Error)]
pub enum SnapError {
    #[error("[SNAP-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SNAP-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SNAP-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SNAP-2001] source {source_name} unavailable: {details}")]
    SourceUnavailable {
        source_name: &'static str,
        details: String,
    },

    #[error("[SNAP-2002] malformed payload from {source_name}: {details}")]
    SourceParse {
        source_name: &'static str,
        details: String,
    },

    #[error("[SNAP-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SNAP-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SNAP-1001",
            Self::MissingConfig { .. } => "SNAP-1002",
            Self::ConfigParse { .. } => "SNAP-1003",
            Self::SourceUnavailable { .. } => "SNAP-2001",
            Self::SourceParse { .. } => "SNAP-2002",
            Self::Serialization { .. } => "SNAP-2101",
            Self::Io { .. } => "SNAP-3002",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for an unreachable OS data source.
    #[must_use]
    pub fn unavailable(source_name: &'static str, details: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name,
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for SnapError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SnapError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
