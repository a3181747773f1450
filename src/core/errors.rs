//! DLJ-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, JanitorError>;

/// Top-level error type for downloads janitor.
#[derive(Debug, Error)]
pub enum JanitorError {
    #[error("[DLJ-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DLJ-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DLJ-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DLJ-1101] usage error: {details}")]
    Usage { details: String },

    #[error("[DLJ-2001] malformed artifact filename {filename:?} in {dir}: {reason}")]
    MalformedArtifact {
        filename: String,
        dir: PathBuf,
        reason: String,
    },

    #[error("[DLJ-2002] invalid glob pattern {pattern:?}: {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error("[DLJ-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DLJ-3001] not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("[DLJ-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DLJ-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl JanitorError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DLJ-1001",
            Self::MissingConfig { .. } => "DLJ-1002",
            Self::ConfigParse { .. } => "DLJ-1003",
            Self::Usage { .. } => "DLJ-1101",
            Self::MalformedArtifact { .. } => "DLJ-2001",
            Self::InvalidPattern { .. } => "DLJ-2002",
            Self::Serialization { .. } => "DLJ-2101",
            Self::NotADirectory { .. } => "DLJ-3001",
            Self::Io { .. } => "DLJ-3002",
            Self::Runtime { .. } => "DLJ-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Informational: neither the scanner nor the pruner retries anything.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Runtime { .. })
    }

    /// Whether the failure stems from how the tool was invoked or configured.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::Usage { .. }
                | Self::InvalidPattern { .. }
                | Self::MalformedArtifact { .. }
                | Self::NotADirectory { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for JanitorError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for JanitorError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
