//! PW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PwError>;

/// Top-level error type for playerwatch.
#[derive(Debug, Error)]
pub enum PwError {
    #[error("[PW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PW-2001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PW-2002] corrupt compressed log {path}: {details}")]
    Decompress { path: PathBuf, details: String },

    #[error("[PW-2003] cannot watch {path}: {details}")]
    Watch { path: PathBuf, details: String },

    #[error("[PW-2004] live log not found: {path}")]
    MissingLiveLog { path: PathBuf },

    #[error("[PW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PW-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[PW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PwError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PW-1001",
            Self::MissingConfig { .. } => "PW-1002",
            Self::ConfigParse { .. } => "PW-1003",
            Self::Io { .. } => "PW-2001",
            Self::Decompress { .. } => "PW-2002",
            Self::Watch { .. } => "PW-2003",
            Self::MissingLiveLog { .. } => "PW-2004",
            Self::Serialization { .. } => "PW-2101",
            Self::ChannelClosed { .. } => "PW-3003",
            Self::Runtime { .. } => "PW-3900",
        }
    }

    /// Source-level failures that end the tailing pipeline.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Decompress { .. }
                | Self::Watch { .. }
                | Self::MissingLiveLog { .. }
                | Self::Runtime { .. }
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

impl From<serde_json::Error> for PwError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PwError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for PwError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<notify::Error> for PwError {
    fn from(value: notify::Error) -> Self {
        let path = value.paths.first().cloned().unwrap_or_default();
        Self::Watch {
            path,
            details: value.to_string(),
        }
    }
}
