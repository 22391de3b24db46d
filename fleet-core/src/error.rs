//! Error types for fleet-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration and persisted-file operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (write path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error on config load: includes file path and line context.
    #[error("failed to parse config at {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.fleet/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A configuration value failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
