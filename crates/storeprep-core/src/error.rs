//! Error taxonomy for storeprep.
//!
//! Everything except `External` is recovered by callers into a failed
//! [`StepStatus`](crate::status::StepStatus) with the error text as diagnostic.

use std::path::{Path, PathBuf};

use crate::assets::Dimensions;

#[derive(Debug, thiserror::Error)]
pub enum StoreprepError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("wrong size for {label} ({path}): expected {expected}, found {actual}")]
    DimensionMismatch {
        label: String,
        path: PathBuf,
        expected: Dimensions,
        actual: Dimensions,
    },

    #[error("manifest validation failed for '{token}' at {path}: expected present={expected}, found present={found}")]
    TokenMismatch {
        token: String,
        path: PathBuf,
        expected: bool,
        found: bool,
    },

    #[error("could not decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("external call failed: {0}")]
    External(String),

    #[error("malformed price '{0}'")]
    Parse(String),

    #[error("price out of range: {0}")]
    Overflow(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreprepError {
    /// Wrap an io error with the path it happened at.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StoreprepError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<reqwest::Error> for StoreprepError {
    fn from(err: reqwest::Error) -> Self {
        StoreprepError::External(err.to_string())
    }
}

/// Result type for storeprep core operations.
pub type Result<T> = std::result::Result<T, StoreprepError>;
