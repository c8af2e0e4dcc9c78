//! Error types for the flatbak library
//!
//! This module defines all error types that can occur during a backup run.
//! Configuration errors are fatal and detected before any file is touched;
//! everything else is either recovered per item (and recorded in the run
//! report) or reported as a run-level failure.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the flatbak library
pub type Result<T> = std::result::Result<T, FlatbakError>;

/// Main error type for all flatbak operations
#[derive(Debug, Error)]
pub enum FlatbakError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors during YAML serialization/deserialization
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Errors raised by the zip writer
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Source and backup roots resolve to the same location
    #[error("Source and backup folders must not be the same: {0:?}")]
    SameSourceAndBackup(PathBuf),

    /// Source root does not exist or is not a directory
    #[error("Source folder does not exist: {0:?}")]
    SourceMissing(PathBuf),

    /// Pattern parsing error
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Snapshot archive could not be written
    #[error("Archive error: {0}")]
    Archive(String),

    /// Archive listing for retention failed
    #[error("Retention error: {0}")]
    Retention(String),

    /// Path conversion error
    #[error("Path conversion error: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlatbakError {
    /// Create an archive error with a custom message
    pub fn archive(msg: impl Into<String>) -> Self {
        FlatbakError::Archive(msg.into())
    }

    /// Create a retention error with a custom message
    pub fn retention(msg: impl Into<String>) -> Self {
        FlatbakError::Retention(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        FlatbakError::Internal(msg.into())
    }

    /// Check if this error is a fatal misconfiguration
    ///
    /// Configuration errors are raised before any file I/O takes place and
    /// map to a distinct exit status in the CLI.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            FlatbakError::SameSourceAndBackup(_)
                | FlatbakError::SourceMissing(_)
                | FlatbakError::InvalidPattern { .. }
                | FlatbakError::InvalidConfiguration(_)
                | FlatbakError::Json(_)
                | FlatbakError::Yaml(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            FlatbakError::SameSourceAndBackup(path) => {
                format!(
                    "Source and backup folders both point to {:?}. \
                     Set 'backup_folder' to a different directory.",
                    path
                )
            }
            FlatbakError::SourceMissing(path) => {
                format!("Source folder {:?} does not exist. Check 'source_folder' in your config.", path)
            }
            FlatbakError::InvalidPattern { pattern, .. } => {
                format!(
                    "Ignore pattern '{}' could not be parsed. Only '*', '?' and '[...]' wildcards are supported.",
                    pattern
                )
            }
            _ => self.to_string(),
        }
    }
}
