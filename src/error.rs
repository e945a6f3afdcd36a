//! Error types for sorting and configuration.
//!
//! Per-file errors ([`SortError`]) are converted into failed or skipped
//! [`SortOutcome`](crate::sorter::SortOutcome)s at the sorter boundary. Only
//! directory-level problems reach callers of the bulk scanner or monitor.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while classifying, planning, or relocating a file.
#[derive(Debug, Error)]
pub enum SortError {
    /// The file disappeared before it could be processed.
    #[error("file no longer exists: {}", path.display())]
    SourceVanished { path: PathBuf },

    /// The destination directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    DestinationCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file could not be moved to its destination.
    #[error("failed to move {} to {}: {source}", source_path.display(), destination.display())]
    MoveFailed {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory passed to the bulk scanner is missing or not a directory.
    #[error("invalid directory {}", path.display())]
    InvalidDirectory { path: PathBuf },

    /// The filesystem watch subscription could not be established.
    #[error("filesystem watch failed: {0}")]
    Watch(#[from] notify::Error),

    /// A monitor thread could not be started.
    #[error("failed to spawn monitor thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl SortError {
    /// Returns true for errors that mean "nothing to do" rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, SortError::SourceVanished { .. })
    }
}

/// Result type for sorting operations.
pub type SortResult<T> = Result<T, SortError>;

/// Errors that can occur while loading, validating, or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading the configuration file.
    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("failed to parse configuration {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but its contents are not usable.
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },

    /// The configuration could not be written back to disk.
    #[error("failed to write configuration {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No home directory could be determined for the default location.
    #[error("could not determine the home directory")]
    NoHomeDirectory,
}
