//! Defines the error types for the `core` module.
//!
//! Each boundary of the engine has its own error kind. Only [`CoreError`]
//! ever reaches a caller; the others are recovered locally by the component
//! that produced them (logged, then treated as "skip this entry").

use std::path::{PathBuf, StripPrefixError};
use thiserror::Error;

/// The primary error type for the `core` module.
///
/// This enum encapsulates the failures a caller of the engine can observe
/// when opening a project, scanning it, or generating a document.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Represents an I/O error, typically from file system operations.
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// Represents an error that occurred when a Tokio task was joined.
    /// This is often due to a task panicking or being cancelled.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The worker pool used by the directory walker could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Represents a path that was expected to be a directory but was not.
    #[error("Path is not a valid directory: {0}")]
    NotADirectory(PathBuf),

    /// Represents a failure to strip a path prefix.
    #[error("Failed to strip prefix from path: {0}")]
    PathStrip(#[from] StripPrefixError),

    /// A generate call in which none of the selected paths was a readable text file.
    #[error("None of the selected paths is a text file inside the project")]
    NoValidSelection,
}

/// Failures while listing one directory or inspecting one of its entries.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("Could not list directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not inspect entry in {path}: {source}")]
    Entry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker panicked while listing {0}")]
    Panicked(PathBuf),
}

/// File content could not be obtained at all.
///
/// Decoding never fails on its own (latin-1 is the terminal fallback), so the
/// only source of this error is the underlying read.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the on-disk scan cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Could not read cache file {1}: {0}")]
    Read(#[source] std::io::Error, PathBuf),

    #[error("Cache file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Could not write cache file {1}: {0}")]
    Write(#[source] std::io::Error, PathBuf),

    #[error("Could not move cache file into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}
