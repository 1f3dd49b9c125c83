//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur while setting up or running the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Directory not found.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// The watch root could not be inspected.
    #[error("could not access directory {}: {source}", path.display())]
    RootUnavailable {
        /// Path of the watch root.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The watch root exists but is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(String),

    /// The allowlist file could not be read.
    #[error("could not read allowed extensions file {}: {source}", path.display())]
    Allowlist {
        /// Path of the allowlist file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An event kind token that is not one of the known operation kinds.
    #[error("unknown event kind: {0:?}")]
    UnknownEventKind(String),

    /// The tree walk failed.
    #[error("could not walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
