//! Error types for `refile-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`. Per-file failures inside a
//! batch never surface as `Err`; they are collected as
//! [`FailureReport`](crate::run::FailureReport)s tagged with an [`ErrorKind`].

use std::path::PathBuf;

/// Unified error type for all core operations.
///
/// Each variant captures just enough context for the caller to display
/// a meaningful message or take corrective action.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target path does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A directory was expected but the path points to a file.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A move would overwrite an existing entry.
    #[error("destination already exists: {0}")]
    AlreadyExists(PathBuf),

    /// A file could not be opened or read while fingerprinting it.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An explicit selection named a member outside `[1, len]`.
    #[error("invalid selection: index {index} is outside 1..={len}")]
    InvalidSelection { index: usize, len: usize },

    /// Malformed settings or target layout.
    #[error("config error: {0}")]
    Config(String),

    /// A rollback file could not be parsed.
    #[error("journal error: {0}")]
    Journal(String),

    /// The user cancelled an interactive operation.
    #[error("operation cancelled")]
    Cancelled,

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The four failure classes a run reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// File unreadable during hashing; excluded from its group.
    Read,
    /// Explicit resolution indices out of range.
    InvalidSelection,
    /// A move/delete/create failed.
    Io,
    /// Malformed configuration; fatal.
    Config,
}

impl CoreError {
    /// Classifies this error into the run-level taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Read { .. } => ErrorKind::Read,
            CoreError::InvalidSelection { .. } => ErrorKind::InvalidSelection,
            CoreError::Config(_) | CoreError::Journal(_) => ErrorKind::Config,
            CoreError::NotFound(_)
            | CoreError::PermissionDenied(_)
            | CoreError::NotADirectory(_)
            | CoreError::AlreadyExists(_)
            | CoreError::Cancelled
            | CoreError::Io(_) => ErrorKind::Io,
        }
    }

    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => CoreError::AlreadyExists(path.to_path_buf()),
            _ => CoreError::Io(err),
        }
    }
}

/// Convenience alias used throughout `refile-core`.
pub type CoreResult<T> = Result<T, CoreError>;
