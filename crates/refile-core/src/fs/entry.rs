//! File records produced by a tree walk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::path::nfc_string;

/// A regular file seen during a walk: absolute path plus size.
///
/// The path is the walk root (normalized) joined with the names exactly as
/// they are stored on disk, so it can always be opened again. Compare records
/// against declared paths through [`normalize_path`](crate::path::normalize_path).
///
/// Records are ephemeral; a scan owns them and nothing persists them
/// except an explicit [`DuplicateReport`](crate::dedup::report::DuplicateReport).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    path: PathBuf,
    size: u64,
}

impl FileRecord {
    /// Creates a record. `path` should be absolute.
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }

    /// Returns the absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the file name (NFC-normalized), or an empty string.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| nfc_string(&n.to_string_lossy()))
            .unwrap_or_default()
    }
}

/// A [`FileRecord`] together with its content digest.
///
/// Only produced for files that share their size with at least one other
/// file; every other file is unique without reading it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintedFile {
    pub record: FileRecord,
    pub digest: String,
}
