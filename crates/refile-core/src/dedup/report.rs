//! Persisted scan results.
//!
//! [`DuplicateReport`] stores the groups of one scan as JSON so a later
//! session can review them without re-hashing. [`write_index`] renders the
//! plain-text index a dedupe run leaves in its root before anything moves.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dedup::group::DuplicateGroup;
use crate::error::{CoreError, CoreResult};

/// Saved outcome of a duplicate scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
    pub scanned_at: Option<String>,
    pub scan_root: Option<PathBuf>,
}

impl DuplicateReport {
    /// Wraps `groups` scanned from `root`, stamped with the current local time.
    pub fn new(root: &Path, groups: Vec<DuplicateGroup>) -> Self {
        Self {
            groups,
            scanned_at: Some(chrono::Local::now().to_rfc3339()),
            scan_root: Some(root.to_path_buf()),
        }
    }

    /// Loads a report from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::Config`] if the JSON does not describe a report.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::from_io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))
    }

    /// Saves this report as pretty JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::from_io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;
        std::fs::write(path, json).map_err(|e| CoreError::from_io(path, e))
    }

    /// Drops members that no longer exist, then any group below two members.
    pub fn validate(self) -> Self {
        let groups = self
            .groups
            .into_iter()
            .filter_map(|group| {
                let files: Vec<_> = group.files.into_iter().filter(|f| f.path().exists()).collect();
                if files.len() >= 2 {
                    Some(DuplicateGroup { files, ..group })
                } else {
                    None
                }
            })
            .collect();
        Self { groups, ..self }
    }

    /// Total number of files across all groups.
    pub fn total_files(&self) -> usize {
        self.groups.iter().map(DuplicateGroup::len).sum()
    }

    /// Bytes reclaimable by keeping one member per group.
    pub fn total_wasted(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Renders the duplicate index: one header per group followed by its
/// members with their 1-based selection numbers.
pub fn render_index(groups: &[DuplicateGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(out, "Duplicate files with hash {}:", group.digest);
        for (i, path) in group.paths().enumerate() {
            let _ = writeln!(out, "  [{}] {}", i + 1, path.display());
        }
        out.push('\n');
    }
    out
}

/// Writes [`render_index`] to `path`.
pub fn write_index(path: &Path, groups: &[DuplicateGroup]) -> CoreResult<()> {
    std::fs::write(path, render_index(groups)).map_err(|e| CoreError::from_io(path, e))
}
