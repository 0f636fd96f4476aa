use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fs::entry::FileRecord;

/// How confident the engine is that a group arose from accidental copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Names differ only by a trailing copy counter.
    Numbered,
    /// Arbitrary names colliding in content.
    Suspect,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Numbered => f.write_str("numbered"),
            Classification::Suspect => f.write_str("suspect"),
        }
    }
}

/// A set of two or more files sharing size and digest.
///
/// Members are kept in discovery order; index 0 is the default survivor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub digest: String,
    pub size: u64,
    pub files: Vec<FileRecord>,
    pub classification: Classification,
}

impl DuplicateGroup {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Always `false` for groups produced by a scan.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes that would be reclaimed by keeping a single member.
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.files.len() as u64).saturating_sub(1)
    }

    /// Iterates member paths in discovery order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path())
    }
}
