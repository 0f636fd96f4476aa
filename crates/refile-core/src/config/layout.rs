//! Declarative target layouts.
//!
//! A layout is a TOML document whose top-level tables are destination
//! directories relative to the run root and whose keys are sub-paths inside
//! them, each mapping to the ordered list of file names expected there:
//!
//! ```toml
//! [src]
//! core = ["processor.py"]
//! common = ["config.py", "utils.py"]
//!
//! [tests]
//! "" = ["test_fileflow.sh"]
//!
//! [""]
//! "" = ["README.md", ".gitignore"]
//! ```
//!
//! An empty destination is the root itself and an empty sub-path means "directly
//! in the destination". Keys iterate in sorted order, so derived targets are
//! deterministic.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::path::normalize_path;

/// Destination → sub-path → ordered file names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetLayout {
    destinations: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// One declared file and the single place it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub name: String,
    pub canonical: PathBuf,
}

impl TargetLayout {
    /// Builds and validates a layout.
    pub fn new(destinations: BTreeMap<String, BTreeMap<String, Vec<String>>>) -> CoreResult<Self> {
        let layout = Self { destinations };
        layout.validate()?;
        Ok(layout)
    }

    /// Parses and validates a layout from TOML text.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let layout: TargetLayout =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Loads a layout from a TOML file.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::Config`] if it is malformed or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::from_io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Returns `true` if the layout declares no directories at all.
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Rejects layouts that cannot produce a coherent plan.
    ///
    /// # Errors
    ///
    /// [`CoreError::Config`] for an empty or multi-component file name, an
    /// absolute or `..`-escaping directory, a file declared twice, or a file
    /// whose canonical path is also an expected directory.
    pub fn validate(&self) -> CoreResult<()> {
        let mut files: HashSet<PathBuf> = HashSet::new();
        let mut dirs: HashSet<PathBuf> = HashSet::new();

        for (dest, subs) in &self.destinations {
            let dest_rel = relative_dir(dest)?;
            push_with_ancestors(&mut dirs, &dest_rel);
            for (sub, names) in subs {
                let dir = dest_rel.join(relative_dir(sub)?);
                push_with_ancestors(&mut dirs, &dir);
                for name in names {
                    check_file_name(name)?;
                    let file = dir.join(name);
                    if !files.insert(file.clone()) {
                        return Err(CoreError::Config(format!(
                            "{} is declared more than once",
                            file.display()
                        )));
                    }
                }
            }
        }

        if let Some(clash) = files.iter().find(|f| dirs.contains(*f)) {
            return Err(CoreError::Config(format!(
                "{} is declared both as a file and as a directory",
                clash.display()
            )));
        }
        Ok(())
    }

    /// Every directory that should exist under `root`, including `root`
    /// itself and the ancestors of nested sub-paths.
    pub fn expected_directory_paths(&self, root: &Path) -> BTreeSet<PathBuf> {
        let root = normalize_path(root);
        let mut dirs = BTreeSet::new();
        dirs.insert(root.clone());
        for (dest, subs) in &self.destinations {
            let dest_dir = root.join(dest);
            insert_chain(&mut dirs, &root, &dest_dir);
            for sub in subs.keys() {
                insert_chain(&mut dirs, &root, &dest_dir.join(sub));
            }
        }
        dirs
    }

    /// Every declared file with its canonical path, in layout order.
    pub fn defined_file_targets(&self, root: &Path) -> Vec<FileTarget> {
        let root = normalize_path(root);
        let mut targets = Vec::new();
        for (dest, subs) in &self.destinations {
            for (sub, names) in subs {
                let dir = root.join(dest).join(sub);
                for name in names {
                    targets.push(FileTarget {
                        name: name.clone(),
                        canonical: normalize_path(dir.join(name)),
                    });
                }
            }
        }
        targets
    }
}

fn relative_dir(dir: &str) -> CoreResult<PathBuf> {
    let mut out = PathBuf::new();
    if dir.is_empty() {
        return Ok(out);
    }
    if dir.starts_with('/') || dir.contains('\\') || Path::new(dir).is_absolute() {
        return Err(CoreError::Config(format!(
            "layout directory {dir:?} must be a relative path"
        )));
    }
    for part in dir.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." {
            return Err(CoreError::Config(format!(
                "layout directory {dir:?} must not contain {part:?}"
            )));
        }
        out.push(part);
    }
    Ok(out)
}

fn check_file_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::Config("layout file name is empty".to_string()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CoreError::Config(format!(
            "layout file name {name:?} must be a single path component"
        )));
    }
    Ok(())
}

fn push_with_ancestors(dirs: &mut HashSet<PathBuf>, rel: &Path) {
    let mut current = PathBuf::new();
    for component in rel.components() {
        current.push(component);
        dirs.insert(current.clone());
    }
}

fn insert_chain(dirs: &mut BTreeSet<PathBuf>, root: &Path, dir: &Path) {
    let dir = normalize_path(dir);
    let mut current = Some(dir.as_path());
    while let Some(p) = current {
        if p == root || !p.starts_with(root) {
            break;
        }
        dirs.insert(p.to_path_buf());
        current = p.parent();
    }
}
