//! Two-phase duplicate scanning.
//!
//! Phase one walks the tree and buckets every regular file by size. Any
//! bucket with a single entry is provably unique and never read. Phase two
//! fingerprints the rest and regroups them by digest.

use std::collections::HashMap;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::config::settings::{ArtifactConfig, Config, DepthLimit};
use crate::dedup::classify::{classify, discovery_order};
use crate::dedup::group::{Classification, DuplicateGroup};
use crate::error::{CoreError, CoreResult};
use crate::fs::entry::{FileRecord, FingerprintedFile};
use crate::fs::hash::{fingerprint, HashAlgorithm, DEFAULT_BLOCK_SIZE};
use crate::path::normalize_path;
use crate::progress::ProgressReporter;
use crate::run::FailureReport;

/// What a scan walks and how it hashes.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_depth: DepthLimit,
    pub include_hidden: bool,
    pub excluded_dirs: Vec<String>,
    pub algorithm: HashAlgorithm,
    pub block_size: usize,
    /// Run artifacts in the root that are never entered or reported.
    pub artifacts: ArtifactConfig,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: DepthLimit::default(),
            include_hidden: true,
            excluded_dirs: Vec::new(),
            algorithm: HashAlgorithm::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            artifacts: ArtifactConfig::default(),
        }
    }
}

impl From<&Config> for ScanOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_depth: config.scan.max_depth,
            include_hidden: config.scan.include_hidden,
            excluded_dirs: config.scan.excluded_dirs.clone(),
            algorithm: config.hash.algorithm,
            block_size: config.hash.block_size,
            artifacts: config.artifacts.clone(),
        }
    }
}

/// Counters collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Regular files seen by the walk.
    pub scanned: usize,
    /// Files sharing their size with at least one other file.
    pub candidates: usize,
    pub hashed: usize,
    pub unreadable: usize,
    pub duplicate_groups: usize,
    pub duplicate_files: usize,
    pub wasted_bytes: u64,
}

/// Result of [`scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Groups ordered by the discovery position of their first member.
    pub groups: Vec<DuplicateGroup>,
    pub stats: ScanStats,
    /// One entry per file that could not be fingerprinted.
    pub failures: Vec<FailureReport>,
}

/// Walks `root` and returns every regular file within the depth limit, in
/// a stable discovery order (siblings sorted by [`discovery_order`] at every
/// level).
///
/// Walk errors on individual entries are logged and skipped.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `root` does not exist.
/// - [`CoreError::NotADirectory`] if `root` is not a directory.
pub fn walk_files(
    root: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> CoreResult<Vec<FileRecord>> {
    let root = normalize_path(root);
    let meta = std::fs::metadata(&root).map_err(|e| CoreError::from_io(&root, e))?;
    if !meta.is_dir() {
        return Err(CoreError::NotADirectory(root));
    }

    let mut walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by(|a, b| discovery_order(a.file_name(), b.file_name()));
    if let DepthLimit::Levels(levels) = options.max_depth {
        // the root and its direct subdirectories are both level 0, so a
        // file at walk depth n sits at level n - 2 (or in the root itself)
        walker = walker.max_depth(levels.saturating_add(2));
    }

    let mut records = Vec::new();
    for entry in walker.into_iter().filter_entry(|e| keep_entry(e, options)) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                tracing::warn!("skipping {}: {e}", entry.path().display());
                continue;
            }
        };
        records.push(FileRecord::new(entry.into_path(), size));
        reporter.on_scan_progress(records.len());
    }
    Ok(records)
}

fn keep_entry(entry: &DirEntry, options: &ScanOptions) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if !options.include_hidden && name.starts_with('.') {
        return false;
    }
    if entry.depth() == 1 && options.artifacts.is_artifact_name(&name) {
        return false;
    }
    if entry.file_type().is_dir() && options.excluded_dirs.iter().any(|d| *d == name) {
        return false;
    }
    true
}

/// Finds every group of byte-identical files under `root`.
///
/// Files that cannot be read while hashing are dropped from consideration
/// and reported in [`ScanOutcome::failures`]; a group that shrinks below two
/// members disappears. Running it twice on an unchanged tree returns the
/// same groups in the same order.
///
/// # Errors
///
/// Only for an unusable root; see [`walk_files`].
pub fn scan(
    root: &Path,
    options: &ScanOptions,
    reporter: &dyn ProgressReporter,
) -> CoreResult<ScanOutcome> {
    reporter.on_scan_start();
    let records = walk_files(root, options, reporter)?;
    reporter.on_scan_complete(records.len());
    tracing::debug!("walked {} files under {}", records.len(), root.display());

    let mut by_size: HashMap<u64, usize> = HashMap::new();
    for record in &records {
        *by_size.entry(record.size()).or_default() += 1;
    }

    let candidates: Vec<&FileRecord> = records
        .iter()
        .filter(|r| by_size.get(&r.size()).copied().unwrap_or(0) >= 2)
        .collect();

    let mut stats = ScanStats {
        scanned: records.len(),
        candidates: candidates.len(),
        ..ScanStats::default()
    };
    let mut failures = Vec::new();

    reporter.on_hash_start(candidates.len());
    let mut fingerprinted: Vec<FingerprintedFile> = Vec::with_capacity(candidates.len());
    for (i, record) in candidates.iter().enumerate() {
        match fingerprint(record.path(), options.algorithm, options.block_size) {
            Ok(digest) => {
                stats.hashed += 1;
                fingerprinted.push(FingerprintedFile {
                    record: (*record).clone(),
                    digest,
                });
            }
            Err(e) => {
                tracing::warn!("excluding unreadable file: {e}");
                stats.unreadable += 1;
                failures.push(FailureReport::from_error("hash", record.path(), &e));
            }
        }
        reporter.on_hash_progress(i + 1, candidates.len());
    }

    let groups = group_by_digest(fingerprinted);

    stats.duplicate_groups = groups.len();
    stats.duplicate_files = groups.iter().map(DuplicateGroup::len).sum();
    stats.wasted_bytes = groups.iter().map(DuplicateGroup::wasted_bytes).sum();
    reporter.on_hash_complete(groups.len());

    Ok(ScanOutcome {
        groups,
        stats,
        failures,
    })
}

fn group_by_digest(files: Vec<FingerprintedFile>) -> Vec<DuplicateGroup> {
    let mut index: HashMap<(u64, String), usize> = HashMap::new();
    let mut buckets: Vec<(String, u64, Vec<FileRecord>)> = Vec::new();

    for file in files {
        let key = (file.record.size(), file.digest);
        match index.get(&key) {
            Some(&slot) => buckets[slot].2.push(file.record),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push((key.1, key.0, vec![file.record]));
            }
        }
    }

    buckets
        .into_iter()
        .filter(|(_, _, members)| members.len() >= 2)
        .map(|(digest, size, files)| {
            let paths: Vec<&Path> = files.iter().map(FileRecord::path).collect();
            let classification = classify(&paths);
            if classification == Classification::Suspect {
                tracing::warn!(
                    "suspect duplicate group {}: {} files with unrelated names",
                    short_digest(&digest),
                    files.len()
                );
            }
            DuplicateGroup {
                digest,
                size,
                files,
                classification,
            }
        })
        .collect()
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
