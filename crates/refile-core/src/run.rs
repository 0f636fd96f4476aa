//! Run orchestration.
//!
//! A run takes a finished action plan, opens the run's artifacts (rollback
//! journal, quarantine directory, archive), performs every action through a
//! [`FileOperator`], and reports what happened. Every artifact of one run
//! carries the same [`RunStamp`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::settings::{ArtifactConfig, Config};
use crate::dedup::report::write_index;
use crate::dedup::resolve::{resolve, Strategy};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::fs::scan::{scan, ScanOptions, ScanOutcome, ScanStats};
use crate::path::normalize_path;
use crate::progress::ProgressReporter;
use crate::txn::action::ReconciliationAction;
use crate::txn::archive::ArchivalSink;
use crate::txn::journal::{replay, Journal, JournalEntry, ReplayReport};
use crate::txn::operator::FileOperator;

/// Local timestamp naming every artifact of one run (`%Y%m%d_%H%M%S`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunStamp(String);

impl RunStamp {
    pub fn now() -> Self {
        Self(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Uses a fixed stamp, e.g. to make artifact names predictable in tests.
    pub fn new(stamp: impl Into<String>) -> Self {
        Self(stamp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Concrete artifact paths for one run in one root.
#[derive(Debug, Clone)]
pub struct ArtifactNames {
    root: PathBuf,
    stamp: RunStamp,
    config: ArtifactConfig,
}

impl ArtifactNames {
    pub fn new(root: &Path, stamp: RunStamp, config: ArtifactConfig) -> Self {
        Self {
            root: normalize_path(root),
            stamp,
            config,
        }
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.root
            .join(format!("{}_{}", self.config.quarantine_prefix, self.stamp))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root
            .join(format!("{}_{}.tar.gz", self.config.archive_prefix, self.stamp))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root
            .join(format!("{}_{}.csv", self.config.journal_prefix, self.stamp))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root
            .join(format!("{}_{}.txt", self.config.index_prefix, self.stamp))
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(&self.config.log_file)
    }

    /// Returns `true` for an entry directly in the root that any run
    /// (this one or an earlier one) would have written.
    pub fn is_artifact(&self, path: &Path) -> bool {
        let in_root = path.parent().map(normalize_path).as_deref() == Some(self.root.as_path());
        in_root
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| self.config.is_artifact_name(n))
    }
}

/// Knobs for a single [`apply`].
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub dry_run: bool,
    /// Route deletions through the archival sink. Off means unlink in place.
    pub archive: bool,
    pub stamp: RunStamp,
    pub artifacts: ArtifactConfig,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            archive: true,
            stamp: RunStamp::now(),
            artifacts: ArtifactConfig::default(),
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            dry_run,
            artifacts: config.artifacts.clone(),
            ..Self::default()
        }
    }

    pub fn names(&self, root: &Path) -> ArtifactNames {
        ArtifactNames::new(root, self.stamp.clone(), self.artifacts.clone())
    }
}

/// One isolated per-file failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub path: PathBuf,
    /// Short verb naming what was attempted (`hash`, `move`, `select`, …).
    pub action: String,
    pub message: String,
}

impl FailureReport {
    pub fn from_error(action: &str, path: &Path, error: &CoreError) -> Self {
        Self {
            kind: error.kind(),
            path: path.to_path_buf(),
            action: action.to_string(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.path.display(), self.message)
    }
}

/// End-of-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub scanned: usize,
    pub duplicate_groups: usize,
    pub duplicate_files: usize,
    pub archived: usize,
    pub deleted: usize,
    pub moved: usize,
    /// Files and directories created.
    pub created: usize,
    pub removed_dirs: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record_scan(&mut self, stats: &ScanStats) {
        self.scanned = stats.scanned;
        self.duplicate_groups = stats.duplicate_groups;
        self.duplicate_files = stats.duplicate_files;
        self.failed += stats.unreadable;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned {}, duplicate groups {}, duplicate files {}, archived {}, deleted {}, \
             moved {}, created {}, removed dirs {}, failed {}",
            self.scanned,
            self.duplicate_groups,
            self.duplicate_files,
            self.archived,
            self.deleted,
            self.moved,
            self.created,
            self.removed_dirs,
            self.failed
        )
    }
}

/// What a run did (or, for a dry run, would do).
#[derive(Debug, Clone)]
pub struct RunReport {
    pub dry_run: bool,
    /// One line per attempted action; identical between dry and real runs.
    pub descriptions: Vec<String>,
    pub journal: Vec<JournalEntry>,
    pub failures: Vec<FailureReport>,
    pub summary: Summary,
    pub journal_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub quarantine_dir: Option<PathBuf>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) fn check_root(root: &Path) -> CoreResult<PathBuf> {
    let root = normalize_path(root);
    let meta = std::fs::metadata(&root).map_err(|e| CoreError::from_io(&root, e))?;
    if !meta.is_dir() {
        return Err(CoreError::NotADirectory(root));
    }
    Ok(root)
}

/// Performs `actions` against `root`.
///
/// A real run with at least one action opens the rollback file before the
/// first mutation; failing to do so is the only error returned once the root
/// is known to be valid. Per-action failures are collected in the report.
pub fn apply(
    root: &Path,
    actions: &[ReconciliationAction],
    settings: &RunSettings,
) -> CoreResult<RunReport> {
    let root = check_root(root)?;
    let names = settings.names(&root);

    let journal = if settings.dry_run || actions.is_empty() {
        Journal::in_memory(&root)
    } else {
        Journal::create(&names.journal_path(), &root)?
    };
    let sink = settings.archive.then(|| {
        ArchivalSink::new(
            &root,
            names.quarantine_dir(),
            names.archive_path(),
            settings.dry_run,
        )
    });

    let prefix = if settings.dry_run { "[DRY RUN] " } else { "" };
    tracing::info!("{prefix}Applying {} actions under {}", actions.len(), root.display());

    let mut operator = FileOperator::new(journal, sink, settings.dry_run);
    for action in actions {
        operator.apply(action);
    }
    let outcome = operator.finish();

    if let Some(path) = &outcome.journal_path {
        tracing::info!("Rollback log written: {}", path.display());
    }

    Ok(RunReport {
        dry_run: settings.dry_run,
        descriptions: outcome.descriptions,
        journal: outcome.journal,
        failures: outcome.failures,
        summary: outcome.summary,
        journal_path: outcome.journal_path,
        archive_path: outcome.archive_path,
        quarantine_dir: outcome.quarantine_dir,
    })
}

/// Outcome of [`dedupe`].
#[derive(Debug, Clone)]
pub struct DedupeReport {
    pub scan: ScanOutcome,
    pub index_path: Option<PathBuf>,
    pub kept: Vec<PathBuf>,
    pub run: RunReport,
}

/// Scan, index, resolve, confirm, apply.
///
/// Before any real destructive batch `confirm` is shown the plan; returning
/// `false` aborts with [`CoreError::Cancelled`] before anything is touched.
/// Scan and selection failures are merged into the run's failure list.
pub fn dedupe<C>(
    root: &Path,
    options: &ScanOptions,
    strategy: Strategy<'_>,
    settings: &RunSettings,
    reporter: &dyn ProgressReporter,
    mut confirm: C,
) -> CoreResult<DedupeReport>
where
    C: FnMut(&[ReconciliationAction]) -> bool,
{
    let root = check_root(root)?;
    let names = settings.names(&root);
    let outcome = scan(&root, options, reporter)?;
    tracing::info!(
        "Found {} duplicate groups ({} files) among {} scanned",
        outcome.stats.duplicate_groups,
        outcome.stats.duplicate_files,
        outcome.stats.scanned
    );

    let mut index_path = None;
    if !outcome.groups.is_empty() {
        let path = names.index_path();
        if settings.dry_run {
            tracing::info!("[DRY RUN] Would write duplicate index: {}", path.display());
        } else {
            write_index(&path, &outcome.groups)?;
            tracing::info!("Duplicate index written: {}", path.display());
            index_path = Some(path);
        }
    }

    let resolution = resolve(&outcome.groups, strategy);

    if !settings.dry_run
        && resolution.actions.iter().any(ReconciliationAction::is_destructive)
        && !confirm(&resolution.actions)
    {
        tracing::info!("Operation cancelled by user.");
        return Err(CoreError::Cancelled);
    }

    let mut run = apply(&root, &resolution.actions, settings)?;
    run.summary.record_scan(&outcome.stats);
    run.summary.failed += resolution.failures.len();
    let mut failures = outcome.failures.clone();
    failures.extend(resolution.failures);
    failures.append(&mut run.failures);
    run.failures = failures;

    Ok(DedupeReport {
        scan: outcome,
        index_path,
        kept: resolution.kept,
        run,
    })
}

/// Replays a rollback file, resolving its relative paths against the
/// directory that contains it.
///
/// # Errors
///
/// [`CoreError::NotFound`] or [`CoreError::Journal`] if the file cannot be
/// loaded; individual undo failures are reported, not returned.
pub fn rollback(journal_path: &Path, dry_run: bool) -> CoreResult<ReplayReport> {
    let journal_path = normalize_path(journal_path);
    let root = journal_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    let entries = Journal::load(&journal_path, &root)?;
    tracing::info!(
        "{}Replaying {} entries from {}",
        if dry_run { "[DRY RUN] " } else { "" },
        entries.len(),
        journal_path.display()
    );
    Ok(replay(&entries, dry_run))
}
