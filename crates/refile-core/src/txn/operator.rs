//! Transactional file operator.
//!
//! Every primitive follows the same contract: attempt the mutation, and on
//! success append its inverse to the [`Journal`]. A dry run goes through the
//! same checks and logging but neither mutates nor journals anything.
//! Directories a primitive has to create along the way are created one level
//! at a time and each is journaled as `DELETE_DIR`, so a replay removes them
//! again.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::fs::ops;
use crate::run::{FailureReport, Summary};
use crate::txn::action::ReconciliationAction;
use crate::txn::archive::ArchivalSink;
use crate::txn::journal::{ensure_recordable, Journal, JournalEntry};

/// Everything an operator hands back when a run is over.
#[derive(Debug, Clone, Default)]
pub struct OperatorOutcome {
    /// One line per action attempted, in order.
    pub descriptions: Vec<String>,
    pub journal: Vec<JournalEntry>,
    pub journal_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    /// Set when at least one file went through the sink.
    pub quarantine_dir: Option<PathBuf>,
    pub failures: Vec<FailureReport>,
    pub summary: Summary,
}

/// Performs reconciliation actions and journals their inverses.
#[derive(Debug)]
pub struct FileOperator {
    dry_run: bool,
    journal: Journal,
    sink: Option<ArchivalSink>,
    descriptions: Vec<String>,
    failures: Vec<FailureReport>,
    summary: Summary,
    /// Directories a dry run has already counted as created.
    planned_dirs: HashSet<PathBuf>,
}

impl FileOperator {
    /// Without a sink, [`delete_file`](Self::delete_file) unlinks in place
    /// and journals a `CREATE` of an empty file.
    pub fn new(journal: Journal, sink: Option<ArchivalSink>, dry_run: bool) -> Self {
        Self {
            dry_run,
            journal,
            sink,
            descriptions: Vec::new(),
            failures: Vec::new(),
            summary: Summary::default(),
            planned_dirs: HashSet::new(),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn failures(&self) -> &[FailureReport] {
        &self.failures
    }

    /// Performs one planned action, turning an error into a failure report.
    ///
    /// Returns `true` on success. A failure never stops the batch.
    pub fn apply(&mut self, action: &ReconciliationAction) -> bool {
        self.descriptions.push(action.describe());

        // refuse before touching anything if the inverse could not be journaled
        let result = check_recordable(action).and_then(|()| match action {
            ReconciliationAction::Move { from, to } => self.move_file(from, to),
            ReconciliationAction::Delete { path } => self.delete_file(path),
            ReconciliationAction::CreateFile { path } => self.create_empty_file(path),
            ReconciliationAction::CreateDir { path } => self.create_directory(path),
            ReconciliationAction::RemoveDir { path } => self.remove_empty_directory(path),
        });

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to {action}: {e}");
                self.failures
                    .push(FailureReport::from_error(action.verb(), action.path(), &e));
                self.summary.failed += 1;
                false
            }
        }
    }

    /// Moves `src` to `dst`, creating `dst`'s parents as needed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if `src` is missing.
    /// - [`CoreError::AlreadyExists`] if `dst` is taken; nothing is overwritten.
    pub fn move_file(&mut self, src: &Path, dst: &Path) -> CoreResult<()> {
        fs::symlink_metadata(src).map_err(|e| CoreError::from_io(src, e))?;
        if fs::symlink_metadata(dst).is_ok() {
            return Err(CoreError::AlreadyExists(dst.to_path_buf()));
        }

        if self.dry_run {
            if let Some(parent) = dst.parent() {
                self.plan_dirs(parent);
            }
            tracing::info!("[DRY RUN] Would move: {} -> {}", src.display(), dst.display());
        } else {
            if let Some(parent) = dst.parent() {
                self.ensure_dirs(parent)?;
            }
            ops::move_path(src, dst)?;
            self.journal.record(JournalEntry::Move {
                from: dst.to_path_buf(),
                to: src.to_path_buf(),
            })?;
            tracing::info!("Moved: {} -> {}", src.display(), dst.display());
        }
        self.summary.moved += 1;
        Ok(())
    }

    /// Removes `path` from its location.
    ///
    /// With a sink the file is archived, then moved into quarantine and the
    /// journal records the move back. A missing file is only a warning.
    pub fn delete_file(&mut self, path: &Path) -> CoreResult<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("File not found (during deletion attempt): {}", path.display());
                return Ok(());
            }
            Err(e) => return Err(CoreError::from_io(path, e)),
        };
        if meta.is_dir() {
            return Err(CoreError::Io(std::io::Error::other(format!(
                "refusing to delete directory {}",
                path.display()
            ))));
        }

        let Some(sink) = self.sink.as_mut() else {
            return self.unlink(path);
        };
        let dest = sink.quarantine_destination(path);
        sink.archive(path)?;

        if self.dry_run {
            if let Some(parent) = dest.parent() {
                self.plan_dirs(parent);
            }
            tracing::info!(
                "[DRY RUN] Would archive and quarantine: {} -> {}",
                path.display(),
                dest.display()
            );
        } else {
            if let Some(parent) = dest.parent() {
                self.ensure_dirs(parent)?;
            }
            ops::move_path(path, &dest)?;
            self.journal.record(JournalEntry::Move {
                from: dest.clone(),
                to: path.to_path_buf(),
            })?;
            tracing::info!("Archived and quarantined: {} -> {}", path.display(), dest.display());
        }
        self.summary.deleted += 1;
        Ok(())
    }

    fn unlink(&mut self, path: &Path) -> CoreResult<()> {
        if self.dry_run {
            tracing::info!("[DRY RUN] Would delete: {}", path.display());
        } else {
            fs::remove_file(path).map_err(|e| CoreError::from_io(path, e))?;
            self.journal.record(JournalEntry::Create {
                path: path.to_path_buf(),
            })?;
            tracing::info!("Deleted: {}", path.display());
        }
        self.summary.deleted += 1;
        Ok(())
    }

    /// Creates a zero-length file, creating parents as needed.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyExists`] if something is already at `path`.
    pub fn create_empty_file(&mut self, path: &Path) -> CoreResult<()> {
        if fs::symlink_metadata(path).is_ok() {
            return Err(CoreError::AlreadyExists(path.to_path_buf()));
        }

        if self.dry_run {
            if let Some(parent) = path.parent() {
                self.plan_dirs(parent);
            }
            tracing::info!("[DRY RUN] Would create empty file: {}", path.display());
        } else {
            if let Some(parent) = path.parent() {
                self.ensure_dirs(parent)?;
            }
            ops::create_empty(path)?;
            self.journal.record(JournalEntry::Delete {
                path: path.to_path_buf(),
            })?;
            tracing::info!("Created empty file: {}", path.display());
        }
        self.summary.created += 1;
        Ok(())
    }

    /// Creates `path` and any missing parents. Existing directories are
    /// left alone and never journaled.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotADirectory`] if a non-directory occupies `path`.
    pub fn create_directory(&mut self, path: &Path) -> CoreResult<()> {
        match fs::metadata(path) {
            Ok(m) if m.is_dir() => {
                tracing::debug!("directory already exists: {}", path.display());
                return Ok(());
            }
            Ok(_) => return Err(CoreError::NotADirectory(path.to_path_buf())),
            Err(_) => {}
        }

        if self.dry_run {
            self.plan_dirs(path);
            Ok(())
        } else {
            self.ensure_dirs(path)
        }
    }

    /// Removes an empty directory and journals its re-creation.
    ///
    /// A dry run does not check emptiness, since earlier planned actions
    /// that would empty it were not performed.
    pub fn remove_empty_directory(&mut self, path: &Path) -> CoreResult<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Directory already gone: {}", path.display());
                return Ok(());
            }
            Err(e) => return Err(CoreError::from_io(path, e)),
        };
        if !meta.is_dir() {
            return Err(CoreError::NotADirectory(path.to_path_buf()));
        }

        if self.dry_run {
            tracing::info!("[DRY RUN] Would delete empty directory: {}", path.display());
        } else {
            ops::remove_empty_dir(path)?;
            self.journal.record(JournalEntry::CreateDir {
                path: path.to_path_buf(),
            })?;
            tracing::info!("Deleted empty directory: {}", path.display());
        }
        self.summary.removed_dirs += 1;
        Ok(())
    }

    fn ensure_dirs(&mut self, dir: &Path) -> CoreResult<()> {
        for missing in ops::missing_ancestors(dir) {
            fs::create_dir(&missing).map_err(|e| CoreError::from_io(&missing, e))?;
            self.journal.record(JournalEntry::DeleteDir {
                path: missing.clone(),
            })?;
            tracing::info!("Created directory: {}", missing.display());
            self.summary.created += 1;
        }
        Ok(())
    }

    /// Dry-run counterpart of `ensure_dirs`: counts each directory a real run
    /// would create, once per run.
    fn plan_dirs(&mut self, dir: &Path) {
        for missing in ops::missing_ancestors(dir) {
            if self.planned_dirs.insert(missing.clone()) {
                tracing::info!("[DRY RUN] Would create directory: {}", missing.display());
                self.summary.created += 1;
            }
        }
    }

    /// Finalizes the archive and the journal.
    ///
    /// Failures here are appended to the outcome rather than returned: the
    /// journal entries recorded so far are still valid.
    pub fn finish(mut self) -> OperatorOutcome {
        let journal_path = self.journal.path().map(Path::to_path_buf);
        let mut archive_path = None;
        let mut quarantine_dir = None;

        if let Some(sink) = self.sink.take() {
            self.summary.archived = sink.archived();
            if sink.archived() > 0 {
                quarantine_dir = Some(sink.quarantine_dir().to_path_buf());
                archive_path = Some(sink.archive_path().to_path_buf());
            }
            let path = sink.archive_path().to_path_buf();
            if let Err(e) = sink.finish() {
                tracing::error!("Failed to finalize archive {}: {e}", path.display());
                self.failures
                    .push(FailureReport::from_error("archive", &path, &e));
                self.summary.failed += 1;
            }
        }

        let journal = match self.journal.finish() {
            Ok(entries) => entries,
            Err(e) => {
                let path = journal_path.clone().unwrap_or_default();
                tracing::error!("Failed to finalize journal {}: {e}", path.display());
                self.failures
                    .push(FailureReport::from_error("journal", &path, &e));
                self.summary.failed += 1;
                Vec::new()
            }
        };

        OperatorOutcome {
            descriptions: self.descriptions,
            journal,
            journal_path,
            archive_path,
            quarantine_dir,
            failures: self.failures,
            summary: self.summary,
        }
    }
}

fn check_recordable(action: &ReconciliationAction) -> CoreResult<()> {
    if let ReconciliationAction::Move { from, to } = action {
        ensure_recordable(from)?;
        return ensure_recordable(to);
    }
    ensure_recordable(action.path())
}
