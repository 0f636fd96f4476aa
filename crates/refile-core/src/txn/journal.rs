//! Rollback journal.
//!
//! Every mutation a run performs is recorded as its inverse, in the order
//! performed. On disk the journal is a CSV file with the header
//! `action,path1,path2`:
//!
//! | action       | meaning                                   |
//! |--------------|-------------------------------------------|
//! | `MOVE`       | move `path1` back to `path2`              |
//! | `DELETE`     | delete file `path1`                       |
//! | `CREATE`     | recreate `path1` as an empty file         |
//! | `CREATE_DIR` | recreate directory `path1`                |
//! | `DELETE_DIR` | remove directory `path1` if it is empty   |
//!
//! Paths inside the run root are written relative to it. The file is flushed
//! after every row, so a killed process leaves a journal that is truncated
//! but valid, and replaying it undoes everything it recorded.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::ByteRecord;

use crate::error::{CoreError, CoreResult};
use crate::fs::ops;
use crate::path::{path_bytes, path_from_bytes, relative_to};
use crate::run::FailureReport;

/// The inverse of one performed action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JournalEntry {
    /// Undo by moving `from` back to `to`.
    Move { from: PathBuf, to: PathBuf },
    Delete { path: PathBuf },
    Create { path: PathBuf },
    CreateDir { path: PathBuf },
    DeleteDir { path: PathBuf },
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalEntry::Move { from, to } => {
                write!(f, "MOVE {} -> {}", from.display(), to.display())
            }
            JournalEntry::Delete { path } => write!(f, "DELETE {}", path.display()),
            JournalEntry::Create { path } => write!(f, "CREATE {}", path.display()),
            JournalEntry::CreateDir { path } => write!(f, "CREATE_DIR {}", path.display()),
            JournalEntry::DeleteDir { path } => write!(f, "DELETE_DIR {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JournalAction {
    Move,
    Delete,
    Create,
    CreateDir,
    DeleteDir,
}

impl JournalAction {
    fn as_str(self) -> &'static str {
        match self {
            JournalAction::Move => "MOVE",
            JournalAction::Delete => "DELETE",
            JournalAction::Create => "CREATE",
            JournalAction::CreateDir => "CREATE_DIR",
            JournalAction::DeleteDir => "DELETE_DIR",
        }
    }

    fn parse(field: &[u8]) -> Option<Self> {
        Some(match field {
            b"MOVE" => JournalAction::Move,
            b"DELETE" => JournalAction::Delete,
            b"CREATE" => JournalAction::Create,
            b"CREATE_DIR" => JournalAction::CreateDir,
            b"DELETE_DIR" => JournalAction::DeleteDir,
            _ => return None,
        })
    }
}

/// Renders one entry as a CSV record. Paths are written as raw bytes so
/// names that are not valid UTF-8 survive the round trip unchanged.
fn encode_row(entry: &JournalEntry, root: &Path) -> CoreResult<ByteRecord> {
    let (action, path1, path2) = match entry {
        JournalEntry::Move { from, to } => (JournalAction::Move, from, Some(to)),
        JournalEntry::Delete { path } => (JournalAction::Delete, path, None),
        JournalEntry::Create { path } => (JournalAction::Create, path, None),
        JournalEntry::CreateDir { path } => (JournalAction::CreateDir, path, None),
        JournalEntry::DeleteDir { path } => (JournalAction::DeleteDir, path, None),
    };

    let mut record = ByteRecord::new();
    record.push_field(action.as_str().as_bytes());
    for path in std::iter::once(path1).chain(path2) {
        ensure_recordable(path)?;
        let rel = relative_to(path, root);
        record.push_field(path_bytes(&rel).unwrap_or_default());
    }
    if path2.is_none() {
        record.push_field(b"");
    }
    Ok(record)
}

fn decode_row(record: &ByteRecord, root: &Path, line: usize) -> CoreResult<JournalEntry> {
    let field = |i: usize| record.get(i).unwrap_or_default();
    let action = JournalAction::parse(field(0)).ok_or_else(|| {
        CoreError::Journal(format!(
            "line {line}: unknown action {:?}",
            String::from_utf8_lossy(field(0))
        ))
    })?;
    let resolve = |bytes: &[u8]| {
        path_from_bytes(bytes)
            .map(|p| root.join(p))
            .ok_or_else(|| CoreError::Journal(format!("line {line}: path is not valid Unicode")))
    };

    if field(1).is_empty() {
        return Err(CoreError::Journal(format!("line {line}: path1 is empty")));
    }
    let path = resolve(field(1))?;
    Ok(match action {
        JournalAction::Move => {
            if field(2).is_empty() {
                return Err(CoreError::Journal(format!(
                    "line {line}: MOVE needs a destination in path2"
                )));
            }
            JournalEntry::Move {
                from: path,
                to: resolve(field(2))?,
            }
        }
        JournalAction::Delete => JournalEntry::Delete { path },
        JournalAction::Create => JournalEntry::Create { path },
        JournalAction::CreateDir => JournalEntry::CreateDir { path },
        JournalAction::DeleteDir => JournalEntry::DeleteDir { path },
    })
}

/// Fails for a path this platform cannot store in a journal. Only paths that
/// are not valid Unicode on a non-unix system are refused.
pub(crate) fn ensure_recordable(path: &Path) -> CoreResult<()> {
    match path_bytes(path) {
        Some(_) => Ok(()),
        None => Err(CoreError::Journal(format!(
            "cannot record non-Unicode path {}",
            path.display()
        ))),
    }
}

/// Append-only record of inverse actions for one run.
///
/// Owned by the [`FileOperator`](crate::txn::operator::FileOperator) for the
/// duration of a run and handed back to the caller by [`Journal::finish`].
pub struct Journal {
    root: PathBuf,
    entries: Vec<JournalEntry>,
    writer: Option<csv::Writer<File>>,
    path: Option<PathBuf>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("root", &self.root)
            .field("entries", &self.entries.len())
            .field("path", &self.path)
            .finish()
    }
}

impl Journal {
    /// A journal that is never written to disk (dry runs and tests).
    pub fn in_memory(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            entries: Vec::new(),
            writer: None,
            path: None,
        }
    }

    /// Creates the rollback file at `path` and writes its header.
    ///
    /// # Errors
    ///
    /// Any failure to create or write the file. A real run must not start
    /// mutating without a journal, so callers treat this as fatal.
    pub fn create(path: &Path, root: &Path) -> CoreResult<Self> {
        let file = File::create(path).map_err(|e| CoreError::from_io(path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(["action", "path1", "path2"])
            .map_err(|e| CoreError::Journal(e.to_string()))?;
        writer.flush()?;
        tracing::debug!("rollback journal opened at {}", path.display());
        Ok(Self {
            root: root.to_path_buf(),
            entries: Vec::new(),
            writer: Some(writer),
            path: Some(path.to_path_buf()),
        })
    }

    /// Appends `entry` and flushes it to disk.
    pub fn record(&mut self, entry: JournalEntry) -> CoreResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            let record = encode_row(&entry, &self.root)?;
            writer
                .write_byte_record(&record)
                .map_err(|e| CoreError::Journal(e.to_string()))?;
            writer.flush()?;
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Location of the rollback file, if this journal has one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flushes and closes the file, returning the recorded entries.
    pub fn finish(mut self) -> CoreResult<Vec<JournalEntry>> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(self.entries)
    }

    /// Parses a rollback file. Relative paths are resolved against `root`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::Journal`] for an unknown action or a malformed row.
    pub fn load(path: &Path, root: &Path) -> CoreResult<Vec<JournalEntry>> {
        let file = File::open(path).map_err(|e| CoreError::from_io(path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let mut entries = Vec::new();
        for (i, record) in reader.byte_records().enumerate() {
            // header is line 1
            let line = i + 2;
            let record = record.map_err(|e| CoreError::Journal(format!("line {line}: {e}")))?;
            entries.push(decode_row(&record, root, line)?);
        }
        Ok(entries)
    }
}

/// Outcome of [`replay`].
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// One line per entry, newest first.
    pub descriptions: Vec<String>,
    pub undone: usize,
    pub skipped: usize,
    pub failures: Vec<FailureReport>,
}

/// Undoes `entries` in reverse chronological order.
///
/// A failing entry is reported and the replay continues with the next one.
/// With `dry_run` nothing is touched; only descriptions are produced.
pub fn replay(entries: &[JournalEntry], dry_run: bool) -> ReplayReport {
    let mut report = ReplayReport::default();

    for entry in entries.iter().rev() {
        report.descriptions.push(entry.to_string());
        if dry_run {
            tracing::info!("[DRY RUN] Would undo: {entry}");
            continue;
        }
        match undo(entry) {
            Ok(true) => {
                tracing::info!("Undone: {entry}");
                report.undone += 1;
            }
            Ok(false) => report.skipped += 1,
            Err(e) => {
                tracing::error!("Failed to undo {entry}: {e}");
                let (verb, path) = match entry {
                    JournalEntry::Move { from, .. } => ("undo_move", from),
                    JournalEntry::Delete { path } => ("undo_delete", path),
                    JournalEntry::Create { path } => ("undo_create", path),
                    JournalEntry::CreateDir { path } => ("undo_create_dir", path),
                    JournalEntry::DeleteDir { path } => ("undo_delete_dir", path),
                };
                report.failures.push(FailureReport::from_error(verb, path, &e));
            }
        }
    }

    report
}

/// Returns `Ok(false)` when the entry was already satisfied.
fn undo(entry: &JournalEntry) -> CoreResult<bool> {
    match entry {
        JournalEntry::Move { from, to } => {
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::from_io(parent, e))?;
            }
            ops::move_path(from, to)?;
            Ok(true)
        }
        JournalEntry::Delete { path } => match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("already gone: {}", path.display());
                Ok(false)
            }
            Err(e) => Err(CoreError::from_io(path, e)),
        },
        JournalEntry::Create { path } => {
            if std::fs::symlink_metadata(path).is_ok() {
                tracing::warn!("already present, not recreating: {}", path.display());
                return Ok(false);
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::from_io(parent, e))?;
            }
            ops::create_empty(path)?;
            Ok(true)
        }
        JournalEntry::CreateDir { path } => {
            if path.is_dir() {
                return Ok(false);
            }
            std::fs::create_dir_all(path).map_err(|e| CoreError::from_io(path, e))?;
            Ok(true)
        }
        JournalEntry::DeleteDir { path } => {
            if std::fs::symlink_metadata(path).is_err() {
                return Ok(false);
            }
            ops::remove_empty_dir(path)?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn create_writes_header_immediately() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rollback_log.csv");

        let journal = Journal::create(&path, tmp.path()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "action,path1,path2\n");
        assert_eq!(journal.path(), Some(path.as_path()));
    }

    #[test]
    fn rows_are_flushed_relative_to_root() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rollback_log.csv");
        let mut journal = Journal::create(&path, tmp.path()).unwrap();

        journal
            .record(JournalEntry::Move {
                from: tmp.path().join("q/a.txt"),
                to: tmp.path().join("a.txt"),
            })
            .unwrap();
        journal
            .record(JournalEntry::DeleteDir {
                path: tmp.path().join("q"),
            })
            .unwrap();

        // visible before finish
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "action,path1,path2\nMOVE,q/a.txt,a.txt\nDELETE_DIR,q,\n"
        );
        assert_eq!(journal.finish().unwrap().len(), 2);
    }

    #[test]
    fn load_round_trips_written_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rollback_log.csv");
        let entries = vec![
            JournalEntry::CreateDir {
                path: tmp.path().join("old"),
            },
            JournalEntry::Create {
                path: tmp.path().join("a b, c.txt"),
            },
            JournalEntry::Delete {
                path: tmp.path().join("src/core/processor.py"),
            },
        ];
        let mut journal = Journal::create(&path, tmp.path()).unwrap();
        for entry in &entries {
            journal.record(entry.clone()).unwrap();
        }
        journal.finish().unwrap();

        let loaded = Journal::load(&path, tmp.path()).unwrap();

        assert_eq!(loaded, entries);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_round_trip_exactly() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rollback_log.csv");
        let entry = JournalEntry::Move {
            from: tmp.path().join("q").join(OsStr::from_bytes(b"b\xff.txt")),
            to: tmp.path().join(OsStr::from_bytes(b"b\xff.txt")),
        };
        let mut journal = Journal::create(&path, tmp.path()).unwrap();
        journal.record(entry.clone()).unwrap();
        journal.finish().unwrap();

        let raw = fs::read(&path).unwrap();
        assert!(raw.ends_with(b"MOVE,q/b\xff.txt,b\xff.txt\n"));
        assert_eq!(Journal::load(&path, tmp.path()).unwrap(), vec![entry]);
    }

    #[test]
    fn load_accepts_rows_without_path2() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rollback_log.csv");
        fs::write(&path, "action,path1,path2\nDELETE,x.txt\nCREATE_DIR,d,\n").unwrap();

        let loaded = Journal::load(&path, tmp.path()).unwrap();

        assert_eq!(
            loaded,
            vec![
                JournalEntry::Delete {
                    path: tmp.path().join("x.txt")
                },
                JournalEntry::CreateDir {
                    path: tmp.path().join("d")
                },
            ]
        );
    }

    #[test]
    fn load_rejects_unknown_action() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rollback_log.csv");
        fs::write(&path, "action,path1,path2\nCOPY,a,b\n").unwrap();

        let err = Journal::load(&path, tmp.path()).unwrap_err();
        assert!(matches!(err, CoreError::Journal(msg) if msg.contains("line 2")));
    }

    #[test]
    fn load_rejects_move_without_destination() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rollback_log.csv");
        fs::write(&path, "action,path1,path2\nMOVE,a,\n").unwrap();

        assert!(matches!(
            Journal::load(&path, tmp.path()).unwrap_err(),
            CoreError::Journal(_)
        ));
    }

    #[test]
    fn replay_runs_newest_first() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        // forward: created dir `new`, then moved a.txt into it
        fs::create_dir(root.join("new")).unwrap();
        fs::write(root.join("new/a.txt"), "content").unwrap();
        let entries = vec![
            JournalEntry::DeleteDir {
                path: root.join("new"),
            },
            JournalEntry::Move {
                from: root.join("new/a.txt"),
                to: root.join("a.txt"),
            },
        ];

        let report = replay(&entries, false);

        assert!(report.failures.is_empty());
        assert_eq!(report.undone, 2);
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "content");
        assert!(!root.join("new").exists());
        assert!(report.descriptions[0].starts_with("MOVE"));
    }

    #[test]
    fn replay_dry_run_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("created.txt");
        fs::write(&file, "").unwrap();

        let report = replay(&[JournalEntry::Delete { path: file.clone() }], true);

        assert!(file.exists());
        assert_eq!(report.descriptions.len(), 1);
        assert_eq!(report.undone, 0);
    }

    #[test]
    fn replay_continues_past_failures() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("occupied.txt"), "x").unwrap();
        fs::write(root.join("from.txt"), "y").unwrap();
        let entries = vec![
            JournalEntry::Create {
                path: root.join("restored.txt"),
            },
            JournalEntry::Move {
                from: root.join("from.txt"),
                to: root.join("occupied.txt"),
            },
        ];

        let report = replay(&entries, false);

        assert_eq!(report.failures.len(), 1);
        assert!(root.join("restored.txt").exists());
        assert_eq!(fs::read_to_string(root.join("occupied.txt")).unwrap(), "x");
    }

    #[test]
    fn replay_leaves_non_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("d");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("keep.txt"), "x").unwrap();

        let report = replay(&[JournalEntry::DeleteDir { path: dir.clone() }], false);

        assert_eq!(report.failures.len(), 1);
        assert!(dir.join("keep.txt").exists());
    }
}
