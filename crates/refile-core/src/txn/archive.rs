//! Archival sink for removed files.
//!
//! "Delete" never means unlink in place. Each removed file is first appended
//! to a gzip-compressed tar archive in the run root (under its path relative
//! to the root) and then moved into a quarantine directory, so a single
//! run can never lose content.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{CoreError, CoreResult};
use crate::path::relative_to;

type ArchiveBuilder = tar::Builder<GzEncoder<BufWriter<File>>>;

/// Quarantine directory plus compressed archive for one run.
pub struct ArchivalSink {
    root: PathBuf,
    quarantine_dir: PathBuf,
    archive_path: PathBuf,
    dry_run: bool,
    builder: Option<ArchiveBuilder>,
    reserved: HashSet<PathBuf>,
    archived: usize,
}

impl std::fmt::Debug for ArchivalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivalSink")
            .field("quarantine_dir", &self.quarantine_dir)
            .field("archive_path", &self.archive_path)
            .field("dry_run", &self.dry_run)
            .field("archived", &self.archived)
            .finish()
    }
}

impl ArchivalSink {
    /// Nothing is created until the first file is archived.
    pub fn new(root: &Path, quarantine_dir: PathBuf, archive_path: PathBuf, dry_run: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            quarantine_dir,
            archive_path,
            dry_run,
            builder: None,
            reserved: HashSet::new(),
            archived: 0,
        }
    }

    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Number of files appended to the archive (or that would be, in a dry run).
    pub fn archived(&self) -> usize {
        self.archived
    }

    /// Picks and reserves a free name for `original` inside the quarantine
    /// directory.
    ///
    /// The bare file name is tried first, then `stem_1.ext`, `stem_2.ext`,
    /// and so on. Names handed out earlier in this run count as taken even
    /// if nothing has been written yet, so a dry run sees the same names as
    /// the real one.
    pub fn quarantine_destination(&mut self, original: &Path) -> PathBuf {
        let file_name = original
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| OsString::from("unnamed"));

        let mut candidate = self.quarantine_dir.join(&file_name);
        let mut counter = 1;
        while self.reserved.contains(&candidate) || std::fs::symlink_metadata(&candidate).is_ok() {
            candidate = self.quarantine_dir.join(numbered_name(&file_name, counter));
            counter += 1;
        }
        self.reserved.insert(candidate.clone());
        candidate
    }

    /// Appends `original` to the archive under its root-relative name.
    ///
    /// Opens the archive on first use. A dry run only counts the file.
    pub fn archive(&mut self, original: &Path) -> CoreResult<()> {
        if self.dry_run {
            self.archived += 1;
            return Ok(());
        }
        let entry_name = relative_to(original, &self.root);
        let mut source = File::open(original).map_err(|e| CoreError::from_io(original, e))?;

        let builder = match self.builder.take() {
            Some(b) => b,
            None => {
                let file = File::create(&self.archive_path)
                    .map_err(|e| CoreError::from_io(&self.archive_path, e))?;
                tracing::info!("Opened archive {}", self.archive_path.display());
                let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
                tar::Builder::new(encoder)
            }
        };
        let builder = self.builder.insert(builder);
        builder.append_file(&entry_name, &mut source)?;
        self.archived += 1;
        Ok(())
    }

    /// Finalizes the archive. Returns its path if anything was written.
    pub fn finish(mut self) -> CoreResult<Option<PathBuf>> {
        match self.builder.take() {
            Some(builder) => {
                let encoder = builder.into_inner()?;
                let mut writer = encoder.finish()?;
                std::io::Write::flush(&mut writer)?;
                Ok(Some(self.archive_path))
            }
            None => Ok(None),
        }
    }
}

/// `stem_N.ext` for `stem.ext`. Leading-dot names (`.env`) have no
/// extension. Works on the raw name, so bytes that are not valid UTF-8 are
/// carried over unchanged.
fn numbered_name(name: &OsStr, counter: usize) -> OsString {
    let path = Path::new(name);
    let mut out = path.file_stem().unwrap_or(name).to_os_string();
    out.push(format!("_{counter}"));
    if let Some(ext) = path.extension() {
        out.push(".");
        out.push(ext);
    }
    out
}
