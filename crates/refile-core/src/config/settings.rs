//! Engine configuration loaded from a TOML file.
//!
//! Every section is optional; an empty file (or no file at all) yields the
//! defaults documented on each field.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fs::hash::{HashAlgorithm, DEFAULT_BLOCK_SIZE};

/// Top-level engine configuration.
///
/// All fields have sensible defaults so the engine works without a config
/// file. Call [`Config::load`] to read from a TOML path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub hash: HashConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::Config`] if the TOML is malformed or a value is out of range.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::from_io(path, e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that deserialize fine but cannot drive a run.
    pub fn validate(&self) -> CoreResult<()> {
        if self.hash.block_size == 0 {
            return Err(CoreError::Config("hash.block_size must be > 0".to_string()));
        }
        let a = &self.artifacts;
        for (key, value) in [
            ("quarantine_prefix", &a.quarantine_prefix),
            ("archive_prefix", &a.archive_prefix),
            ("journal_prefix", &a.journal_prefix),
            ("index_prefix", &a.index_prefix),
            ("log_file", &a.log_file),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) {
                return Err(CoreError::Config(format!(
                    "artifacts.{key} must be a non-empty file name, got {value:?}"
                )));
            }
        }
        Ok(())
    }
}

/// How far below the root a scan descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDepth", into = "RawDepth")]
pub enum DepthLimit {
    /// Files whose directory is at most this many levels below the root.
    /// The root and its immediate subdirectories both count as level 0, so
    /// `Levels(n)` reaches files `n + 1` directories down.
    Levels(usize),
    Unbounded,
}

impl Default for DepthLimit {
    fn default() -> Self {
        DepthLimit::Levels(3)
    }
}

impl fmt::Display for DepthLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepthLimit::Levels(n) => write!(f, "{n}"),
            DepthLimit::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl FromStr for DepthLimit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(DepthLimit::Unbounded);
        }
        s.parse::<usize>().map(DepthLimit::Levels).map_err(|_| {
            CoreError::Config(format!(
                "invalid depth {s:?}: expected a number or \"unbounded\""
            ))
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawDepth {
    Levels(usize),
    Keyword(String),
}

impl TryFrom<RawDepth> for DepthLimit {
    type Error = CoreError;

    fn try_from(raw: RawDepth) -> Result<Self, Self::Error> {
        match raw {
            RawDepth::Levels(n) => Ok(DepthLimit::Levels(n)),
            RawDepth::Keyword(s) => s.parse(),
        }
    }
}

impl From<DepthLimit> for RawDepth {
    fn from(depth: DepthLimit) -> Self {
        match depth {
            DepthLimit::Levels(n) => RawDepth::Levels(n),
            DepthLimit::Unbounded => RawDepth::Keyword("unbounded".to_string()),
        }
    }
}

/// Tree-walk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub max_depth: DepthLimit,
    #[serde(default = "default_true")]
    pub include_hidden: bool,
    /// Directory names that are never entered.
    #[serde(default)]
    pub excluded_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: DepthLimit::default(),
            include_hidden: true,
            excluded_dirs: Vec::new(),
        }
    }
}

/// Fingerprint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    #[serde(default)]
    pub algorithm: HashAlgorithm,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Names of the files and directories a run leaves in its root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_quarantine_prefix")]
    pub quarantine_prefix: String,
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,
    #[serde(default = "default_journal_prefix")]
    pub journal_prefix: String,
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            quarantine_prefix: default_quarantine_prefix(),
            archive_prefix: default_archive_prefix(),
            journal_prefix: default_journal_prefix(),
            index_prefix: default_index_prefix(),
            log_file: default_log_file(),
        }
    }
}

impl ArtifactConfig {
    /// Returns `true` if `name` looks like something a run wrote into its root.
    pub fn is_artifact_name(&self, name: &str) -> bool {
        name == self.log_file
            || name.starts_with(&self.quarantine_prefix)
            || (name.starts_with(&self.archive_prefix) && name.ends_with(".tar.gz"))
            || (name.starts_with(&self.journal_prefix) && name.ends_with(".csv"))
            || (name.starts_with(&self.index_prefix) && name.ends_with(".txt"))
    }
}

/// Target-layout pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Archive and delete every file the layout does not declare.
    #[serde(default)]
    pub remove_unlisted: bool,
    #[serde(default = "default_true")]
    pub prune_empty_dirs: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            remove_unlisted: false,
            prune_empty_dirs: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Ask before any real (non-dry-run) destructive batch.
    #[serde(default = "default_true")]
    pub confirm_destructive: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            confirm_destructive: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_quarantine_prefix() -> String {
    "duplicates_pending_deletion".to_string()
}

fn default_archive_prefix() -> String {
    "duplicate_backup".to_string()
}

fn default_journal_prefix() -> String {
    "rollback_log".to_string()
}

fn default_index_prefix() -> String {
    "duplicate_index".to_string()
}

fn default_log_file() -> String {
    "reconcile_log.txt".to_string()
}
