//! refile core library: duplicate detection and reversible tree reconciliation.
//!
//! `refile-core` finds byte-identical files, decides which copies survive,
//! and reshapes a directory tree to match a declared layout. Every mutation
//! is journaled as its inverse and every removed file is archived, so any
//! real run can be rolled back. It does no terminal I/O of its own; the
//! frontend (`refile-cli`) supplies progress reporting and prompts.
//!
//! # Modules
//!
//! - [`fs`]: Tree walking, size-bucketed duplicate scanning, streaming content fingerprints.
//! - [`dedup`]: Duplicate groups, numbered-copy classification, resolution strategies, scan reports.
//! - [`txn`]: Planned actions, the transactional file operator, the archival sink, the rollback journal.
//! - [`run`]: Run orchestration: artifact naming, [`apply`], [`dedupe`], [`rollback`].
//! - [`reconcile`]: Target-layout planning and reconciliation.
//! - [`config`]: Engine settings and target layouts (TOML).
//! - [`path`]: Path normalization used by every membership check.
//! - [`progress`]: Observable scan progress.
//! - [`error`]: Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod config;
pub mod dedup;
pub mod error;
pub mod fs;
pub mod path;
pub mod progress;
pub mod reconcile;
pub mod run;
pub mod txn;

pub use config::layout::{FileTarget, TargetLayout};
pub use config::settings::{Config, DepthLimit};
pub use dedup::{
    resolve, Classification, DuplicateGroup, DuplicateReport, Resolution, Selector, Strategy,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use fs::{scan, FileRecord, HashAlgorithm, ScanOptions, ScanOutcome, ScanStats};
pub use path::{nfc_string, normalize_path};
pub use progress::{ProgressReporter, SilentReporter};
pub use reconcile::{plan_layout, reconcile_to_layout, LayoutOptions};
pub use run::{
    apply, dedupe, rollback, ArtifactNames, DedupeReport, FailureReport, RunReport, RunSettings,
    RunStamp, Summary,
};
pub use txn::{JournalEntry, ReconciliationAction, ReplayReport};
