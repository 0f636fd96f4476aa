use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One planned filesystem mutation.
///
/// Plans are built up front (by [`resolve`](crate::dedup::resolve::resolve)
/// or [`plan_layout`](crate::reconcile::plan_layout)) and handed to a
/// [`FileOperator`](crate::txn::operator::FileOperator) unchanged, which is
/// what makes a dry run describe exactly what the real run performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationAction {
    Move { from: PathBuf, to: PathBuf },
    /// Archive then remove. Without an archival sink, a plain unlink.
    Delete { path: PathBuf },
    CreateFile { path: PathBuf },
    CreateDir { path: PathBuf },
    RemoveDir { path: PathBuf },
}

impl ReconciliationAction {
    /// Short lowercase verb used in failure reports.
    pub fn verb(&self) -> &'static str {
        match self {
            ReconciliationAction::Move { .. } => "move",
            ReconciliationAction::Delete { .. } => "delete",
            ReconciliationAction::CreateFile { .. } => "create",
            ReconciliationAction::CreateDir { .. } => "create_dir",
            ReconciliationAction::RemoveDir { .. } => "remove_dir",
        }
    }

    /// The path the action primarily affects (the source for a move).
    pub fn path(&self) -> &Path {
        match self {
            ReconciliationAction::Move { from, .. } => from,
            ReconciliationAction::Delete { path }
            | ReconciliationAction::CreateFile { path }
            | ReconciliationAction::CreateDir { path }
            | ReconciliationAction::RemoveDir { path } => path,
        }
    }

    /// Returns `true` for actions that remove or relocate existing content.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            ReconciliationAction::Move { .. }
                | ReconciliationAction::Delete { .. }
                | ReconciliationAction::RemoveDir { .. }
        )
    }

    /// Human-readable one-line description.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationAction::Move { from, to } => {
                write!(f, "move {} -> {}", from.display(), to.display())
            }
            ReconciliationAction::Delete { path } => write!(f, "delete {}", path.display()),
            ReconciliationAction::CreateFile { path } => {
                write!(f, "create empty file {}", path.display())
            }
            ReconciliationAction::CreateDir { path } => {
                write!(f, "create directory {}", path.display())
            }
            ReconciliationAction::RemoveDir { path } => {
                write!(f, "remove empty directory {}", path.display())
            }
        }
    }
}
