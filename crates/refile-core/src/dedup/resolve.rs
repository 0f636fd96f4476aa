//! Resolution policy: which members of a duplicate group survive.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::dedup::group::{Classification, DuplicateGroup};
use crate::error::{CoreError, CoreResult};
use crate::run::FailureReport;
use crate::txn::action::ReconciliationAction;

/// Supplies explicit per-group removals.
///
/// Implemented for any `FnMut(&DuplicateGroup) -> Vec<usize>` so a
/// non-interactive caller can pass a closure; an interactive frontend
/// implements it directly to prompt and re-prompt.
pub trait Selector {
    /// Returns the 1-based indices of the members to remove from `group`.
    ///
    /// `group_index` is the group's 0-based position in the scan.
    fn select(&mut self, group_index: usize, group: &DuplicateGroup) -> Vec<usize>;

    /// Called after `select` returned an out-of-range index. Returning
    /// `true` asks [`select`](Self::select) again; `false` skips the group.
    fn retry_on_invalid(&mut self, _group: &DuplicateGroup, _error: &CoreError) -> bool {
        false
    }
}

impl<F> Selector for F
where
    F: FnMut(&DuplicateGroup) -> Vec<usize>,
{
    fn select(&mut self, _group_index: usize, group: &DuplicateGroup) -> Vec<usize> {
        self(group)
    }
}

/// How groups are resolved.
pub enum Strategy<'a> {
    /// Keep the first discovered member, remove the rest.
    KeepFirst,
    /// Report only; produce no actions.
    Reject,
    Explicit(&'a mut dyn Selector),
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// One `Delete` per surplus member, in group then member order.
    pub actions: Vec<ReconciliationAction>,
    pub kept: Vec<PathBuf>,
    pub failures: Vec<FailureReport>,
}

/// Checks 1-based `indices` against a group of `len` members.
///
/// Returns the 0-based positions, deduplicated and sorted.
///
/// # Errors
///
/// [`CoreError::InvalidSelection`] for the first index outside `1..=len`.
pub fn validate_selection(indices: &[usize], len: usize) -> CoreResult<Vec<usize>> {
    let mut picked = BTreeSet::new();
    for &index in indices {
        if index == 0 || index > len {
            return Err(CoreError::InvalidSelection { index, len });
        }
        picked.insert(index - 1);
    }
    Ok(picked.into_iter().collect())
}

/// Turns duplicate groups into a deletion plan according to `strategy`.
pub fn resolve(groups: &[DuplicateGroup], strategy: Strategy<'_>) -> Resolution {
    let mut resolution = Resolution::default();

    match strategy {
        Strategy::Reject => {
            tracing::info!("reject mode: {} groups reported, no actions", groups.len());
            resolution.kept = groups
                .iter()
                .flat_map(|g| g.paths().map(PathBuf::from))
                .collect();
        }
        Strategy::KeepFirst => {
            for group in groups {
                push_group(&mut resolution, group, &(1..group.len()).collect::<Vec<_>>());
            }
        }
        Strategy::Explicit(selector) => {
            for (i, group) in groups.iter().enumerate() {
                match select_valid(selector, i, group) {
                    Ok(remove) => {
                        if !remove.is_empty() && remove.len() == group.len() {
                            tracing::warn!(
                                "every member of group {} selected; content survives only in the archive",
                                i + 1
                            );
                        }
                        push_group(&mut resolution, group, &remove);
                    }
                    Err(e) => {
                        tracing::warn!("skipping group {}: {e}", i + 1);
                        let path = group.paths().next().unwrap_or_else(|| Path::new(""));
                        resolution
                            .failures
                            .push(FailureReport::from_error("select", path, &e));
                        resolution.kept.extend(group.paths().map(PathBuf::from));
                    }
                }
            }
        }
    }

    resolution
}

fn select_valid(
    selector: &mut (dyn Selector + '_),
    group_index: usize,
    group: &DuplicateGroup,
) -> CoreResult<Vec<usize>> {
    loop {
        let indices = selector.select(group_index, group);
        match validate_selection(&indices, group.len()) {
            Ok(remove) => return Ok(remove),
            Err(e) => {
                if !selector.retry_on_invalid(group, &e) {
                    return Err(e);
                }
            }
        }
    }
}

fn push_group(resolution: &mut Resolution, group: &DuplicateGroup, remove: &[usize]) {
    let label = match group.classification {
        Classification::Numbered => "numbered copies",
        Classification::Suspect => "suspect duplicates",
    };
    tracing::debug!("{label}: {} members, removing {}", group.len(), remove.len());

    for (i, file) in group.files.iter().enumerate() {
        if remove.contains(&i) {
            resolution.actions.push(ReconciliationAction::Delete {
                path: file.path().to_path_buf(),
            });
        } else {
            resolution.kept.push(file.path().to_path_buf());
        }
    }
}
