//! Target-layout reconciliation.
//!
//! Brings a tree in line with a [`TargetLayout`]: every declared file ends up
//! at its one canonical path, stray copies of declared files are archived,
//! and directories the layout does not expect are pruned once empty. The
//! whole plan is computed from a single snapshot taken before anything moves,
//! so a dry run lists exactly what the real run performs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::layout::TargetLayout;
use crate::config::settings::Config;
use crate::dedup::classify::discovery_order;
use crate::error::{CoreError, CoreResult};
use crate::path::{nfc_string, normalize_path};
use crate::run::{apply, check_root, ArtifactNames, RunReport, RunSettings};
use crate::txn::action::ReconciliationAction;

/// What a layout pass may touch beyond placing declared files.
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Archive and delete every file the layout does not declare.
    pub remove_unlisted: bool,
    pub prune_empty_dirs: bool,
    /// Directory names never entered. Their contents stay where they are.
    pub excluded_dirs: Vec<String>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            remove_unlisted: false,
            prune_empty_dirs: true,
            excluded_dirs: Vec::new(),
        }
    }
}

impl From<&Config> for LayoutOptions {
    fn from(config: &Config) -> Self {
        Self {
            remove_unlisted: config.layout.remove_unlisted,
            prune_empty_dirs: config.layout.prune_empty_dirs,
            excluded_dirs: config.scan.excluded_dirs.clone(),
        }
    }
}

#[derive(Debug)]
struct Seen {
    normalized: PathBuf,
    on_disk: PathBuf,
}

#[derive(Debug, Default)]
struct Snapshot {
    /// Regular files in discovery order.
    files: Vec<Seen>,
    dirs: Vec<Seen>,
    /// Entries the pass never touches; they keep their directories alive.
    occupants: Vec<PathBuf>,
}

fn snapshot(root: &Path, options: &LayoutOptions, names: &ArtifactNames) -> Snapshot {
    let mut snap = Snapshot::default();
    let mut skipped = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| discovery_order(a.file_name(), b.file_name()));
    let entries = walker.into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        let excluded = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| options.excluded_dirs.iter().any(|d| d == name));
        let skip = (entry.depth() == 1 && names.is_artifact(entry.path())) || excluded;
        if skip {
            skipped.push(normalize_path(entry.path()));
        }
        !skip
    });

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                if let Some(path) = e.path() {
                    snap.occupants.push(normalize_path(path));
                }
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let normalized = normalize_path(entry.path());
        let file_type = entry.file_type();
        if file_type.is_dir() {
            snap.dirs.push(Seen {
                normalized,
                on_disk: entry.into_path(),
            });
        } else if file_type.is_file() {
            snap.files.push(Seen {
                normalized,
                on_disk: entry.into_path(),
            });
        } else {
            snap.occupants.push(normalized);
        }
    }

    snap.occupants.extend(skipped);
    snap
}

/// Computes the actions that make `root` match `layout`.
///
/// In order: `CreateDir` for each missing expected directory; one placement
/// per declared file (keep the canonical instance, move the first unclaimed
/// instance found elsewhere, or create an empty placeholder); `Delete` for
/// every other instance of a declared name; with
/// [`remove_unlisted`](LayoutOptions::remove_unlisted), `Delete` for every
/// undeclared file; with [`prune_empty_dirs`](LayoutOptions::prune_empty_dirs),
/// `RemoveDir` for every unexpected directory the plan leaves empty, deepest
/// first. Run artifacts in the root are never part of a plan.
///
/// # Errors
///
/// [`CoreError::Config`] for an invalid layout, or any error from checking
/// the root. Nothing is touched either way.
pub fn plan_layout(
    root: &Path,
    layout: &TargetLayout,
    options: &LayoutOptions,
    names: &ArtifactNames,
) -> CoreResult<Vec<ReconciliationAction>> {
    layout.validate()?;
    let root = check_root(root)?;
    let expected = layout.expected_directory_paths(&root);
    let targets = layout.defined_file_targets(&root);
    let snap = snapshot(&root, options, names);

    let canonical: HashSet<&Path> = targets.iter().map(|t| t.canonical.as_path()).collect();
    let present: HashSet<&Path> = snap
        .dirs
        .iter()
        .map(|d| d.normalized.as_path())
        .chain(snap.occupants.iter().map(PathBuf::as_path))
        .collect();

    let mut by_name: HashMap<String, Vec<&Seen>> = HashMap::new();
    for file in &snap.files {
        // layout names are Unicode, so other names can never be declared
        if let Some(name) = file.normalized.file_name().and_then(|n| n.to_str()) {
            by_name.entry(name.to_owned()).or_default().push(file);
        }
    }

    let mut actions = Vec::new();
    for dir in &expected {
        if *dir != root && !present.contains(dir.as_path()) {
            actions.push(ReconciliationAction::CreateDir { path: dir.clone() });
        }
    }

    // instances leaving their current location
    let mut claimed: HashSet<&Path> = HashSet::new();
    let mut removed: HashSet<&Path> = HashSet::new();
    // locations filled by a move or a placeholder
    let mut placed: Vec<&Path> = Vec::new();

    for target in &targets {
        let instances = by_name
            .get(&nfc_string(&target.name))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if instances.iter().any(|f| f.normalized == target.canonical) {
            tracing::debug!("already in place: {}", target.canonical.display());
            continue;
        }

        let free = instances.iter().find(|f| {
            !claimed.contains(f.normalized.as_path()) && !canonical.contains(f.normalized.as_path())
        });
        match free {
            Some(found) => {
                claimed.insert(found.normalized.as_path());
                actions.push(ReconciliationAction::Move {
                    from: found.on_disk.clone(),
                    to: target.canonical.clone(),
                });
            }
            None => {
                tracing::warn!(
                    "No instance of {} found; an empty placeholder will be created at {}",
                    target.name,
                    target.canonical.display()
                );
                actions.push(ReconciliationAction::CreateFile {
                    path: target.canonical.clone(),
                });
            }
        }
        placed.push(target.canonical.as_path());
    }

    let mut handled = HashSet::new();
    for target in &targets {
        let name = nfc_string(&target.name);
        let Some(instances) = by_name.get(&name) else {
            continue;
        };
        if !handled.insert(name) {
            continue;
        }
        for found in instances {
            let path = found.normalized.as_path();
            if claimed.contains(path) || canonical.contains(path) {
                continue;
            }
            tracing::info!("Redundant copy of {}: {}", target.name, found.on_disk.display());
            removed.insert(path);
            actions.push(ReconciliationAction::Delete {
                path: found.on_disk.clone(),
            });
        }
    }

    if options.remove_unlisted {
        for file in &snap.files {
            let path = file.normalized.as_path();
            if canonical.contains(path) || claimed.contains(path) || removed.contains(path) {
                continue;
            }
            removed.insert(path);
            actions.push(ReconciliationAction::Delete {
                path: file.on_disk.clone(),
            });
        }
    }

    if options.prune_empty_dirs {
        let survivors: Vec<&Path> = snap
            .files
            .iter()
            .map(|f| f.normalized.as_path())
            .filter(|p| !claimed.contains(p) && !removed.contains(p))
            .chain(placed.iter().copied())
            .chain(snap.occupants.iter().map(PathBuf::as_path))
            .collect();

        let mut empty: Vec<&Seen> = snap
            .dirs
            .iter()
            .filter(|d| !expected.contains(&d.normalized))
            .filter(|d| !survivors.iter().any(|p| p.starts_with(&d.normalized)))
            .collect();
        empty.sort_by(|a, b| {
            let (a, b) = (&a.normalized, &b.normalized);
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| b.cmp(a))
        });
        actions.extend(empty.into_iter().map(|d| ReconciliationAction::RemoveDir {
            path: d.on_disk.clone(),
        }));
    }

    tracing::info!("Planned {} actions for {}", actions.len(), root.display());
    Ok(actions)
}

/// Plans `layout` against `root` and applies it.
///
/// Before a real plan containing moves, deletions or directory removals,
/// `confirm` is shown the plan; declining returns [`CoreError::Cancelled`]
/// with the tree untouched.
pub fn reconcile_to_layout<C>(
    root: &Path,
    layout: &TargetLayout,
    options: &LayoutOptions,
    settings: &RunSettings,
    mut confirm: C,
) -> CoreResult<RunReport>
where
    C: FnMut(&[ReconciliationAction]) -> bool,
{
    let names = settings.names(root);
    let actions = plan_layout(root, layout, options, &names)?;

    if !settings.dry_run
        && actions.iter().any(ReconciliationAction::is_destructive)
        && !confirm(&actions)
    {
        tracing::info!("Operation cancelled by user.");
        return Err(CoreError::Cancelled);
    }

    apply(root, &actions, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::ArtifactConfig;
    use crate::fs::hash::{fingerprint, HashAlgorithm};
    use crate::run::{rollback, RunStamp};
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    const PROCESSOR_LAYOUT: &str = r#"
[src]
core = ["processor.py"]
"#;

    fn settings(dry_run: bool) -> RunSettings {
        RunSettings {
            dry_run,
            stamp: RunStamp::new("20240102_030405"),
            ..RunSettings::default()
        }
    }

    fn names(root: &Path) -> ArtifactNames {
        ArtifactNames::new(root, RunStamp::new("20240102_030405"), ArtifactConfig::default())
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn plan(root: &Path, layout: &str, options: &LayoutOptions) -> Vec<ReconciliationAction> {
        let layout = TargetLayout::from_toml_str(layout).unwrap();
        plan_layout(root, &layout, options, &names(root)).unwrap()
    }

    fn reconcile(root: &Path, layout: &str, options: &LayoutOptions, dry_run: bool) -> RunReport {
        let layout = TargetLayout::from_toml_str(layout).unwrap();
        reconcile_to_layout(root, &layout, options, &settings(dry_run), |_| true).unwrap()
    }

    fn tree(root: &Path) -> BTreeMap<PathBuf, String> {
        let names = names(root);
        let mut out = BTreeMap::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !names.is_artifact(e.path()))
        {
            let entry = entry.unwrap();
            let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let value = if entry.file_type().is_dir() {
                "<dir>".to_string()
            } else {
                fingerprint(entry.path(), HashAlgorithm::Sha256, 4096).unwrap()
            };
            out.insert(rel, value);
        }
        out
    }

    #[test]
    fn lone_copy_moves_to_canonical_path_and_old_dir_is_pruned() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "old/processor.py", "print('hi')");

        let actions = plan(&root, PROCESSOR_LAYOUT, &LayoutOptions::default());
        assert_eq!(
            actions,
            vec![
                ReconciliationAction::CreateDir {
                    path: root.join("src")
                },
                ReconciliationAction::CreateDir {
                    path: root.join("src/core")
                },
                ReconciliationAction::Move {
                    from: root.join("old/processor.py"),
                    to: root.join("src/core/processor.py"),
                },
                ReconciliationAction::RemoveDir {
                    path: root.join("old")
                },
            ]
        );

        let report = reconcile(&root, PROCESSOR_LAYOUT, &LayoutOptions::default(), false);

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(
            fs::read_to_string(root.join("src/core/processor.py")).unwrap(),
            "print('hi')"
        );
        assert!(!root.join("old").exists());
        assert_eq!(report.summary.moved, 1);
        assert_eq!(report.summary.removed_dirs, 1);
    }

    #[test]
    fn canonical_copy_is_kept_and_others_are_archived() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "README.md", "main");
        write(&root, "docs/README.md", "stale copy");
        let layout = "[\"\"]\n\"\" = [\"README.md\"]\n";

        let report = reconcile(&root, layout, &LayoutOptions::default(), false);

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(fs::read_to_string(root.join("README.md")).unwrap(), "main");
        assert!(!root.join("docs").exists());

        let file = fs::File::open(report.archive_path.unwrap()).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut entries = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            entries.push((name, content));
        }
        assert_eq!(
            entries,
            vec![("docs/README.md".to_string(), "stale copy".to_string())]
        );
    }

    #[test]
    fn missing_file_gets_placeholder() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());

        let report = reconcile(&root, PROCESSOR_LAYOUT, &LayoutOptions::default(), false);

        let placeholder = root.join("src/core/processor.py");
        assert!(report.is_success());
        assert_eq!(fs::metadata(&placeholder).unwrap().len(), 0);
        assert_eq!(report.summary.created, 3);
    }

    #[test]
    fn unlisted_files_stay_unless_opted_in() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "src/core/processor.py", "code");
        write(&root, "notes/stray.txt", "keep me?");
        write(&root, "rollback_log_20230101_000000.csv", "action,path1,path2\n");

        let default_plan = plan(&root, PROCESSOR_LAYOUT, &LayoutOptions::default());
        assert!(default_plan.is_empty(), "{default_plan:?}");

        let opted_in = LayoutOptions {
            remove_unlisted: true,
            ..LayoutOptions::default()
        };
        let actions = plan(&root, PROCESSOR_LAYOUT, &opted_in);
        assert_eq!(
            actions,
            vec![
                ReconciliationAction::Delete {
                    path: root.join("notes/stray.txt")
                },
                ReconciliationAction::RemoveDir {
                    path: root.join("notes")
                },
            ]
        );
    }

    #[test]
    fn same_name_targets_each_take_one_instance() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "c/x.txt", "from c");
        write(&root, "d/x.txt", "from d");
        let layout = "[a]\n\"\" = [\"x.txt\"]\n[b]\n\"\" = [\"x.txt\"]\n";

        let actions = plan(&root, layout, &LayoutOptions::default());

        assert!(actions.contains(&ReconciliationAction::Move {
            from: root.join("c/x.txt"),
            to: root.join("a/x.txt"),
        }));
        assert!(actions.contains(&ReconciliationAction::Move {
            from: root.join("d/x.txt"),
            to: root.join("b/x.txt"),
        }));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, ReconciliationAction::Delete { .. })));
    }

    #[test]
    fn instance_at_another_canonical_path_is_not_taken() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "b/x.txt", "belongs to b");
        let layout = "[a]\n\"\" = [\"x.txt\"]\n[b]\n\"\" = [\"x.txt\"]\n";

        let actions = plan(&root, layout, &LayoutOptions::default());

        assert_eq!(
            actions,
            vec![
                ReconciliationAction::CreateDir {
                    path: root.join("a")
                },
                ReconciliationAction::CreateFile {
                    path: root.join("a/x.txt")
                },
            ]
        );
    }

    #[test]
    fn hidden_declared_files_are_found() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "config/.gitignore", "target/");
        let layout = "[\"\"]\n\"\" = [\".gitignore\"]\n";

        let actions = plan(&root, layout, &LayoutOptions::default());

        assert_eq!(
            actions[0],
            ReconciliationAction::Move {
                from: root.join("config/.gitignore"),
                to: root.join(".gitignore"),
            }
        );
    }

    #[test]
    fn pruning_goes_deepest_first() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        fs::create_dir_all(root.join("old/a/b")).unwrap();
        fs::create_dir_all(root.join("old/z")).unwrap();
        write(&root, "src/core/processor.py", "code");

        let actions = plan(&root, PROCESSOR_LAYOUT, &LayoutOptions::default());

        let removed: Vec<_> = actions.iter().map(|a| a.path().to_path_buf()).collect();
        assert_eq!(
            removed,
            vec![
                root.join("old/a/b"),
                root.join("old/z"),
                root.join("old/a"),
                root.join("old"),
            ]
        );

        let report = reconcile(&root, PROCESSOR_LAYOUT, &LayoutOptions::default(), false);
        assert!(report.is_success(), "{:?}", report.failures);
        assert!(!root.join("old").exists());
    }

    #[test]
    fn pruning_disabled_keeps_empty_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        fs::create_dir_all(root.join("empty")).unwrap();
        write(&root, "src/core/processor.py", "code");
        let options = LayoutOptions {
            prune_empty_dirs: false,
            ..LayoutOptions::default()
        };

        assert!(plan(&root, PROCESSOR_LAYOUT, &options).is_empty());
    }

    #[test]
    fn excluded_dirs_are_left_alone_and_keep_parents() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "web/node_modules/processor.py", "vendored");
        let options = LayoutOptions {
            remove_unlisted: true,
            excluded_dirs: vec!["node_modules".to_string()],
            ..LayoutOptions::default()
        };

        let actions = plan(&root, PROCESSOR_LAYOUT, &options);

        assert_eq!(
            actions,
            vec![
                ReconciliationAction::CreateDir {
                    path: root.join("src")
                },
                ReconciliationAction::CreateDir {
                    path: root.join("src/core")
                },
                ReconciliationAction::CreateFile {
                    path: root.join("src/core/processor.py")
                },
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_keep_their_directory() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "src/core/processor.py", "code");
        fs::create_dir_all(root.join("links")).unwrap();
        std::os::unix::fs::symlink(
            root.join("src/core/processor.py"),
            root.join("links/processor_link"),
        )
        .unwrap();
        let options = LayoutOptions {
            remove_unlisted: true,
            ..LayoutOptions::default()
        };

        assert!(plan(&root, PROCESSOR_LAYOUT, &options).is_empty());
    }

    #[test]
    fn dry_run_describes_the_real_run_without_mutating() {
        let dry_tmp = TempDir::new().unwrap();
        let real_tmp = TempDir::new().unwrap();
        for tmp in [&dry_tmp, &real_tmp] {
            write(tmp.path(), "old/processor.py", "code");
            write(tmp.path(), "misc/processor.py", "other code");
            write(tmp.path(), "junk.txt", "junk");
        }
        let options = LayoutOptions {
            remove_unlisted: true,
            ..LayoutOptions::default()
        };
        let before = tree(dry_tmp.path());

        let dry = reconcile(dry_tmp.path(), PROCESSOR_LAYOUT, &options, true);
        let real = reconcile(real_tmp.path(), PROCESSOR_LAYOUT, &options, false);

        let relative = |report: &RunReport, root: &Path| -> Vec<String> {
            let root = normalize_path(root).display().to_string();
            report
                .descriptions
                .iter()
                .map(|d| d.replace(&root, "<root>"))
                .collect()
        };
        assert_eq!(relative(&dry, dry_tmp.path()), relative(&real, real_tmp.path()));
        assert_eq!(tree(dry_tmp.path()), before);
        assert!(dry.journal.is_empty());
        assert_eq!(dry.summary, real.summary);
    }

    #[test]
    fn rollback_restores_the_original_tree() {
        let tmp = TempDir::new().unwrap();
        let root = normalize_path(tmp.path());
        write(&root, "old/processor.py", "code");
        write(&root, "misc/deep/processor.py", "older code");
        write(&root, "junk.txt", "junk");
        fs::create_dir_all(root.join("empty/inner")).unwrap();
        let options = LayoutOptions {
            remove_unlisted: true,
            ..LayoutOptions::default()
        };
        let before = tree(&root);

        let report = reconcile(&root, PROCESSOR_LAYOUT, &options, false);
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(
            tree(&root).keys().cloned().collect::<Vec<_>>(),
            vec![
                PathBuf::from("src"),
                PathBuf::from("src/core"),
                PathBuf::from("src/core/processor.py"),
            ]
        );

        let replayed = rollback(&report.journal_path.unwrap(), false).unwrap();

        assert!(replayed.failures.is_empty(), "{:?}", replayed.failures);
        assert_eq!(tree(&root), before);
    }

    #[test]
    fn invalid_layout_fails_before_touching_anything() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "a");
        let layout: TargetLayout = toml::from_str("[\"../escape\"]\n\"\" = [\"a.txt\"]\n").unwrap();
        let before = tree(tmp.path());

        let result = reconcile_to_layout(
            tmp.path(),
            &layout,
            &LayoutOptions::default(),
            &settings(false),
            |_| true,
        );

        assert!(matches!(result.unwrap_err(), CoreError::Config(_)));
        assert_eq!(tree(tmp.path()), before);
    }

    #[test]
    fn declined_confirmation_cancels() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "old/processor.py", "code");
        let layout = TargetLayout::from_toml_str(PROCESSOR_LAYOUT).unwrap();
        let before = tree(tmp.path());

        let result = reconcile_to_layout(
            tmp.path(),
            &layout,
            &LayoutOptions::default(),
            &settings(false),
            |_| false,
        );

        assert!(matches!(result.unwrap_err(), CoreError::Cancelled));
        assert_eq!(tree(tmp.path()), before);
    }
}
