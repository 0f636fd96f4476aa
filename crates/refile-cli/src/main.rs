//! refile: duplicate cleanup and layout reconciliation with full rollback.
//!
//! Every real run leaves a rollback CSV, a duplicate index, a quarantine
//! directory and a compressed archive in the root it touched, plus the log
//! mirrored to `reconcile_log.txt`.

mod commands;
mod logging;
mod progress;
mod prompt;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use refile_core::dedup::report::render_index;
use refile_core::{
    dedupe, reconcile_to_layout, rollback, scan, Config, CoreError, DuplicateReport,
    LayoutOptions, ReconciliationAction, RunReport, RunSettings, ScanOptions, Strategy,
    TargetLayout,
};
use tracing::{error, info, warn};

use crate::commands::{Cli, Commands, Mode};
use crate::progress::CliReporter;
use crate::prompt::InteractiveSelector;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => Config::default(),
    };

    let log_file = log_root(&cli.command).map(|root| root.join(&config.artifacts.log_file));
    let _guard = logging::init(log_file.as_deref())?;

    let succeeded = match cli.command {
        Commands::Scan {
            root,
            depth,
            report,
        } => run_scan(&config, &root, depth, report.as_deref())?,
        Commands::Review { report } => run_review(&report)?,
        Commands::Dedupe {
            root,
            depth,
            mode,
            dry_run,
            yes,
        } => run_dedupe(&config, &root, depth, mode, dry_run, yes)?,
        Commands::Organize {
            root,
            layout,
            remove_unlisted,
            dry_run,
            yes,
        } => run_organize(&config, &root, &layout, remove_unlisted, dry_run, yes)?,
        Commands::Rollback {
            journal,
            dry_run,
            yes,
        } => run_rollback(&journal, dry_run, yes)?,
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Root whose audit log a command mirrors to disk. Scans and dry runs
/// leave no files behind.
fn log_root(command: &Commands) -> Option<PathBuf> {
    match command {
        Commands::Dedupe {
            root,
            dry_run: false,
            ..
        }
        | Commands::Organize {
            root,
            dry_run: false,
            ..
        } => root.is_dir().then(|| root.clone()),
        Commands::Rollback {
            journal,
            dry_run: false,
            ..
        } => journal
            .parent()
            .filter(|p| p.is_dir())
            .map(Path::to_path_buf),
        _ => None,
    }
}

fn scan_options(config: &Config, depth: Option<refile_core::DepthLimit>) -> ScanOptions {
    let mut options = ScanOptions::from(config);
    if let Some(depth) = depth {
        options.max_depth = depth;
    }
    options
}

/// Confirmation callback honoring `--yes` and `general.confirm_destructive`.
fn confirmer(config: &Config, yes: bool) -> impl FnMut(&[ReconciliationAction]) -> bool {
    let ask = config.general.confirm_destructive && !yes;
    move |actions: &[ReconciliationAction]| !ask || prompt::confirm_plan(actions)
}

fn run_scan(
    config: &Config,
    root: &Path,
    depth: Option<refile_core::DepthLimit>,
    report: Option<&Path>,
) -> anyhow::Result<bool> {
    let options = scan_options(config, depth);
    let reporter = CliReporter::new();
    let outcome = scan(root, &options, &reporter)?;

    print!("{}", render_index(&outcome.groups));
    info!(
        "{} duplicate groups, {} files with duplicates, {} bytes reclaimable ({} scanned, {} hashed)",
        outcome.stats.duplicate_groups,
        outcome.stats.duplicate_files,
        outcome.stats.wasted_bytes,
        outcome.stats.scanned,
        outcome.stats.hashed
    );
    for failure in &outcome.failures {
        warn!("{failure}");
    }

    if let Some(path) = report {
        DuplicateReport::new(root, outcome.groups.clone()).save(path)?;
        info!("Report saved to {}", path.display());
    }
    Ok(outcome.failures.is_empty())
}

fn run_review(path: &Path) -> anyhow::Result<bool> {
    let saved = DuplicateReport::load(path)?;
    let before = saved.total_files();
    let report = saved.validate();
    if let Some(root) = &report.scan_root {
        info!(
            "Report for {} scanned at {}",
            root.display(),
            report.scanned_at.as_deref().unwrap_or("an unknown time")
        );
    }
    if before > report.total_files() {
        warn!(
            "{} files listed in the report no longer exist",
            before - report.total_files()
        );
    }
    if report.is_empty() {
        info!("No duplicate groups remain.");
        return Ok(true);
    }

    print!("{}", render_index(&report.groups));
    info!(
        "{} duplicate groups, {} files, {} bytes reclaimable",
        report.groups.len(),
        report.total_files(),
        report.total_wasted()
    );
    Ok(true)
}

fn run_dedupe(
    config: &Config,
    root: &Path,
    depth: Option<refile_core::DepthLimit>,
    mode: Mode,
    dry_run: bool,
    yes: bool,
) -> anyhow::Result<bool> {
    let options = scan_options(config, depth);
    let settings = RunSettings::from_config(config, dry_run);
    let reporter = CliReporter::new();
    let mut selector = InteractiveSelector::new();
    let strategy = match mode {
        Mode::KeepFirst => Strategy::KeepFirst,
        Mode::Reject => Strategy::Reject,
        Mode::Select => Strategy::Explicit(&mut selector),
    };

    let report = match dedupe(
        root,
        &options,
        strategy,
        &settings,
        &reporter,
        confirmer(config, yes),
    ) {
        Ok(report) => report,
        Err(CoreError::Cancelled) => return Ok(true),
        Err(e) => return Err(e.into()),
    };

    if let Some(index) = &report.index_path {
        info!("Duplicate index: {}", index.display());
    }
    finish_run(&report.run);
    Ok(report.run.is_success())
}

fn run_organize(
    config: &Config,
    root: &Path,
    layout_path: &Path,
    remove_unlisted: bool,
    dry_run: bool,
    yes: bool,
) -> anyhow::Result<bool> {
    let layout = TargetLayout::load(layout_path)
        .with_context(|| format!("loading layout {}", layout_path.display()))?;
    let mut options = LayoutOptions::from(config);
    options.remove_unlisted |= remove_unlisted;
    if options.remove_unlisted {
        warn!("Files not declared in the layout will be archived and removed");
    }
    let settings = RunSettings::from_config(config, dry_run);

    let report = match reconcile_to_layout(root, &layout, &options, &settings, confirmer(config, yes)) {
        Ok(report) => report,
        Err(CoreError::Cancelled) => return Ok(true),
        Err(e) => return Err(e.into()),
    };

    finish_run(&report);
    Ok(report.is_success())
}

fn run_rollback(journal: &Path, dry_run: bool, yes: bool) -> anyhow::Result<bool> {
    if !dry_run
        && !yes
        && !prompt::confirm(&format!("Undo every action recorded in {}?", journal.display()))
    {
        info!("Operation cancelled by user.");
        return Ok(true);
    }

    let report = rollback(journal, dry_run)?;
    for failure in &report.failures {
        error!("{failure}");
    }
    info!(
        "Rollback: {} undone, {} already in place, {} failed",
        report.undone,
        report.skipped,
        report.failures.len()
    );
    Ok(report.failures.is_empty())
}

fn finish_run(report: &RunReport) {
    for failure in &report.failures {
        error!("{failure}");
    }
    let prefix = if report.dry_run { "[DRY RUN] " } else { "" };
    info!("{prefix}Summary: {}", report.summary);
    if let Some(journal) = &report.journal_path {
        info!("Rollback log: {}", journal.display());
    }
    if let (Some(quarantine), Some(archive)) = (&report.quarantine_dir, &report.archive_path) {
        if !report.dry_run {
            info!(
                "Review {} and {} before deleting them.",
                quarantine.display(),
                archive.display()
            );
        }
    }
}
