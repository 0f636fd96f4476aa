use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use refile_core::DepthLimit;

#[derive(Debug, Parser)]
#[command(name = "refile", version)]
#[command(about = "Find duplicate files and reshape directory trees, reversibly", long_about = None)]
pub struct Cli {
    /// Engine settings file (TOML). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "TOML")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Report duplicate groups without touching anything
    Scan {
        root: PathBuf,
        /// Directory levels below the root to descend, or "unbounded"
        #[arg(long)]
        depth: Option<DepthLimit>,
        /// Save the groups as a JSON report
        #[arg(long, value_name = "JSON")]
        report: Option<PathBuf>,
    },
    /// Show a saved scan report, dropping members that no longer exist
    Review {
        #[arg(value_name = "JSON")]
        report: PathBuf,
    },
    /// Archive and remove surplus duplicate copies
    Dedupe {
        root: PathBuf,
        #[arg(long)]
        depth: Option<DepthLimit>,
        #[arg(long, value_enum, default_value_t = Mode::KeepFirst)]
        mode: Mode,
        /// Describe every action without performing it
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Move files into the places a target layout declares
    Organize {
        root: PathBuf,
        #[arg(long, value_name = "TOML")]
        layout: PathBuf,
        /// Also archive and remove every file the layout does not declare
        #[arg(long)]
        remove_unlisted: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, short)]
        yes: bool,
    },
    /// Undo a run from its rollback file
    Rollback {
        journal: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, short)]
        yes: bool,
    },
}

/// How `dedupe` picks survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Keep the first copy found in each group
    KeepFirst,
    /// Only report the groups
    Reject,
    /// Choose per group which copies to remove
    Select,
}
