use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Project dashboard over a task-tracking CSV export.
/// The export is located automatically unless --file is given.
#[derive(Parser)]
#[command(name = "pmdash", version, about = "Project progress, delays and milestones from a CSV export")]
pub struct Cli {
    /// Path to the dashboard CSV file.
    #[arg(long, global = true)]
    pub file: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Print cache statistics to stderr when done.
    #[arg(long, global = true)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Commands,
}
