//! # pmdash - Project Dashboard CLI
//!
//! Reads a project-tracking CSV export and prints project progress, delayed
//! tasks, upcoming milestones and per-project task panels.
//!
//! ## Quick Start
//!
//! ```bash
//! # Project table, export located automatically
//! pmdash projects
//!
//! # A specific export, sorted by progress
//! pmdash --file ~/exports/dashboard.csv projects --sort progress
//!
//! # One project, as JSON
//! pmdash --json project P001
//!
//! # Where would the data come from?
//! pmdash resolve
//! ```
//!
//! ## Locating the data
//!
//! Without `--file` the export is searched for in order: `source_file` in the
//! config, `PMSUITE_DASHBOARD_FILE`, `$APP_PATH/data/exports/dashboard.csv`,
//! `$PMSUITE_DASHBOARD_DATA_DIR/dashboard.csv`, then `data/exports/` under the
//! working directory, its parent and `ProjectManager/` folders. When nothing
//! is found a small sample dataset is generated so the commands still work.
//!
//! ## Logging
//!
//! Logs go to stderr. `PMDASH_LOG` takes an `EnvFilter` directive,
//! `PMDASH_LOG_FORMAT=json` switches to JSON lines, `DEBUG=1` raises the
//! default level.

use std::env;
use std::process;

use chrono::Local;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use project_dashboard::config::resolve_config;
use project_dashboard::dashboard::Dashboard;
use project_dashboard::error::ErrorPayload;

mod cli;
mod cmd;

use cli::Cli;
use cmd::*;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PMDASH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "project_dashboard=debug,info"
        } else {
            "project_dashboard=info,warn"
        })
    });

    let format = env::var("PMDASH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        cmd_completions(*shell);
        return;
    }

    let config = match resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };
    debug!(?config, "configuration loaded");

    let dashboard = Dashboard::new(config);
    let ctx = CmdContext {
        dashboard: &dashboard,
        file: cli.file.clone(),
        json: cli.json,
        now: Local::now().naive_local(),
    };

    let result = match &cli.command {
        Commands::Projects { sort } => cmd_projects(&ctx, *sort),
        Commands::Project { id } => cmd_project(&ctx, id),
        Commands::Delayed => cmd_delayed(&ctx),
        Commands::Milestones { project, include_past } => cmd_milestones(&ctx, project.as_deref(), *include_past),
        Commands::Recent { id } => cmd_recent(&ctx, id),
        Commands::Metrics => cmd_metrics(&ctx),
        Commands::Resolve => cmd_resolve(&ctx),
        Commands::Sample { dir } => cmd_sample(&ctx, dir),
        Commands::Completions { .. } => Ok(()),
    };

    if cli.stats {
        print_cache_stats(&dashboard.cache_stats());
    }

    if let Err(e) = result {
        match e.downcast_ref::<ErrorPayload>() {
            Some(payload) => report_load_error(payload, cli.json),
            None => eprintln!("Error: {e:#}"),
        }
        process::exit(1);
    }
}
