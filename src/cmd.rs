//! Command implementations for the CLI interface.
//!
//! Each handler asks the `Dashboard` for one view and prints it either as a
//! fixed-width table or, with `--json`, as a JSON document on stdout.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use crossterm::style::{Color, Stylize};
use serde::Serialize;

use project_dashboard::aggregate::status_tone;
use project_dashboard::cache::CacheStats;
use project_dashboard::classify::{format_milestone_label, RecentTasks, TaskPointer};
use project_dashboard::dashboard::Dashboard;
use project_dashboard::error::ErrorPayload;
use project_dashboard::fields::{SortKey, StatusTone};
use project_dashboard::project::ProjectRollup;
use project_dashboard::records::{format_days_offset, truncate, LoadResult};
use project_dashboard::resolver::write_sample_dataset;
use project_dashboard::task::{ProjectId, TaskRecord};

#[derive(Subcommand)]
pub enum Commands {
    /// List every project with progress, duration and next milestone.
    Projects {
        /// Sort key.
        #[arg(long, value_enum, default_value_t = SortKey::Id)]
        sort: SortKey,
    },

    /// Show one project in detail.
    Project {
        /// Project id, e.g. P001 or 12.
        id: String,
    },

    /// List tasks past their due date that are not done.
    Delayed,

    /// List milestones, earliest first.
    Milestones {
        /// Only this project.
        #[arg(long)]
        project: Option<String>,
        /// Include milestones whose date has passed.
        #[arg(long)]
        include_past: bool,
    },

    /// Show the delayed / in-progress / next tasks of a project.
    Recent {
        /// Project id.
        id: String,
    },

    /// Print the dashboard summary and distributions.
    Metrics,

    /// Print which file would be loaded and the locations searched.
    Resolve,

    /// Write the sample dataset into a directory.
    Sample {
        /// Target directory.
        dir: PathBuf,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Per-invocation state shared by the handlers.
pub struct CmdContext<'a> {
    pub dashboard: &'a Dashboard,
    pub file: Option<PathBuf>,
    pub json: bool,
    /// Captured once at startup; every handler derives "today" from it.
    pub now: NaiveDateTime,
}

impl CmdContext<'_> {
    fn today(&self) -> NaiveDate {
        self.now.date()
    }

    fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Load the records, turning a load error into an `ErrorPayload`.
    fn loaded(&self) -> Result<Arc<LoadResult>> {
        let loaded = self.dashboard.records(self.file());
        if let Err(e) = loaded.as_ref() {
            return Err(e.payload().into());
        }
        Ok(loaded)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn tone_color(tone: StatusTone) -> Color {
    match tone {
        StatusTone::Danger => Color::Red,
        StatusTone::Success => Color::Green,
        StatusTone::Info => Color::Cyan,
        StatusTone::Warning => Color::Yellow,
        StatusTone::Neutral => Color::Grey,
    }
}

/// Colour `text` for the terminal; plain when stdout is piped.
fn paint(text: String, tone: StatusTone) -> String {
    if std::io::stdout().is_terminal() {
        text.with(tone_color(tone)).to_string()
    } else {
        text
    }
}

fn format_day(date: Option<NaiveDateTime>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".into())
}

fn format_pointer(pointer: Option<&TaskPointer>) -> String {
    match pointer {
        Some(p) => format!("{} ({})", p.name, format_days_offset(p.days_offset)),
        None => "-".into(),
    }
}

#[derive(Serialize)]
struct ProjectRow<'a> {
    #[serde(flatten)]
    rollup: &'a ProjectRollup,
    tone: StatusTone,
    next_milestone: String,
}

/// List every project rollup.
pub fn cmd_projects(ctx: &CmdContext, sort: SortKey) -> Result<()> {
    ctx.loaded()?;
    let today = ctx.today();
    let rollups = ctx.dashboard.rollups(ctx.file(), today);

    let mut rows: Vec<&ProjectRollup> = rollups.iter().collect();
    match sort {
        SortKey::Id => rows.sort_by(|a, b| a.project_id.cmp(&b.project_id)),
        SortKey::Progress => rows.sort_by(|a, b| b.progress.total_cmp(&a.progress).then(a.project_id.cmp(&b.project_id))),
        SortKey::Duration => rows.sort_by(|a, b| b.duration.cmp(&a.duration).then(a.project_id.cmp(&b.project_id))),
        SortKey::Name => rows.sort_by(|a, b| a.project_name.cmp(&b.project_name).then(a.project_id.cmp(&b.project_id))),
    }

    let rows = rows
        .into_iter()
        .map(|r| {
            let milestone = ctx.dashboard.next_milestone(ctx.file(), &r.project_id, today, false)?;
            Ok::<_, anyhow::Error>(ProjectRow {
                rollup: r,
                tone: status_tone(r.progress, r.has_delay),
                next_milestone: format_milestone_label(milestone.as_ref(), today),
            })
        })
        .collect::<Result<Vec<ProjectRow>>>()?;

    if ctx.json {
        return print_json(&rows);
    }

    println!(
        "{:<8} {:<24} {:>8} {:>7} {:>4} {:>6} {:<24} {}",
        "ID", "Name", "Progress", "Tasks", "MS", "Days", "Next milestone", "Status"
    );
    for row in rows {
        let r = row.rollup;
        if r.diagnostic {
            println!(
                "{:<8} {:<24} {}",
                r.project_id.as_str(),
                r.project_name,
                r.message.as_deref().unwrap_or("-")
            );
            continue;
        }
        println!(
            "{:<8} {:<24} {:>7.2}% {:>7} {:>4} {:>6} {:<24} {}",
            truncate(r.project_id.as_str(), 8),
            truncate(&r.project_name, 24),
            r.progress,
            format!("{}/{}", r.completed_tasks, r.total_tasks),
            r.milestone_count,
            r.duration,
            truncate(&row.next_milestone, 24),
            paint(row.tone.as_str().to_string(), row.tone),
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ProjectDetail<'a> {
    #[serde(flatten)]
    rollup: &'a ProjectRollup,
    tone: StatusTone,
    next_milestone: String,
    recent: &'a RecentTasks,
}

/// View detailed information about a single project.
pub fn cmd_project(ctx: &CmdContext, id: &str) -> Result<()> {
    ctx.loaded()?;
    let today = ctx.today();
    let project_id = ProjectId::new(id);
    let Some(rollup) = ctx.dashboard.project(ctx.file(), &project_id, today) else {
        anyhow::bail!("Project {} not found", project_id);
    };
    let milestone = ctx.dashboard.next_milestone(ctx.file(), &project_id, today, true)?;
    let recent = ctx.dashboard.recent_tasks(ctx.file(), &project_id, today)?;
    let tone = status_tone(rollup.progress, rollup.has_delay);
    let next_milestone = format_milestone_label(milestone.as_ref(), today);

    if ctx.json {
        return print_json(&ProjectDetail {
            rollup: &rollup,
            tone,
            next_milestone,
            recent: &recent,
        });
    }

    println!("ID:             {}", rollup.project_id);
    println!("Name:           {}", rollup.project_name);
    println!("Process:        {}", if rollup.process.is_empty() { "-" } else { rollup.process.as_str() });
    println!("Line:           {}", if rollup.line.is_empty() { "-" } else { rollup.line.as_str() });
    println!("Progress:       {:.2}% ({}/{})", rollup.progress, rollup.completed_tasks, rollup.total_tasks);
    println!("Milestones:     {}", rollup.milestone_count);
    println!("Span:           {} .. {} ({} days)", format_day(rollup.start_date), format_day(rollup.end_date), rollup.duration);
    println!("Status:         {}", paint(tone.as_str().to_string(), tone));
    println!("Next milestone: {next_milestone}");
    println!("Folder:         {}", rollup.project_path.as_deref().unwrap_or("-"));
    println!("Gantt chart:    {}", rollup.ganttchart_path.as_deref().unwrap_or("-"));
    println!();
    print_recent(&recent);
    Ok(())
}

fn print_recent(recent: &RecentTasks) {
    println!("Delayed:        {}", format_pointer(recent.delayed.as_ref()));
    println!("In progress:    {}", format_pointer(recent.in_progress.as_ref()));
    println!("Next:           {}", format_pointer(recent.next.as_ref()));
    println!("After that:     {}", format_pointer(recent.next_next.as_ref()));
}

/// List delayed tasks across all projects.
pub fn cmd_delayed(ctx: &CmdContext) -> Result<()> {
    let today = ctx.today();
    let tasks = ctx.dashboard.delayed_tasks(ctx.file(), today)?;

    if ctx.json {
        return print_json(tasks.as_slice());
    }
    if tasks.is_empty() {
        println!("No delayed tasks.");
        return Ok(());
    }

    println!("{:<8} {:<20} {:<8} {:<24} {:<10} {:>8}", "Project", "Name", "Task", "Title", "Due", "Overdue");
    for t in tasks.iter() {
        let overdue = t
            .finish_day()
            .map(|d| format!("{}d", (today - d).num_days()))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<8} {:<20} {:<8} {:<24} {:<10} {:>8}",
            truncate(t.project_id.as_str(), 8),
            truncate(&t.project_name, 20),
            truncate(&t.task_id, 8),
            truncate(&t.task_name, 24),
            format_day(t.task_finish_date),
            paint(overdue, StatusTone::Danger),
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct MilestoneRow<'a> {
    project_id: &'a ProjectId,
    project_name: &'a str,
    task_id: &'a str,
    task_name: &'a str,
    task_finish_date: Option<NaiveDateTime>,
    label: String,
}

/// List milestones, optionally for one project and including past ones.
pub fn cmd_milestones(ctx: &CmdContext, project: Option<&str>, include_past: bool) -> Result<()> {
    let today = ctx.today();
    let milestones = ctx.dashboard.milestones(ctx.file(), today, include_past)?;
    let project = project.map(ProjectId::new);

    let rows: Vec<MilestoneRow> = milestones
        .iter()
        .filter(|t| project.as_ref().map_or(true, |p| &t.project_id == p))
        .map(|t: &TaskRecord| MilestoneRow {
            project_id: &t.project_id,
            project_name: &t.project_name,
            task_id: &t.task_id,
            task_name: &t.task_name,
            task_finish_date: t.task_finish_date,
            label: format_milestone_label(Some(t), today),
        })
        .collect();

    if ctx.json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No milestones.");
        return Ok(());
    }

    println!("{:<8} {:<20} {:<10} {}", "Project", "Name", "Due", "Milestone");
    for row in rows {
        println!(
            "{:<8} {:<20} {:<10} {}",
            truncate(row.project_id.as_str(), 8),
            truncate(row.project_name, 20),
            format_day(row.task_finish_date),
            row.label,
        );
    }
    Ok(())
}

/// Show the recent-tasks panel for one project.
pub fn cmd_recent(ctx: &CmdContext, id: &str) -> Result<()> {
    let project_id = ProjectId::new(id);
    let recent = ctx.dashboard.recent_tasks(ctx.file(), &project_id, ctx.today())?;

    if ctx.json {
        return print_json(recent.as_ref());
    }
    println!("Project:        {project_id}");
    print_recent(&recent);
    Ok(())
}

/// Print summary numbers and the progress and duration distributions.
pub fn cmd_metrics(ctx: &CmdContext) -> Result<()> {
    let metrics = ctx.dashboard.metrics(ctx.file(), ctx.now)?;

    if ctx.json {
        return print_json(&metrics);
    }

    let s = &metrics.summary;
    println!("Projects:       {}", s.total_projects);
    println!("Active:         {}", s.active_projects);
    println!("Delayed:        {}", paint(s.delayed_projects.to_string(), if s.delayed_projects > 0 { StatusTone::Danger } else { StatusTone::Success }));
    println!("Milestone due:  {} (this month)", s.milestone_projects);
    println!();
    println!("{:<10} {}", "Progress", "Count");
    for (range, count) in metrics.progress_distribution.ranges.iter().zip(&metrics.progress_distribution.counts) {
        println!("{:<10} {}", range, count);
    }
    println!();
    println!("{:<10} {}", "Duration", "Count");
    for (range, count) in metrics.duration_distribution.ranges.iter().zip(&metrics.duration_distribution.counts) {
        println!("{:<10} {}", range, count);
    }
    println!();
    println!("Generated:      {}", metrics.generated_at.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}

#[derive(Serialize)]
struct Resolution {
    path: PathBuf,
    candidates: Vec<PathBuf>,
}

/// Show which file would be loaded.
pub fn cmd_resolve(ctx: &CmdContext) -> Result<()> {
    let resolution = Resolution {
        path: ctx.dashboard.source_path(ctx.file()),
        candidates: ctx.dashboard.resolver().hints().candidates(),
    };

    if ctx.json {
        return print_json(&resolution);
    }
    println!("Resolved: {}", resolution.path.display());
    println!("Searched:");
    for candidate in &resolution.candidates {
        let mark = if candidate.is_file() { "found" } else { "-" };
        println!("  {:<6} {}", mark, candidate.display());
    }
    Ok(())
}

/// Write the sample dataset into `dir`.
pub fn cmd_sample(ctx: &CmdContext, dir: &Path) -> Result<()> {
    let path = write_sample_dataset(dir, ctx.today())
        .with_context(|| format!("Failed to write sample data to {}", dir.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

/// Print per-cache counters to stderr.
pub fn print_cache_stats(stats: &[(&'static str, CacheStats)]) {
    eprintln!("{:<14} {:>5} {:>6} {:>6} {:>7}", "Cache", "Size", "Hits", "Misses", "Ratio");
    for (name, s) in stats {
        eprintln!(
            "{:<14} {:>5} {:>6} {:>6} {:>6.1}%",
            name,
            s.size,
            s.hits,
            s.misses,
            s.hit_ratio * 100.0
        );
    }
}

/// Print a load failure the way `--json` callers and humans each expect.
pub fn report_load_error(payload: &ErrorPayload, json: bool) {
    if json {
        match serde_json::to_string_pretty(payload) {
            Ok(out) => println!("{out}"),
            Err(_) => eprintln!("{}", payload.error),
        }
    } else {
        eprintln!("Error: {}", payload.error);
        for line in payload.details.lines() {
            eprintln!("  {line}");
        }
    }
}
