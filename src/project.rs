//! Project-level rollup records.
//!
//! A `ProjectRollup` is one row of the project table: counts, date span and
//! derived progress for every distinct project id. Rollups are always
//! structurally complete; when the input cannot be aggregated the aggregator
//! emits a single diagnostic row built by `ProjectRollup::diagnostic`.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::task::ProjectId;

/// Project id used by diagnostic rows.
pub const DIAGNOSTIC_PROJECT_ID: &str = "0";

/// Aggregated state of one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRollup {
    pub project_id: ProjectId,
    pub project_name: String,
    pub process: String,
    pub line: String,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub milestone_count: usize,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub project_path: Option<String>,
    pub ganttchart_path: Option<String>,
    /// Completed share in percent, two decimals.
    pub progress: f64,
    /// Days between start and end, 0 when either is unknown.
    pub duration: i64,
    pub has_delay: bool,
    /// Marks an error-shaped row standing in for a failed aggregation.
    pub diagnostic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProjectRollup {
    /// An empty rollup with every aggregate at its default.
    pub fn empty(project_id: ProjectId) -> Self {
        ProjectRollup {
            project_id,
            project_name: String::new(),
            process: String::new(),
            line: String::new(),
            total_tasks: 0,
            completed_tasks: 0,
            milestone_count: 0,
            start_date: None,
            end_date: None,
            project_path: None,
            ganttchart_path: None,
            progress: 0.0,
            duration: 0,
            has_delay: false,
            diagnostic: false,
            message: None,
        }
    }

    /// A visible error row, so a table renders a diagnostic instead of nothing.
    pub fn diagnostic(name: &str, message: impl Into<String>) -> Self {
        ProjectRollup {
            project_name: name.to_string(),
            process: "N/A".to_string(),
            line: "N/A".to_string(),
            diagnostic: true,
            message: Some(message.into()),
            ..ProjectRollup::empty(ProjectId::new(DIAGNOSTIC_PROJECT_ID))
        }
    }

    /// Recompute `progress` and `duration` from the counts and dates.
    pub fn finalize(&mut self) {
        self.progress = progress_percent(self.completed_tasks, self.total_tasks);
        self.duration = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => (end.date() - start.date()).num_days().max(0),
            _ => 0,
        };
    }
}

/// `completed / total * 100` rounded to two decimals, 0 for an empty group.
pub fn progress_percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let ratio = (completed.min(total) as f64) / (total as f64) * 100.0;
    (ratio * 100.0).round() / 100.0
}
