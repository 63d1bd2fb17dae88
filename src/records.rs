//! Record set operations and utility functions.
//!
//! This module provides the `RecordSet` struct produced by the loader, the
//! column vocabulary of the dashboard export, lenient date parsing, and small
//! formatting helpers shared by the classifier and the command handlers.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::LoadError;
use crate::task::{ProjectId, TaskRecord};

/// Every task column the loader understands, in export order.
pub const TASK_COLUMNS: [&str; 11] = [
    "project_id",
    "project_name",
    "process",
    "line",
    "task_id",
    "task_name",
    "task_status",
    "task_milestone",
    "task_start_date",
    "task_finish_date",
    "created_at",
];

/// Columns joined in from the companion projects table.
pub const PROJECT_COLUMNS: [&str; 2] = ["project_path", "ganttchart_path"];

/// Columns the aggregator cannot work without.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "project_id",
    "project_name",
    "task_id",
    "task_status",
    "task_start_date",
    "task_finish_date",
];

pub const DATE_COLUMNS: [&str; 3] = ["task_start_date", "task_finish_date", "created_at"];

/// Outcome of loading a dashboard export.
pub type LoadResult = Result<RecordSet, LoadError>;

/// Normalized task rows plus what the loader learned about their source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordSet {
    pub source: PathBuf,
    pub encoding: String,
    /// Known columns that were present in the source (and joined table).
    pub columns: Vec<String>,
    pub projects_joined: bool,
    pub tasks: Vec<TaskRecord>,
}

impl RecordSet {
    /// Wrap in-memory tasks as if every task column had been present.
    pub fn from_tasks(tasks: Vec<TaskRecord>) -> Self {
        RecordSet {
            source: PathBuf::new(),
            encoding: "utf-8".to_string(),
            columns: TASK_COLUMNS.iter().map(|c| c.to_string()).collect(),
            projects_joined: false,
            tasks,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Required columns absent from the source, in canonical order.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.has_column(c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Distinct project ids, sorted.
    pub fn project_ids(&self) -> BTreeSet<ProjectId> {
        self.tasks.iter().map(|t| t.project_id.clone()).collect()
    }

    /// Tasks belonging to one project, in source order.
    pub fn tasks_for<'a>(&'a self, project_id: &'a ProjectId) -> impl Iterator<Item = &'a TaskRecord> + 'a {
        self.tasks.iter().filter(move |t| &t.project_id == project_id)
    }
}

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Parse a date cell leniently.
///
/// Accepts ISO and slash/dot separated dates, with or without a time of day,
/// compact `YYYYMMDD`, and RFC 3339. Blank cells, spreadsheet null markers and
/// anything unrecognised yield `None`.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() || matches!(s, "NaT" | "NaN" | "nan" | "None" | "null" | "-") {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }

    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_time(NaiveTime::MIN));
    }

    None
}

/// Render a signed day count as `+Nd`, `-Nd` or `today`.
pub fn format_days_offset(days: i64) -> String {
    match days {
        0 => "today".into(),
        d if d > 0 => format!("+{d}d"),
        d => format!("{d}d"),
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}
