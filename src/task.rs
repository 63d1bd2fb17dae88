//! Task record data structure and project id normalization.
//!
//! This module defines the `TaskRecord` struct that represents one row of the
//! dashboard export, the normalized `ProjectId` every join and lookup goes
//! through, and the `StatusRules` that decide what "done" and "milestone" mean
//! for a given export.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Status value that marks a task as finished in the default export.
pub const DEFAULT_DONE_STATUS: &str = "完了";

/// Marker that flags a task as a milestone in the default export.
pub const DEFAULT_MILESTONE_MARKER: &str = "○";

/// A project identifier in its canonical string form.
///
/// Exports store ids either as text (`P001`) or as numbers (`1`, `1.0`).
/// Normalization happens once, when the value enters the pipeline, so every
/// later comparison is a plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Build a project id from a raw cell value.
    pub fn new(raw: &str) -> Self {
        ProjectId(normalize_project_id(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(raw: &str) -> Self {
        ProjectId::new(raw)
    }
}

/// Canonicalize a project id cell.
///
/// Surrounding whitespace is dropped. Integer-looking values, including the
/// float rendering spreadsheets produce (`"1.0"`), collapse to their plain
/// integer form. Anything else is kept verbatim. The function is idempotent.
pub fn normalize_project_id(raw: &str) -> String {
    let trimmed = raw.trim();
    canonical_integer(trimmed).unwrap_or_else(|| trimmed.to_string())
}

fn canonical_integer(s: &str) -> Option<String> {
    let (int_part, frac) = s.split_once('.').unwrap_or((s, ""));
    if !frac.bytes().all(|b| b == b'0') {
        return None;
    }

    let (negative, digits) = match int_part.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, int_part.strip_prefix('+').unwrap_or(int_part)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let significant = digits.trim_start_matches('0');
    let significant = if significant.is_empty() { "0" } else { significant };
    if negative && significant != "0" {
        Some(format!("-{significant}"))
    } else {
        Some(significant.to_string())
    }
}

/// Export-specific vocabulary for completion and milestone flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRules {
    pub done_status: String,
    pub milestone_marker: String,
}

impl Default for StatusRules {
    fn default() -> Self {
        StatusRules {
            done_status: DEFAULT_DONE_STATUS.to_string(),
            milestone_marker: DEFAULT_MILESTONE_MARKER.to_string(),
        }
    }
}

/// One task row after ingest, with the optional project columns joined in.
///
/// Dates are parsed leniently; an unparseable or missing cell is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub project_id: ProjectId,
    pub project_name: String,
    pub process: String,
    pub line: String,
    pub task_id: String,
    pub task_name: String,
    pub task_status: String,
    pub task_milestone: String,
    pub task_start_date: Option<NaiveDateTime>,
    pub task_finish_date: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub project_path: Option<String>,
    pub ganttchart_path: Option<String>,
}

impl TaskRecord {
    /// An otherwise blank task belonging to `project_id`.
    pub fn new(project_id: &str, task_id: &str, task_name: &str) -> Self {
        TaskRecord {
            project_id: ProjectId::new(project_id),
            project_name: String::new(),
            process: String::new(),
            line: String::new(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            task_status: String::new(),
            task_milestone: String::new(),
            task_start_date: None,
            task_finish_date: None,
            created_at: None,
            project_path: None,
            ganttchart_path: None,
        }
    }

    pub fn is_done(&self, rules: &StatusRules) -> bool {
        self.task_status.trim() == rules.done_status
    }

    pub fn is_milestone(&self, rules: &StatusRules) -> bool {
        !rules.milestone_marker.is_empty() && self.task_milestone.contains(&rules.milestone_marker)
    }

    /// Calendar day the task starts on, time of day dropped.
    pub fn start_day(&self) -> Option<NaiveDate> {
        self.task_start_date.map(|d| d.date())
    }

    /// Calendar day the task is due, time of day dropped.
    pub fn finish_day(&self) -> Option<NaiveDate> {
        self.task_finish_date.map(|d| d.date())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_project_id() {
        assert_eq!(normalize_project_id("P001"), "P001");
        assert_eq!(normalize_project_id("  P001 "), "P001");
        assert_eq!(normalize_project_id("1"), "1");
        assert_eq!(normalize_project_id("1.0"), "1");
        assert_eq!(normalize_project_id("001"), "1");
        assert_eq!(normalize_project_id("+7"), "7");
        assert_eq!(normalize_project_id("-0"), "0");
        assert_eq!(normalize_project_id("1.5"), "1.5");
        assert_eq!(normalize_project_id("1e3"), "1e3");
        assert_eq!(normalize_project_id(""), "");
    }

    #[test]
    fn test_numeric_and_text_ids_compare_equal_after_normalization() {
        assert_eq!(ProjectId::new("12"), ProjectId::new("12.00"));
        assert_eq!(ProjectId::new(" 12 "), ProjectId::from("12"));
        assert_ne!(ProjectId::new("P12"), ProjectId::new("12"));
    }

    #[test]
    fn test_status_rules() {
        let rules = StatusRules::default();
        let mut task = TaskRecord::new("P001", "T1", "design");
        assert!(!task.is_done(&rules));
        task.task_status = "完了".into();
        assert!(task.is_done(&rules));

        assert!(!task.is_milestone(&rules));
        task.task_milestone = " ○ ".into();
        assert!(task.is_milestone(&rules));

        let blank_marker = StatusRules {
            milestone_marker: String::new(),
            ..StatusRules::default()
        };
        assert!(!task.is_milestone(&blank_marker));
    }

    mod props {
        use super::super::normalize_project_id;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalization_is_idempotent(raw in "[ +-]?[0-9A-Za-z.]{0,8} ?") {
                let once = normalize_project_id(&raw);
                prop_assert_eq!(normalize_project_id(&once), once);
            }

            #[test]
            fn numeric_forms_agree(n in 0u32..1_000_000) {
                prop_assert_eq!(normalize_project_id(&n.to_string()), normalize_project_id(&format!("{n}.0")));
            }
        }
    }
}
