//! Project rollups and dashboard metrics.
//!
//! `rollup` groups task rows by normalized project id and derives one
//! `ProjectRollup` per group. Large inputs are aggregated on the rayon pool;
//! both paths emit rows sorted by project id, so their output is identical.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDateTime};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::classify::delayed_project_ids;
use crate::fields::{DurationBucket, ProgressBucket, StatusTone};
use crate::project::ProjectRollup;
use crate::records::{LoadResult, RecordSet};
use crate::task::{ProjectId, StatusRules, TaskRecord};

/// Project name on the row standing in for a failed load.
pub const LOAD_ERROR_NAME: &str = "error";
/// Project name on the row standing in for unusable input columns.
pub const DATA_ERROR_NAME: &str = "data error";

/// Roll up a load outcome. A load error becomes a single diagnostic row.
pub fn rollup(loaded: &LoadResult, rules: &StatusRules, parallel_threshold: usize) -> Vec<ProjectRollup> {
    match loaded {
        Ok(records) => rollup_records(records, rules, parallel_threshold),
        Err(e) => {
            error!(error = %e, "cannot aggregate, data failed to load");
            vec![ProjectRollup::diagnostic(LOAD_ERROR_NAME, e.to_string())]
        }
    }
}

/// Roll up a record set, one row per distinct project id.
pub fn rollup_records(records: &RecordSet, rules: &StatusRules, parallel_threshold: usize) -> Vec<ProjectRollup> {
    let missing = records.missing_columns();
    if !missing.is_empty() {
        warn!(missing = ?missing, "required columns missing, returning diagnostic row");
        return vec![ProjectRollup::diagnostic(
            DATA_ERROR_NAME,
            format!("missing columns: {}", missing.join(", ")),
        )];
    }

    let mut groups: BTreeMap<&ProjectId, Vec<&TaskRecord>> = BTreeMap::new();
    for task in &records.tasks {
        groups.entry(&task.project_id).or_default().push(task);
    }
    let groups: Vec<(&ProjectId, Vec<&TaskRecord>)> = groups.into_iter().collect();

    if groups.len() > parallel_threshold {
        debug!(projects = groups.len(), "aggregating in parallel");
        groups
            .par_iter()
            .map(|(id, tasks)| aggregate_group(id, tasks, rules))
            .collect()
    } else {
        debug!(projects = groups.len(), "aggregating sequentially");
        groups
            .iter()
            .map(|(id, tasks)| aggregate_group(id, tasks, rules))
            .collect()
    }
}

fn first_text<'a>(tasks: &[&'a TaskRecord], field: impl Fn(&'a TaskRecord) -> &'a str) -> String {
    tasks
        .iter()
        .map(|t| field(*t))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn first_path<'a>(tasks: &[&'a TaskRecord], field: impl Fn(&'a TaskRecord) -> &'a Option<String>) -> Option<String> {
    tasks.iter().find_map(|t| field(*t).clone())
}

fn aggregate_group(project_id: &ProjectId, tasks: &[&TaskRecord], rules: &StatusRules) -> ProjectRollup {
    let mut rollup = ProjectRollup::empty(project_id.clone());
    rollup.project_name = first_text(tasks, |t| t.project_name.as_str());
    rollup.process = first_text(tasks, |t| t.process.as_str());
    rollup.line = first_text(tasks, |t| t.line.as_str());
    rollup.project_path = first_path(tasks, |t| &t.project_path);
    rollup.ganttchart_path = first_path(tasks, |t| &t.ganttchart_path);

    rollup.total_tasks = tasks.len();
    rollup.completed_tasks = tasks.iter().filter(|t| t.is_done(rules)).count();
    rollup.milestone_count = tasks.iter().filter(|t| t.is_milestone(rules)).count();
    rollup.start_date = tasks.iter().filter_map(|t| t.task_start_date).min();
    rollup.end_date = tasks.iter().filter_map(|t| t.task_finish_date).max();
    rollup.finalize();
    rollup
}

/// Set `has_delay` on every rollup whose project is in `delayed`.
pub fn mark_delays(rollups: &mut [ProjectRollup], delayed: &BTreeSet<ProjectId>) {
    for rollup in rollups.iter_mut().filter(|r| !r.diagnostic) {
        rollup.has_delay = delayed.contains(&rollup.project_id);
    }
}

/// Colour tone for a project row.
pub fn status_tone(progress: f64, has_delay: bool) -> StatusTone {
    if has_delay {
        StatusTone::Danger
    } else if progress >= 90.0 {
        StatusTone::Success
    } else if progress >= 70.0 {
        StatusTone::Info
    } else if progress >= 50.0 {
        StatusTone::Warning
    } else {
        StatusTone::Neutral
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub total_projects: usize,
    /// Projects below 100% progress.
    pub active_projects: usize,
    pub delayed_projects: usize,
    /// Projects with a milestone due in the current calendar month.
    pub milestone_projects: usize,
}

/// Histogram with parallel label and count vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub ranges: Vec<&'static str>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub summary: MetricsSummary,
    pub progress_distribution: Distribution,
    pub duration_distribution: Distribution,
    pub generated_at: NaiveDateTime,
}

/// Summary numbers and histograms for the dashboard header.
///
/// Diagnostic rows are not projects and are left out of every count.
pub fn dashboard_metrics(
    rollups: &[ProjectRollup],
    records: &RecordSet,
    now: NaiveDateTime,
    rules: &StatusRules,
) -> DashboardMetrics {
    let today = now.date();
    let projects: Vec<&ProjectRollup> = rollups.iter().filter(|r| !r.diagnostic).collect();

    let milestone_projects: BTreeSet<&ProjectId> = records
        .tasks
        .iter()
        .filter(|t| t.is_milestone(rules))
        .filter(|t| {
            t.finish_day()
                .is_some_and(|d| d.year() == today.year() && d.month() == today.month())
        })
        .map(|t| &t.project_id)
        .collect();

    let summary = MetricsSummary {
        total_projects: projects.len(),
        active_projects: projects.iter().filter(|r| r.progress < 100.0).count(),
        delayed_projects: delayed_project_ids(records, today, rules).len(),
        milestone_projects: milestone_projects.len(),
    };

    let progress_distribution = Distribution {
        ranges: ProgressBucket::ALL.iter().map(|b| b.label()).collect(),
        counts: ProgressBucket::ALL
            .iter()
            .map(|b| projects.iter().filter(|r| ProgressBucket::for_progress(r.progress) == *b).count())
            .collect(),
    };
    let duration_distribution = Distribution {
        ranges: DurationBucket::ALL.iter().map(|b| b.label()).collect(),
        counts: DurationBucket::ALL
            .iter()
            .map(|b| projects.iter().filter(|r| DurationBucket::for_days(r.duration) == *b).count())
            .collect(),
    };

    DashboardMetrics {
        summary,
        progress_distribution,
        duration_distribution,
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use std::path::PathBuf;

    fn base() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn task(pid: &str, tid: &str, status: &str, start: i64, finish: i64) -> TaskRecord {
        let mut t = TaskRecord::new(pid, tid, tid);
        t.project_name = format!("Project {pid}");
        t.task_status = status.to_string();
        t.task_start_date = Some((base() + Duration::days(start)).and_time(NaiveTime::MIN));
        t.task_finish_date = Some((base() + Duration::days(finish)).and_time(NaiveTime::MIN));
        t
    }

    #[test]
    fn test_half_complete_project() {
        let rules = StatusRules::default();
        let set = RecordSet::from_tasks(vec![
            task("P1", "T1", "完了", 0, 5),
            task("P1", "T2", "完了", 5, 10),
            task("P1", "T3", "進行中", 10, 20),
            task("P1", "T4", "未着手", 20, 40),
        ]);
        let rows = rollup_records(&set, &rules, 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_tasks, 4);
        assert_eq!(rows[0].completed_tasks, 2);
        assert_eq!(rows[0].progress, 50.0);
        assert_eq!(rows[0].duration, 40);
        assert_eq!(rows[0].project_name, "Project P1");
    }

    #[test]
    fn test_numeric_ids_group_together() {
        let rules = StatusRules::default();
        let set = RecordSet::from_tasks(vec![
            task("1", "T1", "完了", 0, 1),
            task("1.0", "T2", "", 0, 1),
            task("P2", "T3", "", 0, 1),
        ]);
        let rows = rollup_records(&set, &rules, 10);
        let ids: Vec<&str> = rows.iter().map(|r| r.project_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "P2"]);
        assert_eq!(rows[0].total_tasks, 2);
    }

    #[test]
    fn test_undated_tasks_give_zero_duration() {
        let mut t = TaskRecord::new("P1", "T1", "x");
        t.task_status = "完了".into();
        let set = RecordSet::from_tasks(vec![t]);
        let rows = rollup_records(&set, &StatusRules::default(), 10);
        assert_eq!(rows[0].duration, 0);
        assert_eq!(rows[0].progress, 100.0);
        assert!(rows[0].start_date.is_none());
    }

    #[test]
    fn test_empty_input_gives_empty_rollup() {
        let rows = rollup_records(&RecordSet::from_tasks(Vec::new()), &StatusRules::default(), 10);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_columns_give_data_error_row() {
        let mut set = RecordSet::from_tasks(vec![task("P1", "T1", "", 0, 1)]);
        set.columns.retain(|c| c != "task_status");
        let rows = rollup_records(&set, &StatusRules::default(), 10);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].diagnostic);
        assert_eq!(rows[0].project_name, DATA_ERROR_NAME);
        assert!(rows[0].message.as_deref().unwrap().contains("task_status"));
    }

    #[test]
    fn test_load_error_gives_error_row() {
        let loaded: LoadResult = Err(LoadError::NotFound { path: PathBuf::from("/x/dashboard.csv") });
        let rows = rollup(&loaded, &StatusRules::default(), 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].project_name, LOAD_ERROR_NAME);
        assert_eq!(rows[0].progress, 0.0);
        assert_eq!(rows[0].duration, 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let rules = StatusRules::default();
        let tasks = (0..40)
            .flat_map(|p| {
                (0..3).map(move |i| {
                    let status = if (p + i) % 2 == 0 { "完了" } else { "進行中" };
                    task(&format!("P{p:03}"), &format!("T{i}"), status, i, 10 * (p + 1))
                })
            })
            .collect();
        let set = RecordSet::from_tasks(tasks);

        let sequential = rollup_records(&set, &rules, usize::MAX);
        let parallel = rollup_records(&set, &rules, 0);
        assert_eq!(sequential.len(), 40);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_mark_delays_and_tone() {
        let rules = StatusRules::default();
        let set = RecordSet::from_tasks(vec![
            task("P1", "T1", "進行中", -10, -1),
            task("P2", "T2", "完了", -10, -1),
        ]);
        let mut rows = rollup_records(&set, &rules, 10);
        mark_delays(&mut rows, &delayed_project_ids(&set, base(), &rules));
        assert!(rows[0].has_delay);
        assert!(!rows[1].has_delay);

        assert_eq!(status_tone(rows[0].progress, rows[0].has_delay), StatusTone::Danger);
        assert_eq!(status_tone(rows[1].progress, rows[1].has_delay), StatusTone::Success);
        assert_eq!(status_tone(75.0, false), StatusTone::Info);
        assert_eq!(status_tone(50.0, false), StatusTone::Warning);
        assert_eq!(status_tone(10.0, false), StatusTone::Neutral);
    }

    #[test]
    fn test_dashboard_metrics() {
        let rules = StatusRules::default();
        let mut milestone = task("P2", "M1", "", 0, 5);
        milestone.task_milestone = "○".into();
        let set = RecordSet::from_tasks(vec![
            task("P1", "T1", "完了", -100, -50),
            task("P2", "T2", "進行中", -10, -1),
            milestone,
        ]);
        let rows = rollup_records(&set, &rules, 10);
        let now = base().and_hms_opt(12, 0, 0).unwrap();
        let metrics = dashboard_metrics(&rows, &set, now, &rules);

        assert_eq!(metrics.summary.total_projects, 2);
        assert_eq!(metrics.summary.active_projects, 1);
        assert_eq!(metrics.summary.delayed_projects, 1);
        assert_eq!(metrics.summary.milestone_projects, 1);
        assert_eq!(metrics.progress_distribution.ranges[4], "100%");
        assert_eq!(metrics.progress_distribution.counts, vec![1, 0, 0, 0, 1]);
        assert_eq!(metrics.duration_distribution.counts, vec![1, 1, 0, 0, 0]);
        assert_eq!(metrics.generated_at, now);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn progress_stays_in_bounds(statuses in proptest::collection::vec(any::<bool>(), 0..30)) {
                let tasks = statuses
                    .iter()
                    .enumerate()
                    .map(|(i, done)| task(&format!("P{}", i % 4), &format!("T{i}"), if *done { "完了" } else { "" }, 0, 1))
                    .collect();
                let rows = rollup_records(&RecordSet::from_tasks(tasks), &StatusRules::default(), 10);
                for row in rows {
                    prop_assert!(row.progress >= 0.0 && row.progress <= 100.0);
                    prop_assert!(row.duration >= 0);
                    if row.total_tasks == 0 {
                        prop_assert_eq!(row.progress, 0.0);
                    }
                }
            }
        }
    }
}
