//! Temporal classification of tasks.
//!
//! Every function here is pure: it takes the loaded records, the status rules
//! and the calendar day to treat as "today", and never reads the clock
//! itself. Callers capture today once per request and pass it down.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::records::{format_days_offset, RecordSet};
use crate::task::{ProjectId, StatusRules, TaskRecord};

/// A task reference for the recent-tasks panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskPointer {
    pub name: String,
    /// Signed day distance whose meaning depends on the slot.
    pub days_offset: i64,
}

/// Per-project snapshot of what is late, running and coming up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecentTasks {
    /// Earliest-due overdue task; offset is days overdue.
    pub delayed: Option<TaskPointer>,
    /// Earliest-due running task; offset is days remaining.
    pub in_progress: Option<TaskPointer>,
    /// Soonest task not yet started; offset is days until start.
    pub next: Option<TaskPointer>,
    pub next_next: Option<TaskPointer>,
}

/// A task is delayed when its due day has passed and it is not done.
///
/// Days are compared, not timestamps, so a task due today is never delayed.
pub fn is_delayed(task: &TaskRecord, today: NaiveDate, rules: &StatusRules) -> bool {
    !task.is_done(rules) && task.finish_day().is_some_and(|finish| finish < today)
}

fn is_in_progress(task: &TaskRecord, today: NaiveDate, rules: &StatusRules) -> bool {
    if task.is_done(rules) {
        return false;
    }
    match (task.start_day(), task.finish_day()) {
        (Some(start), Some(finish)) => start <= today && today <= finish,
        _ => false,
    }
}

fn is_upcoming(task: &TaskRecord, today: NaiveDate, rules: &StatusRules) -> bool {
    !task.is_done(rules) && task.start_day().is_some_and(|start| start > today)
}

/// All delayed tasks, in source order.
pub fn find_delayed_tasks(records: &RecordSet, today: NaiveDate, rules: &StatusRules) -> Vec<TaskRecord> {
    records
        .tasks
        .iter()
        .filter(|t| is_delayed(t, today, rules))
        .cloned()
        .collect()
}

/// Distinct projects that have at least one delayed task.
pub fn delayed_project_ids(records: &RecordSet, today: NaiveDate, rules: &StatusRules) -> BTreeSet<ProjectId> {
    records
        .tasks
        .iter()
        .filter(|t| is_delayed(t, today, rules))
        .map(|t| t.project_id.clone())
        .collect()
}

pub fn delayed_projects_count(records: &RecordSet, today: NaiveDate, rules: &StatusRules) -> usize {
    delayed_project_ids(records, today, rules).len()
}

/// Milestone tasks sorted by finish date, earliest first.
///
/// Without `include_past` only milestones due today or later are returned.
/// With it, every dated milestone is. Milestones without a finish date are
/// never returned. There is no automatic fallback between the two modes.
pub fn find_next_milestone(
    records: &RecordSet,
    today: NaiveDate,
    include_past: bool,
    rules: &StatusRules,
) -> Vec<TaskRecord> {
    let mut milestones: Vec<TaskRecord> = records
        .tasks
        .iter()
        .filter(|t| t.is_milestone(rules))
        .filter(|t| match t.finish_day() {
            Some(finish) => include_past || finish >= today,
            None => false,
        })
        .cloned()
        .collect();
    milestones.sort_by_key(|t| t.task_finish_date);
    milestones
}

/// The milestone to show for one project.
///
/// The earliest upcoming milestone, or when `include_past` is set and none is
/// upcoming, the most recent past one.
pub fn next_milestone_for(
    records: &RecordSet,
    project_id: &ProjectId,
    today: NaiveDate,
    include_past: bool,
    rules: &StatusRules,
) -> Option<TaskRecord> {
    let mut dated: Vec<&TaskRecord> = records
        .tasks_for(project_id)
        .filter(|t| t.is_milestone(rules) && t.task_finish_date.is_some())
        .collect();
    dated.sort_by_key(|t| t.task_finish_date);

    let upcoming = dated
        .iter()
        .find(|t| t.finish_day().is_some_and(|d| d >= today));
    match upcoming {
        Some(task) => Some((*task).clone()),
        None if include_past => dated.last().map(|t| (*t).clone()),
        None => None,
    }
}

/// Render a milestone as `name (+Nd)`, `name (-Nd)` or `name (today)`.
pub fn format_milestone_label(milestone: Option<&TaskRecord>, today: NaiveDate) -> String {
    let Some(task) = milestone else {
        return "-".to_string();
    };
    match task.finish_day() {
        Some(finish) => {
            let days = (finish - today).num_days();
            format!("{} ({})", task.task_name, format_days_offset(days))
        }
        None => format!("{} (date unknown)", task.task_name),
    }
}

/// Build the delayed / in-progress / next / next-next panel for a project.
pub fn recent_tasks_snapshot(
    records: &RecordSet,
    project_id: &ProjectId,
    today: NaiveDate,
    rules: &StatusRules,
) -> RecentTasks {
    let tasks: Vec<&TaskRecord> = records.tasks_for(project_id).collect();

    let delayed = tasks
        .iter()
        .filter(|t| is_delayed(t, today, rules))
        .filter_map(|t| t.finish_day().map(|finish| (finish, *t)))
        .min_by_key(|(finish, _)| *finish)
        .map(|(finish, t)| TaskPointer {
            name: t.task_name.clone(),
            days_offset: (today - finish).num_days(),
        });

    let in_progress = tasks
        .iter()
        .filter(|t| is_in_progress(t, today, rules))
        .filter_map(|t| t.finish_day().map(|finish| (finish, *t)))
        .min_by_key(|(finish, _)| *finish)
        .map(|(finish, t)| TaskPointer {
            name: t.task_name.clone(),
            days_offset: (finish - today).num_days(),
        });

    let mut upcoming: Vec<(NaiveDate, &TaskRecord)> = tasks
        .iter()
        .filter(|t| is_upcoming(t, today, rules))
        .filter_map(|t| t.start_day().map(|start| (start, *t)))
        .collect();
    upcoming.sort_by_key(|(start, _)| *start);
    let mut upcoming = upcoming.into_iter().map(|(start, t)| TaskPointer {
        name: t.task_name.clone(),
        days_offset: (start - today).num_days(),
    });

    RecentTasks {
        delayed,
        in_progress,
        next: upcoming.next(),
        next_next: upcoming.next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn task(pid: &str, tid: &str, status: &str, start: i64, finish: i64) -> TaskRecord {
        let mut t = TaskRecord::new(pid, tid, &format!("task {tid}"));
        t.task_status = status.to_string();
        t.task_start_date = Some((today() + chrono::Duration::days(start)).and_time(NaiveTime::MIN));
        t.task_finish_date = Some((today() + chrono::Duration::days(finish)).and_time(NaiveTime::MIN));
        t
    }

    fn milestone(mut t: TaskRecord) -> TaskRecord {
        t.task_milestone = "○".to_string();
        t
    }

    #[test]
    fn test_due_today_is_not_delayed() {
        let rules = StatusRules::default();
        let mut due_today = task("P1", "T1", "進行中", -3, 0);
        due_today.task_finish_date = today().and_hms_opt(23, 59, 0);
        let overdue = task("P1", "T2", "進行中", -3, -1);
        let done = task("P1", "T3", "完了", -3, -1);
        let undated = TaskRecord::new("P1", "T4", "undated");

        let set = RecordSet::from_tasks(vec![due_today, overdue, done, undated]);
        let delayed = find_delayed_tasks(&set, today(), &rules);
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].task_id, "T2");
    }

    #[test]
    fn test_delayed_project_ids_normalized() {
        let rules = StatusRules::default();
        let set = RecordSet::from_tasks(vec![
            task("1", "T1", "進行中", -5, -2),
            task("1.0", "T2", "進行中", -5, -1),
            task("P2", "T3", "完了", -5, -1),
        ]);
        let ids = delayed_project_ids(&set, today(), &rules);
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![ProjectId::new("1")]);
        assert_eq!(delayed_projects_count(&set, today(), &rules), 1);
    }

    #[test]
    fn test_find_next_milestone_toggle() {
        let rules = StatusRules::default();
        let set = RecordSet::from_tasks(vec![
            milestone(task("P1", "M3", "", 0, 10)),
            milestone(task("P1", "M1", "完了", -20, -10)),
            milestone(task("P1", "M2", "", -1, 0)),
            task("P1", "T4", "", 0, 1),
        ]);

        let upcoming = find_next_milestone(&set, today(), false, &rules);
        let ids: Vec<&str> = upcoming.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["M2", "M3"]);

        let all = find_next_milestone(&set, today(), true, &rules);
        let ids: Vec<&str> = all.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["M1", "M2", "M3"]);
    }

    #[test]
    fn test_next_milestone_for_only_falls_back_when_asked() {
        let rules = StatusRules::default();
        let set = RecordSet::from_tasks(vec![
            milestone(task("P1", "M1", "完了", -30, -20)),
            milestone(task("P1", "M2", "完了", -10, -5)),
            milestone(task("P2", "M3", "", 0, 3)),
        ]);
        let p1 = ProjectId::new("P1");

        assert_eq!(next_milestone_for(&set, &p1, today(), false, &rules), None);
        let past = next_milestone_for(&set, &p1, today(), true, &rules).unwrap();
        assert_eq!(past.task_id, "M2");

        let p2 = next_milestone_for(&set, &ProjectId::new("P2"), today(), false, &rules).unwrap();
        assert_eq!(p2.task_id, "M3");
    }

    #[test]
    fn test_format_milestone_label() {
        let ahead = task("P1", "M1", "", 0, 4);
        let behind = task("P1", "M2", "", -9, -2);
        let now = task("P1", "M3", "", -1, 0);
        let mut undated = TaskRecord::new("P1", "M4", "kickoff");
        undated.task_finish_date = None;

        assert_eq!(format_milestone_label(Some(&ahead), today()), "task M1 (+4d)");
        assert_eq!(format_milestone_label(Some(&behind), today()), "task M2 (-2d)");
        assert_eq!(format_milestone_label(Some(&now), today()), "task M3 (today)");
        assert_eq!(format_milestone_label(Some(&undated), today()), "kickoff (date unknown)");
        assert_eq!(format_milestone_label(None, today()), "-");
    }

    #[test]
    fn test_recent_tasks_snapshot() {
        let rules = StatusRules::default();
        let set = RecordSet::from_tasks(vec![
            task("P1", "late", "進行中", -10, -3),
            task("P1", "later", "進行中", -10, -1),
            task("P1", "running", "進行中", -2, 4),
            task("P1", "soon", "未着手", 2, 8),
            task("P1", "sooner", "未着手", 1, 3),
            task("P1", "eventually", "未着手", 30, 40),
            task("P1", "finished", "完了", -2, 4),
            task("P2", "other", "未着手", 1, 2),
        ]);

        let snap = recent_tasks_snapshot(&set, &ProjectId::new("P1"), today(), &rules);
        assert_eq!(snap.delayed, Some(TaskPointer { name: "task late".into(), days_offset: 3 }));
        assert_eq!(snap.in_progress, Some(TaskPointer { name: "task running".into(), days_offset: 4 }));
        assert_eq!(snap.next, Some(TaskPointer { name: "task sooner".into(), days_offset: 1 }));
        assert_eq!(snap.next_next, Some(TaskPointer { name: "task soon".into(), days_offset: 2 }));
    }

    #[test]
    fn test_recent_tasks_snapshot_unknown_project() {
        let set = RecordSet::from_tasks(vec![task("P1", "T1", "", 1, 2)]);
        let snap = recent_tasks_snapshot(&set, &ProjectId::new("nope"), today(), &StatusRules::default());
        assert_eq!(snap, RecentTasks::default());
    }
}
