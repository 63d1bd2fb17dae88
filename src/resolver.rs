//! Source file discovery for the dashboard export.
//!
//! The resolver walks a ranked list of candidate locations and falls back to
//! writing a small sample dataset, so downstream stages always get a readable
//! file. The first successful resolution is remembered until `reset`.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;

pub const DASHBOARD_FILE_NAME: &str = "dashboard.csv";
pub const SAMPLE_DASHBOARD_FILE_NAME: &str = "sample_dashboard.csv";
pub const SAMPLE_PROJECTS_FILE_NAME: &str = "sample_projects.csv";

pub const ENV_DASHBOARD_FILE: &str = "PMSUITE_DASHBOARD_FILE";
pub const ENV_DATA_DIR: &str = "PMSUITE_DASHBOARD_DATA_DIR";
pub const ENV_APP_PATH: &str = "APP_PATH";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where to look for the export, highest priority first.
#[derive(Debug, Clone, Default)]
pub struct SearchHints {
    /// Explicit file from config or `PMSUITE_DASHBOARD_FILE`.
    pub override_path: Option<PathBuf>,
    /// Application bundle root (`APP_PATH`).
    pub app_path: Option<PathBuf>,
    /// Directory holding `dashboard.csv` (`PMSUITE_DASHBOARD_DATA_DIR`).
    pub data_dir: Option<PathBuf>,
    /// Common user-folder locations, already pointing at a file.
    pub user_candidates: Vec<PathBuf>,
    pub sample_dir: PathBuf,
}

impl SearchHints {
    /// Build hints from the config plus the process environment.
    pub fn from_env(config: &DashboardConfig) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let env_path = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        let override_path = config
            .source_file
            .clone()
            .or_else(|| env_path(ENV_DASHBOARD_FILE))
            .map(|p| if p.is_relative() { cwd.join(p) } else { p });

        let exports = |root: &Path| root.join("data").join("exports").join(DASHBOARD_FILE_NAME);
        let mut user_candidates = vec![exports(&cwd)];
        if let Some(parent) = cwd.parent() {
            user_candidates.push(exports(parent));
        }
        user_candidates.push(exports(&cwd.join("ProjectManager")));
        if let Some(documents) = dirs::document_dir() {
            user_candidates.push(exports(&documents.join("ProjectManager")));
        }

        SearchHints {
            override_path,
            app_path: env_path(ENV_APP_PATH),
            data_dir: env_path(ENV_DATA_DIR),
            user_candidates,
            sample_dir: config.sample_dir(),
        }
    }

    /// Every candidate file in priority order, duplicates removed.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::new();
        let mut push = |p: PathBuf| {
            if !p.as_os_str().is_empty() && !out.contains(&p) {
                out.push(p);
            }
        };

        if let Some(p) = &self.override_path {
            push(p.clone());
        }
        if let Some(app) = &self.app_path {
            push(app.join("data").join("exports").join(DASHBOARD_FILE_NAME));
        }
        if let Some(dir) = &self.data_dir {
            push(dir.join(DASHBOARD_FILE_NAME));
        }
        for p in &self.user_candidates {
            push(p.clone());
        }
        out
    }
}

/// Finds the dashboard export and remembers the answer.
#[derive(Debug)]
pub struct PathResolver {
    hints: SearchHints,
    resolved: Mutex<Option<PathBuf>>,
}

impl PathResolver {
    pub fn new(hints: SearchHints) -> Self {
        PathResolver {
            hints,
            resolved: Mutex::new(None),
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(SearchHints::from_env(config))
    }

    pub fn hints(&self) -> &SearchHints {
        &self.hints
    }

    /// The remembered resolution, if any.
    pub fn cached(&self) -> Option<PathBuf> {
        self.resolved.lock().clone()
    }

    /// Forget the remembered resolution.
    pub fn reset(&self) {
        *self.resolved.lock() = None;
    }

    /// Locate the export, writing the sample dataset as a last resort.
    pub fn resolve(&self) -> PathBuf {
        let mut resolved = self.resolved.lock();
        if let Some(path) = resolved.as_ref() {
            return path.clone();
        }

        let candidates = self.hints.candidates();
        for path in &candidates {
            debug!(path = %path.display(), "checking dashboard candidate");
            if path.is_file() {
                info!(path = %path.display(), "dashboard file found");
                *resolved = Some(path.clone());
                return path.clone();
            }
        }

        warn!(tried = ?candidates, "no dashboard file found, generating sample data");
        let today = Local::now().date_naive();
        match write_sample_dataset(&self.hints.sample_dir, today) {
            Ok(path) => {
                info!(path = %path.display(), "sample data written");
                *resolved = Some(path.clone());
                path
            }
            Err(e) => {
                warn!(dir = %self.hints.sample_dir.display(), error = %e, "failed to write sample data");
                candidates
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| self.hints.sample_dir.join(SAMPLE_DASHBOARD_FILE_NAME))
            }
        }
    }
}

/// Write the sample task and project tables into `dir`.
///
/// Dates are relative to `today`, so the sample always shows a mix of
/// finished, running and upcoming work. Returns the task table path.
pub fn write_sample_dataset(dir: &Path, today: NaiveDate) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let dashboard_path = dir.join(SAMPLE_DASHBOARD_FILE_NAME);
    let projects_path = dir.join(SAMPLE_PROJECTS_FILE_NAME);
    let offset = |days: i64| (today + Duration::days(days)).format("%Y-%m-%d").to_string();

    let tasks = [
        ("P001", "サンプルプロジェクト1", "設計", "A", "T001", "要件定義", "完了", "○", -30, -25),
        ("P001", "サンプルプロジェクト1", "設計", "A", "T002", "基本設計", "完了", "", -20, -10),
        ("P002", "サンプルプロジェクト2", "開発", "B", "T003", "コーディング", "完了", "○", -15, -5),
        ("P002", "サンプルプロジェクト2", "開発", "B", "T004", "テスト", "進行中", "", -5, 5),
        ("P002", "サンプルプロジェクト2", "開発", "B", "T005", "リリース", "未着手", "○", 10, 20),
    ];

    let mut file = File::create(&dashboard_path)?;
    file.write_all(UTF8_BOM)?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record([
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
    ])?;
    for (pid, pname, process, line, tid, tname, status, milestone, start, finish) in tasks {
        let created = if pid == "P001" { offset(-40) } else { offset(-30) };
        wtr.write_record([
            pid,
            pname,
            process,
            line,
            tid,
            tname,
            status,
            milestone,
            offset(start).as_str(),
            offset(finish).as_str(),
            created.as_str(),
        ])?;
    }
    wtr.flush()?;

    let mut file = File::create(&projects_path)?;
    file.write_all(UTF8_BOM)?;
    let mut wtr = csv::Writer::from_writer(file);
    let dir_str = dir.to_string_lossy();
    let chart_str = dashboard_path.to_string_lossy();
    wtr.write_record(["project_id", "project_path", "ganttchart_path"])?;
    for pid in ["P001", "P002"] {
        wtr.write_record([pid, dir_str.as_ref(), chart_str.as_ref()])?;
    }
    wtr.flush()?;

    Ok(dashboard_path)
}
