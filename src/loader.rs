//! Loading of the dashboard CSV export.
//!
//! The loader reads the task table with an ordered list of candidate
//! encodings, left-joins the optional companion projects table, and coerces
//! the date columns. Every failure comes back as a `LoadError`; nothing here
//! panics on bad input.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{EncodingAttempt, LoadError};
use crate::records::{parse_date_lenient, LoadResult, RecordSet, DATE_COLUMNS, PROJECT_COLUMNS, TASK_COLUMNS};
use crate::resolver::PathResolver;
use crate::task::{ProjectId, TaskRecord};

/// A decoder the loader can try against the raw file bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// UTF-8, with a leading byte order mark stripped if present.
    Utf8Sig,
    Utf8,
    Legacy(&'static Encoding),
}

impl SourceEncoding {
    /// Look up a config label such as `utf-8-sig`, `shift_jis` or `cp932`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8-sig" | "utf8-sig" => Some(SourceEncoding::Utf8Sig),
            "utf-8" | "utf8" => Some(SourceEncoding::Utf8),
            "cp932" | "ms932" | "windows-31j" => Some(SourceEncoding::Legacy(encoding_rs::SHIFT_JIS)),
            "latin1" | "latin-1" => Some(SourceEncoding::Legacy(encoding_rs::WINDOWS_1252)),
            _ => Encoding::for_label(normalized.as_bytes())
                .or_else(|| Encoding::for_label(label.trim().as_bytes()))
                .map(SourceEncoding::Legacy),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceEncoding::Utf8Sig => "utf-8-sig",
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Legacy(enc) => enc.name(),
        }
    }

    /// Decode the whole buffer, refusing any malformed sequence.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, String> {
        match self {
            SourceEncoding::Utf8Sig => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
                std::str::from_utf8(body)
                    .map(Cow::Borrowed)
                    .map_err(|e| e.to_string())
            }
            SourceEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| e.to_string()),
            SourceEncoding::Legacy(enc) => enc
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| "malformed byte sequence".to_string()),
        }
    }
}

/// Resolve config labels, skipping unknown ones.
pub fn resolve_encodings(labels: &[String]) -> Vec<SourceEncoding> {
    let mut out = Vec::new();
    for label in labels {
        match SourceEncoding::from_label(label) {
            Some(enc) if !out.contains(&enc) => out.push(enc),
            Some(_) => {}
            None => warn!(label = %label, "unknown encoding label in config, skipping"),
        }
    }
    if out.is_empty() {
        out = vec![
            SourceEncoding::Utf8Sig,
            SourceEncoding::Utf8,
            SourceEncoding::Legacy(encoding_rs::SHIFT_JIS),
            SourceEncoding::Legacy(encoding_rs::EUC_JP),
        ];
    }
    out
}

/// Path of the companion projects table for a task table.
///
/// `dashboard.csv` pairs with `projects.csv`, `sample_dashboard.csv` with
/// `sample_projects.csv`; any other name pairs with `projects.csv` alongside.
pub fn companion_path(dashboard: &Path) -> PathBuf {
    let dir = dashboard.parent().unwrap_or_else(|| Path::new(""));
    let name = dashboard
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.contains("dashboard") {
        dir.join(name.replace("dashboard", "projects"))
    } else {
        dir.join("projects.csv")
    }
}

/// The file a load of `path` will actually read.
///
/// An existing `path` is used as is; an absent or missing one goes through
/// the resolver, which may generate the sample dataset.
pub fn source_path(path: Option<&Path>, resolver: &PathResolver) -> PathBuf {
    match path {
        Some(p) if p.exists() => p.to_path_buf(),
        Some(p) => {
            warn!(path = %p.display(), "requested data file does not exist, resolving a fallback");
            resolver.resolve()
        }
        None => resolver.resolve(),
    }
}

/// A decoded CSV table: header names plus raw rows.
#[derive(Debug, Default)]
struct Table {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl Table {
    fn index_of(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }
}

fn parse_table(text: &str) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok(Table { headers, rows })
}

/// Column lookup for one table, resolved once per load.
struct Columns {
    index: HashMap<&'static str, usize>,
}

impl Columns {
    fn new(table: &Table, names: &[&'static str]) -> Self {
        let index = names
            .iter()
            .filter_map(|&name| table.index_of(name).map(|i| (name, i)))
            .collect();
        Columns { index }
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.index
            .get(name)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
    }

    fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(s.to_string())
    }
}

/// Reads task exports into `RecordSet`s.
#[derive(Debug, Clone)]
pub struct TabularLoader {
    encodings: Vec<SourceEncoding>,
}

impl Default for TabularLoader {
    fn default() -> Self {
        Self::new(resolve_encodings(&[]))
    }
}

impl TabularLoader {
    pub fn new(encodings: Vec<SourceEncoding>) -> Self {
        TabularLoader { encodings }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(resolve_encodings(&config.encodings))
    }

    /// Load from `path`, or from whatever the resolver finds when `path` is
    /// absent or does not exist.
    pub fn load_source(&self, path: Option<&Path>, resolver: &PathResolver) -> LoadResult {
        self.load(&source_path(path, resolver))
    }

    /// Load one task table and its companion projects table.
    pub fn load(&self, path: &Path) -> LoadResult {
        info!(path = %path.display(), "loading dashboard data");
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound { path: path.to_path_buf() },
            _ => LoadError::Io { path: path.to_path_buf(), source: e },
        })?;

        let (table, encoding) = self.decode_table(path, &bytes)?;
        debug!(columns = ?table.headers, rows = table.rows.len(), "parsed task table");

        let columns = Columns::new(&table, &TASK_COLUMNS);
        if columns.index.is_empty() {
            return Err(LoadError::NoUsableColumns {
                path: path.to_path_buf(),
                found: table.headers,
            });
        }
        for name in DATE_COLUMNS {
            if !columns.has(name) {
                warn!(column = name, "date column missing from CSV");
            }
        }

        let mut tasks: Vec<TaskRecord> = table
            .rows
            .iter()
            .map(|row| TaskRecord {
                project_id: ProjectId::new(columns.get(row, "project_id")),
                project_name: columns.get(row, "project_name").trim().to_string(),
                process: columns.get(row, "process").trim().to_string(),
                line: columns.get(row, "line").trim().to_string(),
                task_id: columns.get(row, "task_id").trim().to_string(),
                task_name: columns.get(row, "task_name").trim().to_string(),
                task_status: columns.get(row, "task_status").trim().to_string(),
                task_milestone: columns.get(row, "task_milestone").to_string(),
                task_start_date: parse_date_lenient(columns.get(row, "task_start_date")),
                task_finish_date: parse_date_lenient(columns.get(row, "task_finish_date")),
                created_at: parse_date_lenient(columns.get(row, "created_at")),
                project_path: None,
                ganttchart_path: None,
            })
            .collect();

        if columns.has("project_id") {
            let before = tasks.len();
            tasks.retain(|t| !t.project_id.is_empty());
            let blank = before - tasks.len();
            if blank > 0 {
                warn!(rows = blank, "skipping rows without a project id");
            }
        }

        let mut present: Vec<String> = TASK_COLUMNS
            .iter()
            .filter(|c| columns.has(c))
            .map(|c| c.to_string())
            .collect();

        let projects_joined = match self.join_projects(path, encoding, &mut tasks) {
            Some(joined) => {
                present.extend(joined.into_iter().map(str::to_string));
                true
            }
            None => false,
        };

        info!(
            rows = tasks.len(),
            encoding = encoding.name(),
            projects_joined,
            "dashboard data loaded"
        );
        Ok(RecordSet {
            source: path.to_path_buf(),
            encoding: encoding.name().to_string(),
            columns: present,
            projects_joined,
            tasks,
        })
    }

    fn decode_table(&self, path: &Path, bytes: &[u8]) -> Result<(Table, SourceEncoding), LoadError> {
        let mut attempts = Vec::new();
        for &encoding in &self.encodings {
            debug!(encoding = encoding.name(), "trying encoding");
            let outcome = encoding
                .decode(bytes)
                .and_then(|text| parse_table(&text).map_err(|e| e.to_string()));
            match outcome {
                Ok(table) => {
                    info!(encoding = encoding.name(), "decoded CSV");
                    return Ok((table, encoding));
                }
                Err(reason) => attempts.push(EncodingAttempt {
                    encoding: encoding.name().to_string(),
                    reason,
                }),
            }
        }

        warn!(attempts = ?attempts, "every encoding failed");
        Err(LoadError::Decode {
            path: path.to_path_buf(),
            attempts,
        })
    }

    /// Left-join the companion projects table onto `tasks`.
    ///
    /// Returns the joined columns, or `None` when there was nothing to join.
    /// Failures here are logged and otherwise ignored.
    fn join_projects(
        &self,
        dashboard: &Path,
        encoding: SourceEncoding,
        tasks: &mut [TaskRecord],
    ) -> Option<Vec<&'static str>> {
        let path = companion_path(dashboard);
        if !path.is_file() {
            warn!(path = %path.display(), "projects file not found, continuing with task data only");
            return None;
        }

        let table = match fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                let text = encoding.decode(&bytes)?;
                parse_table(&text).map_err(|e| e.to_string())
            }) {
            Ok(table) => table,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read projects file");
                return None;
            }
        };

        let columns = Columns::new(&table, &["project_id", "project_path", "ganttchart_path"]);
        if !columns.has("project_id") {
            warn!(path = %path.display(), "projects file has no project_id column");
            return None;
        }
        if !columns.has("ganttchart_path") {
            warn!("ganttchart_path column missing from projects file");
        }

        let mut by_project: HashMap<ProjectId, (Option<String>, Option<String>)> = HashMap::new();
        for row in &table.rows {
            by_project
                .entry(ProjectId::new(columns.get(row, "project_id")))
                .or_insert_with(|| {
                    (
                        non_empty(columns.get(row, "project_path")),
                        non_empty(columns.get(row, "ganttchart_path")),
                    )
                });
        }
        info!(projects = by_project.len(), "joined projects table");

        for task in tasks.iter_mut() {
            if let Some((project_path, gantt)) = by_project.get(&task.project_id) {
                task.project_path = project_path.clone();
                task.ganttchart_path = gantt.clone();
            }
        }

        Some(PROJECT_COLUMNS.iter().copied().filter(|c| columns.has(c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::SearchHints;

    const HEADER: &str = "project_id,project_name,process,line,task_id,task_name,task_status,task_milestone,task_start_date,task_finish_date,created_at";

    #[test]
    fn test_from_label() {
        assert_eq!(SourceEncoding::from_label("utf-8-sig"), Some(SourceEncoding::Utf8Sig));
        assert_eq!(SourceEncoding::from_label("UTF_8"), Some(SourceEncoding::Utf8));
        assert_eq!(
            SourceEncoding::from_label("cp932"),
            Some(SourceEncoding::Legacy(encoding_rs::SHIFT_JIS))
        );
        assert_eq!(
            SourceEncoding::from_label("shift_jis"),
            Some(SourceEncoding::Legacy(encoding_rs::SHIFT_JIS))
        );
        assert_eq!(
            SourceEncoding::from_label("euc-jp"),
            Some(SourceEncoding::Legacy(encoding_rs::EUC_JP))
        );
        assert_eq!(SourceEncoding::from_label("klingon"), None);
    }

    #[test]
    fn test_resolve_encodings_falls_back_to_defaults() {
        let encodings = resolve_encodings(&["bogus".to_string()]);
        assert_eq!(encodings.len(), 4);
        assert_eq!(encodings[0], SourceEncoding::Utf8Sig);

        let deduped = resolve_encodings(&["cp932".to_string(), "shift_jis".to_string()]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn test_companion_path() {
        assert_eq!(
            companion_path(Path::new("/data/dashboard.csv")),
            PathBuf::from("/data/projects.csv")
        );
        assert_eq!(
            companion_path(Path::new("/tmp/sample_dashboard.csv")),
            PathBuf::from("/tmp/sample_projects.csv")
        );
        assert_eq!(
            companion_path(Path::new("/data/tasks.csv")),
            PathBuf::from("/data/projects.csv")
        );
    }

    #[test]
    fn test_utf8_sig_strips_bom() {
        let decoded = SourceEncoding::Utf8Sig.decode(b"\xEF\xBB\xBFabc").unwrap();
        assert_eq!(decoded, "abc");
        assert!(SourceEncoding::Utf8.decode(b"\xff").is_err());
    }

    #[test]
    fn test_load_parses_rows_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.csv");
        let body = format!(
            "{HEADER}\n1.0,Alpha,design,A,T1,outline,完了,○,2024-01-01,2024-01-10,2023-12-01\n1,Alpha,design,A,T2,build,進行中,,2024/01/11,not a date,\n"
        );
        fs::write(&path, body).unwrap();

        let set = TabularLoader::default().load(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.encoding, "utf-8-sig");
        assert!(!set.projects_joined);
        assert!(set.missing_columns().is_empty());
        assert_eq!(set.tasks[0].project_id, set.tasks[1].project_id);
        assert!(set.tasks[0].task_finish_date.is_some());
        assert!(set.tasks[1].task_start_date.is_some());
        assert!(set.tasks[1].task_finish_date.is_none());
        assert!(set.tasks[1].created_at.is_none());
    }

    #[test]
    fn test_rows_without_project_id_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.csv");
        let body = format!("{HEADER}\nP1,Alpha,design,A,T1,outline,完了,,2024-01-01,2024-01-10,\n,,,,,,,,,,\n , ,,,,,,,,,\n");
        fs::write(&path, body).unwrap();

        let set = TabularLoader::default().load(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.tasks[0].project_id.as_str(), "P1");

        let rows = crate::aggregate::rollup(&Ok(set), &Default::default(), 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].project_id.as_str(), "P1");
        assert_eq!(rows[0].progress, 100.0);
    }

    #[test]
    fn test_ragged_rows_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.csv");
        let body = format!("{HEADER}\nP1,Alpha,design,A,T1,outline,完了\nP2,Beta,design,A,T2,build,進行中,,2024-01-01,2024-01-10,,extra\n");
        fs::write(&path, body).unwrap();

        let set = TabularLoader::default().load(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.tasks[0].task_status, "完了");
        assert_eq!(set.tasks[0].task_milestone, "");
        assert!(set.tasks[0].task_finish_date.is_none());
        assert!(set.tasks[1].task_finish_date.is_some());
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = TabularLoader::default().load(&dir.path().join("dashboard.csv")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[test]
    fn test_missing_path_falls_back_to_sample() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(SearchHints {
            sample_dir: dir.path().join("sample"),
            ..SearchHints::default()
        });

        let set = TabularLoader::default()
            .load_source(Some(&dir.path().join("gone.csv")), &resolver)
            .unwrap();
        assert_eq!(set.len(), 5);
        assert!(set.projects_joined);
        assert_eq!(set.project_ids().len(), 2);
        assert!(set.tasks.iter().all(|t| t.project_path.is_some()));
    }

    #[test]
    fn test_load_without_known_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.csv");
        fs::write(&path, "foo,bar\n1,2\n").unwrap();

        match TabularLoader::default().load(&path) {
            Err(LoadError::NoUsableColumns { found, .. }) => assert_eq!(found, vec!["foo", "bar"]),
            other => panic!("expected NoUsableColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_load_records_missing_required_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.csv");
        fs::write(&path, "project_id,task_id,extra\nP1,T1,x\n").unwrap();

        let set = TabularLoader::default().load(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.missing_columns(),
            vec!["project_name", "task_status", "task_start_date", "task_finish_date"]
        );
    }

    #[test]
    fn test_decode_failure_lists_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.csv");
        fs::write(&path, b"project_id\n\xff\xff\xff\n").unwrap();

        match TabularLoader::default().load(&path) {
            Err(LoadError::Decode { attempts, .. }) => {
                let names: Vec<&str> = attempts.iter().map(|a| a.encoding.as_str()).collect();
                assert_eq!(names, vec!["utf-8-sig", "utf-8", "Shift_JIS", "EUC-JP"]);
            }
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_encoding_and_join() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.csv");
        let body = format!("{HEADER}\nP1,案件,設計,A,T1,要件定義,完了,○,2024-01-01,2024-01-10,\nP2,別件,開発,B,T2,実装,未着手,,2024-02-01,2024-02-10,\n");
        let (encoded, _, had_errors) = encoding_rs::SHIFT_JIS.encode(&body);
        assert!(!had_errors);
        fs::write(&path, &encoded).unwrap();

        let projects = "project_id,project_path,ganttchart_path\nP1,/work/p1,/work/p1/gantt.xlsx\nP1,/dup,/dup\n";
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(projects);
        fs::write(dir.path().join("projects.csv"), &encoded).unwrap();

        let set = TabularLoader::default().load(&path).unwrap();
        assert_eq!(set.encoding, "Shift_JIS");
        assert!(set.projects_joined);
        assert!(set.has_column("ganttchart_path"));
        assert_eq!(set.tasks[0].task_status, "完了");
        assert_eq!(set.tasks[0].project_path.as_deref(), Some("/work/p1"));
        assert_eq!(set.tasks[0].ganttchart_path.as_deref(), Some("/work/p1/gantt.xlsx"));
        // unmatched rows are kept with empty joined columns
        assert_eq!(set.tasks[1].project_path, None);
    }
}
