//! Cached entry points over the loading pipeline.
//!
//! `Dashboard` is what an outer layer (the CLI here, an HTTP server elsewhere)
//! talks to. Each query resolves the source file, loads it through the
//! records cache, and memoizes its own result keyed on the query name, its
//! scalar arguments and the resolved path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::aggregate::{dashboard_metrics, mark_delays, rollup, DashboardMetrics};
use crate::cache::{CacheKey, CacheStats, QueryCache};
use crate::classify::{
    delayed_project_ids, find_delayed_tasks, find_next_milestone, next_milestone_for, recent_tasks_snapshot,
    RecentTasks,
};
use crate::config::DashboardConfig;
use crate::loader::{source_path, TabularLoader};
use crate::project::ProjectRollup;
use crate::error::ErrorPayload;
use crate::records::{LoadResult, RecordSet};
use crate::resolver::PathResolver;
use crate::task::{ProjectId, StatusRules, TaskRecord};

/// Outcome of a dashboard query. A load failure surfaces as its payload
/// instead of an empty result, and is not stored in the query's cache.
pub type QueryResult<T> = Result<T, ErrorPayload>;

/// One cache per memoized query.
#[derive(Debug)]
pub struct DashboardCaches {
    pub records: QueryCache<LoadResult>,
    pub rollups: QueryCache<Vec<ProjectRollup>>,
    pub delayed: QueryCache<Vec<TaskRecord>>,
    pub milestones: QueryCache<Vec<TaskRecord>>,
    pub recent: QueryCache<RecentTasks>,
}

impl DashboardCaches {
    pub fn from_config(config: &DashboardConfig) -> Self {
        let ttl = config.cache_ttl();
        let max = config.cache_max_entries;
        DashboardCaches {
            records: QueryCache::new("records", ttl, max),
            rollups: QueryCache::new("rollups", ttl, max),
            delayed: QueryCache::new("delayed_tasks", ttl, max),
            milestones: QueryCache::new("milestones", ttl, max),
            recent: QueryCache::new("recent_tasks", ttl, max),
        }
    }

    pub fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.records.name(), self.records.stats()),
            (self.rollups.name(), self.rollups.stats()),
            (self.delayed.name(), self.delayed.stats()),
            (self.milestones.name(), self.milestones.stats()),
            (self.recent.name(), self.recent.stats()),
        ]
    }

    pub fn clear(&self) {
        self.records.clear();
        self.rollups.clear();
        self.delayed.clear();
        self.milestones.clear();
        self.recent.clear();
    }
}

/// The project dashboard service.
#[derive(Debug)]
pub struct Dashboard {
    config: DashboardConfig,
    rules: StatusRules,
    resolver: PathResolver,
    loader: TabularLoader,
    caches: DashboardCaches,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Self {
        let resolver = PathResolver::from_config(&config);
        let caches = DashboardCaches::from_config(&config);
        Self::with_caches(config, resolver, caches)
    }

    /// Build with an explicit resolver and caches, e.g. isolated ones in tests.
    pub fn with_caches(config: DashboardConfig, resolver: PathResolver, caches: DashboardCaches) -> Self {
        Dashboard {
            rules: config.status_rules(),
            loader: TabularLoader::from_config(&config),
            config,
            resolver,
            caches,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn caches(&self) -> &DashboardCaches {
        &self.caches
    }

    /// The file a query for `path` reads.
    pub fn source_path(&self, path: Option<&Path>) -> PathBuf {
        source_path(path, &self.resolver)
    }

    /// Load (or reuse) the record set behind `path`.
    pub fn records(&self, path: Option<&Path>) -> Arc<LoadResult> {
        let source = self.source_path(path);
        self.records_at(&source)
    }

    fn records_at(&self, source: &Path) -> Arc<LoadResult> {
        let key = CacheKey::new("records").path(Some(source));
        self.caches.records.get_or_compute(key, || self.loader.load(source))
    }

    /// Project rollups with `has_delay` filled in.
    pub fn rollups(&self, path: Option<&Path>, today: NaiveDate) -> Arc<Vec<ProjectRollup>> {
        let source = self.source_path(path);
        let key = CacheKey::new("rollups").arg(today).path(Some(&source));
        self.caches.rollups.get_or_compute(key, || {
            let loaded = self.records_at(&source);
            let mut rows = rollup(&loaded, &self.rules, self.config.parallel_threshold);
            if let Ok(records) = loaded.as_ref() {
                mark_delays(&mut rows, &delayed_project_ids(records, today, &self.rules));
            }
            info!(projects = rows.len(), "rollups computed");
            rows
        })
    }

    /// Rollup of one project, if it exists.
    pub fn project(&self, path: Option<&Path>, project_id: &ProjectId, today: NaiveDate) -> Option<ProjectRollup> {
        self.rollups(path, today)
            .iter()
            .find(|r| !r.diagnostic && &r.project_id == project_id)
            .cloned()
    }

    /// Run `query` over the records behind `source`, or return the payload
    /// of the load error that stopped it.
    fn with_records<T>(&self, source: &Path, query: impl FnOnce(&RecordSet) -> T) -> QueryResult<T> {
        let loaded = self.records_at(source);
        match loaded.as_ref() {
            Ok(records) => Ok(query(records)),
            Err(e) => {
                warn!(error = %e, path = %source.display(), "query failed, data failed to load");
                Err(e.payload())
            }
        }
    }

    pub fn delayed_tasks(&self, path: Option<&Path>, today: NaiveDate) -> QueryResult<Arc<Vec<TaskRecord>>> {
        let source = self.source_path(path);
        self.with_records(&source, |records| {
            let key = CacheKey::new("delayed_tasks").arg(today).path(Some(&source));
            self.caches
                .delayed
                .get_or_compute(key, || find_delayed_tasks(records, today, &self.rules))
        })
    }

    pub fn milestones(
        &self,
        path: Option<&Path>,
        today: NaiveDate,
        include_past: bool,
    ) -> QueryResult<Arc<Vec<TaskRecord>>> {
        let source = self.source_path(path);
        self.with_records(&source, |records| {
            let key = CacheKey::new("milestones")
                .arg(today)
                .arg(include_past)
                .path(Some(&source));
            self.caches
                .milestones
                .get_or_compute(key, || find_next_milestone(records, today, include_past, &self.rules))
        })
    }

    /// The milestone to display for one project. Not cached; it reads the
    /// cached records.
    pub fn next_milestone(
        &self,
        path: Option<&Path>,
        project_id: &ProjectId,
        today: NaiveDate,
        include_past: bool,
    ) -> QueryResult<Option<TaskRecord>> {
        let source = self.source_path(path);
        self.with_records(&source, |records| {
            next_milestone_for(records, project_id, today, include_past, &self.rules)
        })
    }

    pub fn recent_tasks(
        &self,
        path: Option<&Path>,
        project_id: &ProjectId,
        today: NaiveDate,
    ) -> QueryResult<Arc<RecentTasks>> {
        let source = self.source_path(path);
        self.with_records(&source, |records| {
            let key = CacheKey::new("recent_tasks")
                .arg(project_id)
                .arg(today)
                .path(Some(&source));
            self.caches
                .recent
                .get_or_compute(key, || recent_tasks_snapshot(records, project_id, today, &self.rules))
        })
    }

    /// Dashboard header numbers.
    pub fn metrics(&self, path: Option<&Path>, now: NaiveDateTime) -> QueryResult<DashboardMetrics> {
        let source = self.source_path(path);
        self.with_records(&source, |records| {
            let rollups = self.rollups(Some(&source), now.date());
            dashboard_metrics(&rollups, records, now, &self.rules)
        })
    }

    pub fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        self.caches.stats()
    }

    pub fn clear_caches(&self) {
        self.caches.clear();
    }
}
