//! Dashboard configuration.
//!
//! Settings come from an optional TOML file; every field has a default so an
//! absent file, or an empty one, yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::task::{StatusRules, DEFAULT_DONE_STATUS, DEFAULT_MILESTONE_MARKER};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Explicit dashboard CSV, tried before any other location.
    #[serde(default)]
    pub source_file: Option<PathBuf>,
    #[serde(default = "default_done_status")]
    pub done_status: String,
    #[serde(default = "default_milestone_marker")]
    pub milestone_marker: String,
    /// Encoding labels tried in order when decoding the CSV.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Above this many distinct projects the rollup runs on the thread pool.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
    /// Where the sample dataset is written when no export can be found.
    #[serde(default)]
    pub sample_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            source_file: None,
            done_status: default_done_status(),
            milestone_marker: default_milestone_marker(),
            encodings: default_encodings(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            parallel_threshold: default_parallel_threshold(),
            sample_dir: None,
        }
    }
}

impl DashboardConfig {
    pub fn status_rules(&self) -> StatusRules {
        StatusRules {
            done_status: self.done_status.clone(),
            milestone_marker: self.milestone_marker.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sample_dir(&self) -> PathBuf {
        self.sample_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("project_dashboard"))
    }
}

/// Read a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<DashboardConfig> {
    if !path.exists() {
        return Ok(DashboardConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<DashboardConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Location of the per-user config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("project_dashboard/config.toml"))
}

/// Load the explicitly named config, else the per-user one, else defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<DashboardConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        return load_config(path);
    }

    match user_config_path() {
        Some(path) => load_config(&path),
        None => Ok(DashboardConfig::default()),
    }
}

fn default_done_status() -> String {
    DEFAULT_DONE_STATUS.to_string()
}

fn default_milestone_marker() -> String {
    DEFAULT_MILESTONE_MARKER.to_string()
}

fn default_encodings() -> Vec<String> {
    ["utf-8-sig", "utf-8", "shift_jis", "euc-jp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_cache_max_entries() -> usize {
    50
}

const fn default_parallel_threshold() -> usize {
    10
}
