//! # Project Dashboard
//!
//! Loads a project-tracking CSV export and derives project-level state from
//! it: per-project progress and duration, delayed tasks and projects, upcoming
//! milestones and a per-project "recent tasks" panel.
//!
//! ## Pipeline
//!
//! 1. [`resolver`] finds the export (explicit path, environment, common
//!    folders) and writes a sample dataset when nothing is found.
//! 2. [`loader`] decodes it with an ordered list of encodings, joins the
//!    optional companion projects table and parses the date columns.
//! 3. [`aggregate`] groups task rows into [`project::ProjectRollup`]s.
//! 4. [`classify`] answers the date-relative questions over the same rows.
//! 5. [`cache`] memoizes the read-only queries with a TTL and a size bound.
//!
//! [`dashboard::Dashboard`] wires these together and is the entry point for
//! callers; the `pmdash` binary is a thin command-line front end over it.
//!
//! ```no_run
//! use chrono::Local;
//! use project_dashboard::{config::DashboardConfig, dashboard::Dashboard};
//!
//! let dashboard = Dashboard::new(DashboardConfig::default());
//! let today = Local::now().date_naive();
//! for row in dashboard.rollups(None, today).iter() {
//!     println!("{} {:.2}%", row.project_name, row.progress);
//! }
//! ```

pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fields;
pub mod loader;
pub mod project;
pub mod records;
pub mod resolver;
pub mod task;
