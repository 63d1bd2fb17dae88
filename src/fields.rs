//! Enumerations used to categorise and present project rollups.
//!
//! This module defines the small closed sets the dashboard works with: the
//! colour tone a project row is rendered in, the sort orders for the project
//! table, and the histogram buckets used by the dashboard metrics.

use clap::ValueEnum;
use serde::Serialize;

/// Visual tone for a project, derived from its progress and delay state.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StatusTone {
    Danger,
    Success,
    Info,
    Warning,
    Neutral,
}

impl StatusTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTone::Danger => "danger",
            StatusTone::Success => "success",
            StatusTone::Info => "info",
            StatusTone::Warning => "warning",
            StatusTone::Neutral => "neutral",
        }
    }
}

/// Available sorting options for the project table.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Id,
    Progress,
    Duration,
    Name,
}

/// Progress histogram buckets, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressBucket {
    UpTo25,
    UpTo50,
    UpTo75,
    UpTo99,
    Complete,
}

impl ProgressBucket {
    pub const ALL: [ProgressBucket; 5] = [
        ProgressBucket::UpTo25,
        ProgressBucket::UpTo50,
        ProgressBucket::UpTo75,
        ProgressBucket::UpTo99,
        ProgressBucket::Complete,
    ];

    pub fn for_progress(progress: f64) -> Self {
        if progress >= 100.0 {
            ProgressBucket::Complete
        } else if progress > 75.0 {
            ProgressBucket::UpTo99
        } else if progress > 50.0 {
            ProgressBucket::UpTo75
        } else if progress > 25.0 {
            ProgressBucket::UpTo50
        } else {
            ProgressBucket::UpTo25
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgressBucket::UpTo25 => "0-25%",
            ProgressBucket::UpTo50 => "26-50%",
            ProgressBucket::UpTo75 => "51-75%",
            ProgressBucket::UpTo99 => "76-99%",
            ProgressBucket::Complete => "100%",
        }
    }
}

/// Duration histogram buckets, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DurationBucket {
    Month,
    Quarter,
    HalfYear,
    Year,
    Longer,
}

impl DurationBucket {
    pub const ALL: [DurationBucket; 5] = [
        DurationBucket::Month,
        DurationBucket::Quarter,
        DurationBucket::HalfYear,
        DurationBucket::Year,
        DurationBucket::Longer,
    ];

    pub fn for_days(days: i64) -> Self {
        match days {
            d if d <= 30 => DurationBucket::Month,
            d if d <= 90 => DurationBucket::Quarter,
            d if d <= 180 => DurationBucket::HalfYear,
            d if d <= 365 => DurationBucket::Year,
            _ => DurationBucket::Longer,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DurationBucket::Month => "<=30d",
            DurationBucket::Quarter => "31-90d",
            DurationBucket::HalfYear => "91-180d",
            DurationBucket::Year => "181-365d",
            DurationBucket::Longer => ">365d",
        }
    }
}
