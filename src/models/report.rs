//! Per-entity and per-run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one successful reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityReport {
    /// Entity identity
    pub entity: String,
    /// First page of the planned range
    pub range_start: u32,
    /// Last page of the planned range (unbounded when `None`)
    pub range_end: Option<u32>,
    /// Whether the pass re-crawled from page 1
    pub full_crawl: bool,
    /// Pages actually requested from the scraper
    pub pages_fetched: u32,
    /// Titles inserted into the discovery cache by this pass
    pub discovered: usize,
    /// Size of the online set used for reconciliation
    pub online_count: usize,
    /// Titles online but neither local nor downloaded, sorted
    pub missing: Vec<MissingItem>,
    /// Titles online that the cache had not seen before (informational)
    pub new_since_last_cache: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

/// A missing title together with where it can be found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissingItem {
    pub title: String,
    pub url: Option<String>,
}

/// Terminal outcome of one entity task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded(EntityReport),
    Failed {
        entity: String,
        error: String,
        attempts: u32,
    },
    Cancelled {
        entity: String,
    },
}

impl TaskOutcome {
    pub fn entity(&self) -> &str {
        match self {
            Self::Succeeded(report) => &report.entity,
            Self::Failed { entity, .. } | Self::Cancelled { entity } => entity,
        }
    }
}
