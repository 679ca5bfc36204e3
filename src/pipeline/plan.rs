//! Fetch range planning.
//!
//! Decides which listing pages a pass has to visit, based on the page
//! freshness recorded in the entity's cache document.
//!
//! Listings are newest-first, so new items push older ones towards later
//! pages. Checking only the page after `last_page_fetched` would miss items
//! inserted near the top; the planner therefore looks at the first few pages
//! and recrawls from page 1 as soon as any of them went stale.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::CacheDocument;

/// Number of leading pages whose freshness gates an incremental pass.
pub const DRIFT_WINDOW: u32 = 3;

/// Inclusive page range for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRange {
    pub start: u32,
    /// Last page to visit; `None` means until the listing runs out
    pub end: Option<u32>,
    /// Whether the pass starts over from page 1
    pub full: bool,
}

impl FetchRange {
    fn full(requested_max_page: Option<u32>) -> Self {
        Self {
            start: 1,
            end: requested_max_page,
            full: true,
        }
    }

    /// A range whose end lies before its start; the pass fetches nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end < self.start)
    }

    /// Whether `page` lies inside the range.
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && self.end.is_none_or(|end| page <= end)
    }
}

/// Plans fetch ranges from page freshness.
#[derive(Debug, Clone, Copy)]
pub struct FetchRangePlanner {
    expiry: Duration,
    incremental: bool,
}

impl FetchRangePlanner {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            incremental: true,
        }
    }

    /// Always plan full passes when `incremental` is off.
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn plan(&self, document: &CacheDocument, requested_max_page: Option<u32>) -> FetchRange {
        self.plan_at(document, requested_max_page, Utc::now())
    }

    /// Plan as of `now`.
    pub fn plan_at(
        &self,
        document: &CacheDocument,
        requested_max_page: Option<u32>,
        now: DateTime<Utc>,
    ) -> FetchRange {
        let last = document.last_page_fetched;
        if !self.incremental || last == 0 {
            return FetchRange::full(requested_max_page);
        }

        let window = DRIFT_WINDOW.min(last);
        if let Some(stale) = (1..=window).find(|page| document.is_stale_at(*page, self.expiry, now)) {
            log::debug!(
                "'{}': page {} is stale, recrawling from page 1",
                document.entity,
                stale
            );
            return FetchRange::full(requested_max_page);
        }

        FetchRange {
            start: last.saturating_add(1),
            end: requested_max_page,
            full: false,
        }
    }
}

/// Plan the range for a document with the default incremental behavior.
pub fn plan_range(
    document: &CacheDocument,
    requested_max_page: Option<u32>,
    expiry: Duration,
) -> FetchRange {
    FetchRangePlanner::new(expiry).plan(document, requested_max_page)
}
