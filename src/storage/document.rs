//! Per-entity cache document.
//!
//! One document holds everything the scanner remembers about an entity:
//!
//! - page freshness: when each listing page was last fetched
//! - discovered items: every title seen on the listing, with its URL and page
//! - missing ledger: titles reported missing, and titles already downloaded
//!
//! Every field defaults when absent so older documents keep loading.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A title found on a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredItem {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "first_page")]
    pub page: u32,
    pub discovered_at: DateTime<Utc>,
}

fn first_page() -> u32 {
    1
}

/// Ledger status of a title.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    #[default]
    Missing,
    Downloaded,
}

/// Ledger record for a title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    #[serde(default)]
    pub status: LedgerStatus,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub last_missing_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub downloaded_at: Option<DateTime<Utc>>,
}

/// Fetch counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Counters {
    #[serde(default)]
    pub fetch_count: u64,
    #[serde(default)]
    pub full_fetch_count: u64,
}

/// An item submitted to [`CacheDocument::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInput {
    pub title: String,
    pub url: Option<String>,
    pub page: u32,
}

/// Aggregate cache state for one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CacheDocument {
    /// Entity identity
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub discovered_items: BTreeMap<String, DiscoveredItem>,
    #[serde(default)]
    pub page_freshness: BTreeMap<u32, DateTime<Utc>>,
    /// Highest page ever fetched; 0 means no history
    #[serde(default)]
    pub last_page_fetched: u32,
    #[serde(default)]
    pub missing_ledger: BTreeMap<String, LedgerEntry>,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CacheDocument {
    /// Create an empty document for an entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Self::default()
        }
    }

    // --- Page freshness ---

    /// Record that `page` was fetched at `at`.
    ///
    /// Timestamps only move forward; an older `at` leaves the record alone.
    /// Page 0 is not a listing page and is ignored.
    pub fn mark_fetched(&mut self, page: u32, at: DateTime<Utc>) {
        if page == 0 {
            return;
        }
        self.page_freshness
            .entry(page)
            .and_modify(|fetched| {
                if at > *fetched {
                    *fetched = at;
                }
            })
            .or_insert(at);
        if page > self.last_page_fetched {
            self.last_page_fetched = page;
        }
    }

    /// When `page` was last fetched.
    pub fn fetched_at(&self, page: u32) -> Option<DateTime<Utc>> {
        self.page_freshness.get(&page).copied()
    }

    /// Whether `page` must be fetched again as of `now`.
    ///
    /// Pages never fetched are always stale.
    pub fn is_stale_at(&self, page: u32, expiry: Duration, now: DateTime<Utc>) -> bool {
        match self.page_freshness.get(&page) {
            Some(fetched) => now.signed_duration_since(*fetched) > expiry,
            None => true,
        }
    }

    /// Whether `page` must be fetched again now.
    pub fn is_stale(&self, page: u32, expiry: Duration) -> bool {
        self.is_stale_at(page, expiry, Utc::now())
    }

    // --- Discovered items ---

    /// Insert or overwrite discovered items.
    ///
    /// Returns how many titles were not known before. Submitting the same
    /// items again never grows the store.
    pub fn upsert<I>(&mut self, items: I, at: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = DiscoveredInput>,
    {
        let mut inserted = 0;
        for item in items {
            if item.title.is_empty() {
                continue;
            }
            let record = DiscoveredItem {
                url: item.url,
                page: item.page.max(1),
                discovered_at: at,
            };
            if self.discovered_items.insert(item.title, record).is_none() {
                inserted += 1;
            }
        }
        inserted
    }

    /// All discovered titles.
    pub fn all_titles(&self) -> BTreeSet<String> {
        self.discovered_items.keys().cloned().collect()
    }

    /// Source URL of a discovered title.
    pub fn url_of(&self, title: &str) -> Option<&str> {
        self.discovered_items
            .get(title)
            .and_then(|item| item.url.as_deref())
    }

    // --- Missing ledger ---

    /// Record titles as currently missing.
    ///
    /// Entries already marked downloaded are never reverted.
    pub fn update_missing<I>(&mut self, items: I, at: DateTime<Utc>)
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        for (title, url) in items {
            let entry = self.missing_ledger.entry(title).or_insert(LedgerEntry {
                status: LedgerStatus::Missing,
                url: None,
                last_missing_at: None,
                downloaded_at: None,
            });
            if entry.status == LedgerStatus::Downloaded {
                continue;
            }
            entry.last_missing_at = Some(at);
            if url.is_some() {
                entry.url = url;
            }
        }
    }

    /// Titles already handled by the download executor.
    pub fn downloaded_titles(&self) -> BTreeSet<String> {
        self.missing_ledger
            .iter()
            .filter(|(_, entry)| entry.status == LedgerStatus::Downloaded)
            .map(|(title, _)| title.clone())
            .collect()
    }

    /// Mark a title downloaded, creating the entry when it was never missing.
    pub fn mark_downloaded(&mut self, title: &str, at: DateTime<Utc>) {
        let url = self
            .discovered_items
            .get(title)
            .and_then(|item| item.url.clone());
        let entry = self
            .missing_ledger
            .entry(title.to_string())
            .or_insert(LedgerEntry {
                status: LedgerStatus::Missing,
                url,
                last_missing_at: None,
                downloaded_at: None,
            });
        if entry.status != LedgerStatus::Downloaded {
            entry.status = LedgerStatus::Downloaded;
            entry.downloaded_at = Some(at);
        }
    }

    /// Carry over downloaded entries from `other` that this copy lacks.
    ///
    /// Used when a stale copy of the document replaces a newer one.
    pub fn keep_downloaded_from(&mut self, other: &CacheDocument) {
        for (title, entry) in &other.missing_ledger {
            if entry.status != LedgerStatus::Downloaded {
                continue;
            }
            let stale = self
                .missing_ledger
                .get(title)
                .is_none_or(|current| current.status != LedgerStatus::Downloaded);
            if stale {
                self.missing_ledger.insert(title.clone(), entry.clone());
            }
        }
    }

    /// Ledger entries still at status missing.
    pub fn missing_entries(&self) -> impl Iterator<Item = (&String, &LedgerEntry)> {
        self.missing_ledger
            .iter()
            .filter(|(_, entry)| entry.status == LedgerStatus::Missing)
    }

    // --- Counters ---

    /// Count a finished pass.
    pub fn record_pass(&mut self, full: bool, at: DateTime<Utc>) {
        self.counters.fetch_count += 1;
        if full {
            self.counters.full_fetch_count += 1;
        }
        self.updated_at = Some(at);
    }
}
