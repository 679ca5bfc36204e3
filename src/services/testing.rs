//! In-memory collaborators for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::Entity;
use crate::services::{ListingItem, ListingPage, LocalInventory, PageScraper};

/// Serves fixed listing pages per entity identity.
#[derive(Default)]
pub struct FakeScraper {
    pages: Mutex<HashMap<String, Vec<Vec<String>>>>,
    transient_failures: Mutex<HashMap<String, u32>>,
    terminal_failures: HashSet<String>,
    cancel_on_call: Option<(usize, CancellationToken)>,
    delay: Duration,
    calls: AtomicUsize,
    requested: Mutex<Vec<(String, u32)>>,
    call_times: Mutex<Vec<Instant>>,
}

impl FakeScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listing for an entity; page N is `pages[N - 1]`.
    pub fn with_pages(self, entity: &str, pages: Vec<Vec<&str>>) -> Self {
        self.set_pages(entity, pages);
        self
    }

    /// Fail the first `count` calls for an entity with a retryable error.
    pub fn with_transient_failures(self, entity: &str, count: u32) -> Self {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(entity.to_string(), count);
        self
    }

    /// Fail every call for an entity with a terminal error.
    pub fn with_terminal_failure(mut self, entity: &str) -> Self {
        self.terminal_failures.insert(entity.to_string());
        self
    }

    /// Cancel `token` while serving the `call`-th request (1-based).
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_pages(&self, entity: &str, pages: Vec<Vec<&str>>) {
        let pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(String::from).collect())
            .collect();
        self.pages.lock().unwrap().insert(entity.to_string(), pages);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// When each request was made, on the tokio clock.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    /// Pages requested for an entity, in request order.
    pub fn requested_pages(&self, entity: &str) -> Vec<u32> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key == entity)
            .map(|(_, page)| *page)
            .collect()
    }
}

#[async_trait]
impl PageScraper for FakeScraper {
    async fn fetch_page(&self, entity: &Entity, page: u32) -> Result<ListingPage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let key = entity.key();
        self.requested.lock().unwrap().push((key.clone(), page));
        self.call_times.lock().unwrap().push(Instant::now());

        if let Some((at, token)) = &self.cancel_on_call {
            if call == *at {
                token.cancel();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.terminal_failures.contains(&key) {
            return Err(AppError::selector("[[", "broken selector"));
        }
        {
            let mut failures = self.transient_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::fetch(&entity.name, "connection reset"));
                }
            }
        }

        let pages = self.pages.lock().unwrap();
        let listing = pages.get(&key).cloned().unwrap_or_default();
        let index = page as usize - 1;
        let items = listing
            .get(index)
            .map(|titles| {
                titles
                    .iter()
                    .map(|title| ListingItem {
                        title: title.clone(),
                        url: Some(format!("https://example.com/{key}/{title}")),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ListingPage {
            items,
            has_next: index + 1 < listing.len(),
        })
    }
}

/// Local titles per entity identity, mutable between passes.
#[derive(Default)]
pub struct FakeInventory {
    titles: Mutex<HashMap<String, HashSet<String>>>,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_titles(self, entity: &str, titles: &[&str]) -> Self {
        self.set_titles(entity, titles);
        self
    }

    pub fn set_titles(&self, entity: &str, titles: &[&str]) {
        self.titles.lock().unwrap().insert(
            entity.to_string(),
            titles.iter().map(|t| t.to_string()).collect(),
        );
    }
}

#[async_trait]
impl LocalInventory for FakeInventory {
    async fn local_titles(&self, entity: &Entity) -> Result<HashSet<String>> {
        Ok(self
            .titles
            .lock()
            .unwrap()
            .get(&entity.key())
            .cloned()
            .unwrap_or_default())
    }
}
