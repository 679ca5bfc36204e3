//! Shared state for one scan run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::models::Config;
use crate::services::{LocalInventory, PageScraper, TitleNormalizer};
use crate::storage::CacheStorage;

/// Everything an entity pass needs, built once per run and shared by every
/// worker task.
pub struct RunContext {
    pub config: Arc<Config>,
    pub storage: Arc<dyn CacheStorage>,
    pub scraper: Arc<dyn PageScraper>,
    pub inventory: Arc<dyn LocalInventory>,
    pub normalizer: TitleNormalizer,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn CacheStorage>,
        scraper: Arc<dyn PageScraper>,
        inventory: Arc<dyn LocalInventory>,
    ) -> Self {
        Self {
            config,
            storage,
            scraper,
            inventory,
            normalizer: TitleNormalizer::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: TitleNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Share an externally owned cancellation token (e.g. wired to Ctrl-C).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the run has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the run to stop. Running tasks finish their current page.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
