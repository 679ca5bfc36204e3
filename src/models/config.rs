//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and paging behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Discovery cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Worker pool and retry settings
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Default listing selectors
    #[serde(default)]
    pub selectors: ListingSelectors,

    /// Title preprocessing settings
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// Local library settings
    #[serde(default)]
    pub inventory: InventoryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_pages == Some(0) {
            return Err(AppError::validation("crawler.max_pages must be >= 1"));
        }
        if self.cache.page_expiry_hours == 0 {
            return Err(AppError::validation("cache.page_expiry_hours must be > 0"));
        }
        if self.workers.max_workers == 0 {
            return Err(AppError::validation("workers.max_workers must be > 0"));
        }
        if self.selectors.row.trim().is_empty() || self.selectors.title.trim().is_empty() {
            return Err(AppError::validation(
                "selectors.row and selectors.title must be set",
            ));
        }
        Ok(())
    }

    /// Directory holding one cache document per entity.
    pub fn cache_dir(&self, storage_dir: &Path) -> PathBuf {
        storage_dir.join(&self.cache.dir)
    }

    /// Root directory of the local library.
    pub fn inventory_root(&self, storage_dir: &Path) -> PathBuf {
        storage_dir.join(&self.inventory.root)
    }
}

/// HTTP client and paging behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between listing pages of one entity in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Highest listing page to visit (unbounded when unset)
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_pages: None,
        }
    }
}

/// Discovery cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Consult and update the discovery cache
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Resume from the last fetched page when the head of the listing is fresh
    #[serde(default = "defaults::enabled")]
    pub incremental: bool,

    /// Age after which a fetched page must be fetched again
    #[serde(default = "defaults::page_expiry_hours")]
    pub page_expiry_hours: u64,

    /// Cache directory, relative to the storage directory
    #[serde(default = "defaults::cache_dir")]
    pub dir: String,
}

impl CacheConfig {
    pub fn page_expiry(&self) -> chrono::Duration {
        i64::try_from(self.page_expiry_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            incremental: true,
            page_expiry_hours: defaults::page_expiry_hours(),
            dir: defaults::cache_dir(),
        }
    }
}

/// Worker pool and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of entities processed at once
    #[serde(default = "defaults::max_workers")]
    pub max_workers: usize,

    /// Extra attempts after the first failed pass
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay for linear retry backoff in milliseconds
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl WorkerConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::max_workers(),
            max_retries: defaults::max_retries(),
            retry_base_delay_ms: defaults::retry_base_delay(),
        }
    }
}

/// CSS selectors describing a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingSelectors {
    /// One element per listed item
    #[serde(default = "defaults::row_selector")]
    pub row: String,

    /// Title element inside a row
    #[serde(default = "defaults::title_selector")]
    pub title: String,

    /// Link element inside a row (title element when unset)
    #[serde(default)]
    pub link: Option<String>,

    /// Attribute holding the item URL
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,

    /// Element present only when a next page exists
    #[serde(default)]
    pub next: Option<String>,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            row: defaults::row_selector(),
            title: defaults::title_selector(),
            link: None,
            link_attr: defaults::link_attr(),
            next: None,
        }
    }
}

/// Title preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleaningConfig {
    /// Regex patterns removed from titles before normalization
    #[serde(default)]
    pub title_remove_patterns: Vec<String>,
}

/// Local library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Library root, relative to the storage directory
    #[serde(default = "defaults::inventory_root")]
    pub root: String,

    /// File extensions counted as items (all files when empty)
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            root: defaults::inventory_root(),
            extensions: Vec::new(),
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; gapscan/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        250
    }

    // Cache defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn page_expiry_hours() -> u64 {
        24
    }
    pub fn cache_dir() -> String {
        "cache".into()
    }

    // Worker defaults
    pub fn max_workers() -> usize {
        4
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        1000
    }

    // Selector defaults
    pub fn row_selector() -> String {
        "li.item".into()
    }
    pub fn title_selector() -> String {
        "a".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }

    pub fn inventory_root() -> String {
        "library".into()
    }
}
