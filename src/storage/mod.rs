//! Storage abstractions for per-entity cache documents.
//!
//! Each entity owns exactly one document. A document is read whole, mutated
//! in memory and written back whole:
//!
//! ```text
//! {storage_dir}/
//! └── cache/
//!     ├── retro-games-1f3a9c02.json
//!     └── speedruns-77b0e4d1.json
//! ```
//!
//! ## Ownership
//!
//! The read-mutate-rewrite cycle is only safe because a single task owns an
//! entity's document for the duration of a pass: the orchestrator dispatches
//! one task per entity and never two for the same identity. Backends do not
//! lock across writers of the same entity.

pub mod document;
pub mod local;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;

// Re-export for convenience
pub use document::{
    CacheDocument, Counters, DiscoveredInput, DiscoveredItem, LedgerEntry, LedgerStatus,
};
pub use local::LocalStorage;

/// Trait for cache document backends.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Load an entity's document.
    ///
    /// Absent or unreadable documents come back empty rather than as errors.
    async fn load(&self, entity: &str) -> Result<CacheDocument>;

    /// Replace an entity's document.
    async fn save(&self, document: &CacheDocument) -> Result<()>;

    /// Remove an entity's document. Returns whether one existed.
    async fn clear(&self, entity: &str) -> Result<bool>;

    /// Record a finished download for the download executor.
    ///
    /// The default is a plain load-mutate-save of the whole document: a pass
    /// running for the same entity saves its own copy later and drops the
    /// mark. Callers must not use it while that entity is being scanned
    /// unless the backend overrides it (as [`LocalStorage`] does).
    async fn mark_downloaded(&self, entity: &str, title: &str) -> Result<()> {
        let mut document = self.load(entity).await?;
        document.mark_downloaded(title, Utc::now());
        self.save(&document).await
    }
}
