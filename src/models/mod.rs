// src/models/mod.rs

//! Domain models for the scanner.
//!
//! This module contains the data structures shared by the cache, the
//! pipeline and the command line front end.

mod config;
mod entity;
mod report;

// Re-export all public types
pub use config::{
    CacheConfig, CleaningConfig, Config, CrawlerConfig, InventoryConfig, ListingSelectors,
    WorkerConfig,
};
pub use entity::{Entity, normalize_name, validate_entities};
pub use report::{EntityReport, MissingItem, TaskOutcome};
