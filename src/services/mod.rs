//! Collaborators of the reconciliation pipeline.
//!
//! The pipeline only sees the [`PageScraper`] and [`LocalInventory`] traits.
//! This module also provides generic default implementations:
//! - Listing pages over HTTP with CSS selectors (`HttpPageScraper`)
//! - Local library as a directory tree (`DirectoryInventory`)
//! - Title cleaning shared by both sides (`TitleNormalizer`)

mod inventory;
mod listing;
mod normalizer;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Entity;

pub use inventory::DirectoryInventory;
pub use listing::{HttpPageScraper, page_url, parse_listing};
pub use normalizer::TitleNormalizer;

/// An item as listed on a remote page, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub title: String,
    pub url: Option<String>,
}

/// One fetched listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    pub has_next: bool,
}

/// Fetches one listing page of an entity.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn fetch_page(&self, entity: &Entity, page: u32) -> Result<ListingPage>;
}

/// Reports which titles already exist locally.
#[async_trait]
pub trait LocalInventory: Send + Sync {
    /// Normalized titles held locally for the entity.
    async fn local_titles(&self, entity: &Entity) -> Result<HashSet<String>>;
}
