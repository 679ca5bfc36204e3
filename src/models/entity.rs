// src/models/entity.rs

//! Tracked remote channels.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ListingSelectors;

/// A tracked remote channel with a paginated listing.
///
/// Entities are owned by whoever maintains `entities.json`; the scanner only
/// reads them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    /// Display name; its normalized form is the entity identity
    pub name: String,

    /// Listing URL. `{page}` is substituted with the page number when present,
    /// otherwise a `page` query parameter is appended.
    pub url: String,

    /// Module tag (e.g. "channel", "playlist")
    #[serde(default)]
    pub kind: String,

    /// Highest listing page to visit, overriding `crawler.max_pages`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,

    /// Library subdirectory holding this entity's items (defaults to the name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,

    /// Listing selectors overriding the configured defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<ListingSelectors>,
}

impl Entity {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: String::new(),
            max_pages: None,
            local_dir: None,
            selectors: None,
        }
    }

    /// Load entity definitions from a JSON file.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Identity of the entity: trimmed, lower-cased, whitespace collapsed.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Library subdirectory for this entity.
    pub fn local_dir(&self) -> &str {
        self.local_dir.as_deref().unwrap_or(&self.name)
    }

    /// Requested max page: the entity's own bound, then the global one.
    pub fn requested_max_page(&self, global: Option<u32>) -> Option<u32> {
        self.max_pages.or(global)
    }
}

/// Normalize an entity name into its identity key.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Check a batch of entities for empty or duplicate identities.
pub fn validate_entities(entities: &[Entity]) -> Result<()> {
    let mut seen = HashSet::new();
    for entity in entities {
        let key = entity.key();
        if key.is_empty() {
            return Err(AppError::validation("entity with empty name"));
        }
        if entity.url.trim().is_empty() {
            return Err(AppError::validation(format!(
                "entity '{}' has no listing URL",
                entity.name
            )));
        }
        if entity.max_pages == Some(0) {
            return Err(AppError::validation(format!(
                "entity '{}' has max_pages = 0",
                entity.name
            )));
        }
        if !seen.insert(key) {
            return Err(AppError::validation(format!(
                "duplicate entity '{}'",
                entity.name
            )));
        }
    }
    Ok(())
}
