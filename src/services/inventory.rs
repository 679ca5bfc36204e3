// src/services/inventory.rs

//! Directory-backed local inventory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entity, InventoryConfig};
use crate::services::{LocalInventory, TitleNormalizer};

/// Treats every file below `{root}/{entity local dir}` as a held item, keyed
/// by its normalized file stem.
#[derive(Debug, Clone)]
pub struct DirectoryInventory {
    root: PathBuf,
    extensions: Vec<String>,
    normalizer: TitleNormalizer,
}

impl DirectoryInventory {
    pub fn new(root: impl Into<PathBuf>, config: &InventoryConfig, normalizer: TitleNormalizer) -> Self {
        Self {
            root: root.into(),
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            normalizer,
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl LocalInventory for DirectoryInventory {
    async fn local_titles(&self, entity: &Entity) -> Result<HashSet<String>> {
        let dir = self.root.join(entity.local_dir());
        let mut titles = HashSet::new();

        if !tokio::fs::try_exists(&dir).await? {
            log::debug!("No local directory for '{}' at {}", entity.name, dir.display());
            return Ok(titles);
        }

        let mut pending = vec![dir];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !self.accepts(&path) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let title = self.normalizer.normalize(stem);
                if !title.is_empty() {
                    titles.insert(title);
                }
            }
        }

        Ok(titles)
    }
}
