//! Local filesystem storage implementation.
//!
//! One pretty-printed JSON document per entity under the cache directory.
//! Writes go to a temporary file that is renamed over the old document, so a
//! crash mid-write leaves either the old or the new document, never a torn
//! one. Loaded documents are mirrored in memory for repeat reads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::storage::{CacheDocument, CacheStorage};

const SLUG_MAX_LEN: usize = 48;

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    mirror: Arc<RwLock<HashMap<String, CacheDocument>>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            mirror: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// File name for an entity identity: readable slug plus a hash suffix.
    pub fn document_key(entity: &str) -> String {
        let mut slug = String::with_capacity(entity.len());
        for c in entity.chars() {
            if c.is_alphanumeric() {
                slug.extend(c.to_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug: String = slug.trim_matches('-').chars().take(SLUG_MAX_LEN).collect();
        let digest = Sha256::digest(entity.as_bytes());
        let suffix = &hex::encode(digest)[..8];

        if slug.is_empty() {
            format!("{suffix}.json")
        } else {
            format!("{slug}-{suffix}.json")
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read a document from disk, recovering from corruption.
    async fn read_document(&self, entity: &str) -> Result<CacheDocument> {
        let key = Self::document_key(entity);
        match self.read_json::<CacheDocument>(&key).await {
            Ok(Some(mut document)) => {
                if !document.entity.is_empty() && document.entity != entity {
                    log::warn!(
                        "Cache {} belongs to '{}', expected '{}'; starting empty",
                        key,
                        document.entity,
                        entity
                    );
                    return Ok(CacheDocument::new(entity));
                }
                document.entity = entity.to_string();
                Ok(document)
            }
            Ok(None) => {
                log::debug!("No cache for '{}' yet", entity);
                Ok(CacheDocument::new(entity))
            }
            Err(AppError::Json(e)) => {
                log::warn!(
                    "Cache {} is corrupt ({}); treating as empty, next pass recrawls",
                    key,
                    e
                );
                Ok(CacheDocument::new(entity))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CacheStorage for LocalStorage {
    async fn load(&self, entity: &str) -> Result<CacheDocument> {
        if let Some(document) = self.mirror.read().await.get(entity) {
            return Ok(document.clone());
        }

        let document = self.read_document(entity).await?;
        self.mirror
            .write()
            .await
            .insert(entity.to_string(), document.clone());
        Ok(document)
    }

    async fn save(&self, document: &CacheDocument) -> Result<()> {
        if document.entity.is_empty() {
            return Err(AppError::validation("cannot save a document without entity"));
        }

        // Saves and download marks are serialized on the mirror lock, so a
        // pass saving its copy never drops a mark recorded since its load.
        let mut mirror = self.mirror.write().await;
        let mut document = document.clone();
        if let Some(current) = mirror.get(&document.entity) {
            document.keep_downloaded_from(current);
        }

        let key = Self::document_key(&document.entity);
        self.write_json(&key, &document).await?;
        log::debug!(
            "Saved cache for '{}' ({} items, {} ledger entries)",
            document.entity,
            document.discovered_items.len(),
            document.missing_ledger.len()
        );

        mirror.insert(document.entity.clone(), document);
        Ok(())
    }

    async fn mark_downloaded(&self, entity: &str, title: &str) -> Result<()> {
        let mut mirror = self.mirror.write().await;
        let mut document = match mirror.get(entity) {
            Some(document) => document.clone(),
            None => self.read_document(entity).await?,
        };
        document.mark_downloaded(title, Utc::now());

        self.write_json(&Self::document_key(entity), &document).await?;
        mirror.insert(entity.to_string(), document);
        Ok(())
    }

    async fn clear(&self, entity: &str) -> Result<bool> {
        self.mirror.write().await.remove(entity);

        let path = self.path(&Self::document_key(entity));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}
