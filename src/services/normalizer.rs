// src/services/normalizer.rs

//! Title normalization.
//!
//! Remote titles and local file names only compare equal after both went
//! through the same normalizer.

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};
use crate::models::CleaningConfig;

/// Turns raw titles into canonical keys.
#[derive(Debug, Clone, Default)]
pub struct TitleNormalizer {
    remove_patterns: Vec<Regex>,
}

impl TitleNormalizer {
    /// Build a normalizer from the cleaning settings.
    pub fn from_config(config: &CleaningConfig) -> Result<Self> {
        let remove_patterns = config
            .title_remove_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    AppError::config(format!("invalid title pattern '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { remove_patterns })
    }

    /// Canonical key for a raw title. Empty when nothing word-like remains.
    pub fn normalize(&self, raw: &str) -> String {
        let mut text = raw.to_string();
        for pattern in &self.remove_patterns {
            text = pattern.replace_all(&text, " ").into_owned();
        }

        text.to_lowercase()
            .unicode_words()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
