// src/pipeline/scan.rs

//! Scan entry point wiring the default collaborators.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, Entity};
use crate::pipeline::{Orchestrator, RunContext, RunSummary};
use crate::services::{DirectoryInventory, HttpPageScraper, TitleNormalizer};
use crate::storage::LocalStorage;

/// Scan `entities` using the HTTP scraper, the directory inventory and the
/// local cache under `storage_dir`.
///
/// Only configuration errors abort the run; a bad entity ends as a failed
/// task in the summary.
pub async fn run_scan(
    config: Arc<Config>,
    storage_dir: &Path,
    entities: Vec<Entity>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;

    let normalizer = TitleNormalizer::from_config(&config.cleaning)?;
    let storage = LocalStorage::new(config.cache_dir(storage_dir));
    let scraper = HttpPageScraper::new(Arc::clone(&config))?;
    let inventory = DirectoryInventory::new(
        config.inventory_root(storage_dir),
        &config.inventory,
        normalizer.clone(),
    );

    log::info!(
        "Cache: {} (incremental: {}, page expiry: {}h)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.incremental,
        config.cache.page_expiry_hours
    );

    let ctx = RunContext::new(
        Arc::clone(&config),
        Arc::new(storage),
        Arc::new(scraper),
        Arc::new(inventory),
    )
    .with_normalizer(normalizer)
    .with_cancellation(cancel);

    Ok(Orchestrator::new(Arc::new(ctx)).run(entities).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::models::TaskOutcome;

    #[tokio::test]
    async fn empty_scan_is_complete() {
        let tmp = TempDir::new().unwrap();
        let summary = run_scan(
            Arc::new(Config::default()),
            tmp.path(),
            Vec::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.submitted, 0);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn bad_entities_fail_without_aborting_the_run() {
        let tmp = TempDir::new().unwrap();
        let entities = vec![
            Entity::new("chan", "not a url"),
            Entity::new("Chan", "not a url"),
        ];
        let summary = run_scan(
            Arc::new(Config::default()),
            tmp.path(),
            entities,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.failed, 2);
        assert!(summary.is_complete());
        assert!(
            summary
                .results
                .iter()
                .all(|outcome| matches!(outcome, TaskOutcome::Failed { .. }))
        );
    }
}
