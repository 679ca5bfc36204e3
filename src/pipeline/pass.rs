// src/pipeline/pass.rs

//! One reconciliation pass for one entity.
//!
//! load document → plan range → fetch pages in ascending order → upsert →
//! reconcile against local and downloaded titles → update ledger → save.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{Entity, EntityReport, MissingItem};
use crate::pipeline::{FetchRangePlanner, ReconcileInput, RunContext, reconcile};
use crate::services::ListingItem;
use crate::storage::{CacheDocument, DiscoveredInput};

/// Run a pass for `entity`.
///
/// Returns [`AppError::Cancelled`] when cancellation is observed before a
/// further page is requested; pages merged up to that point are saved first.
/// A pass that already reached the end of its range finishes normally. Any
/// other error leaves the stored document untouched.
pub async fn run_entity_pass(ctx: &RunContext, entity: &Entity) -> Result<EntityReport> {
    let key = entity.key();
    let cache_enabled = ctx.config.cache.enabled;

    let mut document = ctx.storage.load(&key).await?;
    if document.kind.is_empty() {
        document.kind = entity.kind.clone();
    }
    let previously_cached = if cache_enabled {
        document.all_titles()
    } else {
        BTreeSet::new()
    };

    let planner = FetchRangePlanner::new(ctx.config.cache.page_expiry())
        .with_incremental(cache_enabled && ctx.config.cache.incremental);
    let range = planner.plan(
        &document,
        entity.requested_max_page(ctx.config.crawler.max_pages),
    );

    let mut pass_urls: HashMap<String, Option<String>> = HashMap::new();
    let mut discovered = 0;
    let mut pages_fetched = 0;

    if range.is_empty() {
        log::info!(
            "'{}': nothing to fetch (resume page {} beyond max page {:?})",
            key,
            range.start,
            range.end
        );
    } else {
        log::debug!(
            "'{}': fetching pages {}..{} ({})",
            key,
            range.start,
            range.end.map_or("end".to_string(), |end| end.to_string()),
            if range.full { "full" } else { "incremental" }
        );

        let delay = ctx.config.crawler.request_delay();
        let mut page = range.start;
        loop {
            let listing = ctx.scraper.fetch_page(entity, page).await?;
            pages_fetched += 1;

            let now = Utc::now();
            let listed = !listing.items.is_empty();
            let items = normalize_items(ctx, listing.items, page);
            for item in &items {
                pass_urls.insert(item.title.clone(), item.url.clone());
            }
            log::debug!("'{}': page {} listed {} items", key, page, items.len());

            if cache_enabled {
                discovered += document.upsert(items, now);
                // An empty page lies past the end of the listing.
                if listed {
                    document.mark_fetched(page, now);
                }
            }

            let next = match page.checked_add(1) {
                Some(next) if listing.has_next && range.contains(next) => next,
                _ => break,
            };

            if ctx.is_cancelled() {
                if cache_enabled {
                    ctx.storage.save(&document).await?;
                }
                log::info!("'{}': cancelled after page {}", key, page);
                return Err(AppError::Cancelled);
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            page = next;
        }
    }

    let mut online: BTreeSet<String> = pass_urls.keys().cloned().collect();
    if !range.full {
        online.extend(previously_cached.iter().cloned());
    }

    let local = ctx.inventory.local_titles(entity).await?;
    let downloaded = document.downloaded_titles();
    let result = reconcile(ReconcileInput {
        online: &online,
        local: &local,
        downloaded: &downloaded,
        previously_cached: &previously_cached,
    });

    let missing: Vec<MissingItem> = result
        .missing
        .iter()
        .map(|title| MissingItem {
            title: title.clone(),
            url: url_for(&pass_urls, &document, title),
        })
        .collect();

    let now = Utc::now();
    document.update_missing(
        missing.iter().map(|item| (item.title.clone(), item.url.clone())),
        now,
    );
    document.record_pass(range.full, now);
    ctx.storage.save(&document).await?;

    log::info!(
        "'{}': {} pages, {} online, {} new, {} missing",
        key,
        pages_fetched,
        online.len(),
        result.new_since_last_cache.len(),
        missing.len()
    );

    Ok(EntityReport {
        entity: key,
        range_start: range.start,
        range_end: range.end,
        full_crawl: range.full,
        pages_fetched,
        discovered,
        online_count: online.len(),
        missing,
        new_since_last_cache: result.new_since_last_cache.into_iter().collect(),
        finished_at: now,
    })
}

/// Normalize listed titles, dropping those that normalize to nothing.
fn normalize_items(ctx: &RunContext, items: Vec<ListingItem>, page: u32) -> Vec<DiscoveredInput> {
    items
        .into_iter()
        .filter_map(|item| {
            let title = ctx.normalizer.normalize(&item.title);
            (!title.is_empty()).then_some(DiscoveredInput {
                title,
                url: item.url,
                page,
            })
        })
        .collect()
}

fn url_for(
    pass_urls: &HashMap<String, Option<String>>,
    document: &CacheDocument,
    title: &str,
) -> Option<String> {
    pass_urls
        .get(title)
        .cloned()
        .flatten()
        .or_else(|| document.url_of(title).map(String::from))
}
