// src/services/listing.rs

//! Listing page scraper.
//!
//! Fetches an entity's listing page over HTTP and extracts items with the
//! entity's CSS selectors (or the configured defaults).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, Entity, ListingSelectors};
use crate::services::{ListingItem, ListingPage, PageScraper};

/// Placeholder substituted with the page number in listing URLs.
const PAGE_PLACEHOLDER: &str = "{page}";

/// HTTP implementation of [`PageScraper`].
pub struct HttpPageScraper {
    config: Arc<Config>,
    client: Client,
}

impl HttpPageScraper {
    /// Create a new scraper with the given configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.crawler.user_agent)
            .timeout(Duration::from_secs(config.crawler.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn selectors_for<'a>(&'a self, entity: &'a Entity) -> &'a ListingSelectors {
        entity.selectors.as_ref().unwrap_or(&self.config.selectors)
    }
}

#[async_trait]
impl PageScraper for HttpPageScraper {
    async fn fetch_page(&self, entity: &Entity, page: u32) -> Result<ListingPage> {
        let url = page_url(&entity.url, page)?;
        log::debug!("GET {} ({} page {})", url, entity.name, page);

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        // Past the last page many listings answer 404 instead of an empty page.
        if status == StatusCode::NOT_FOUND && page > 1 {
            log::debug!("'{}': page {} not found, end of listing", entity.name, page);
            return Ok(ListingPage::default());
        }
        if !status.is_success() {
            return Err(AppError::fetch(
                &entity.name,
                format!("page {page} returned HTTP {status}"),
            ));
        }
        let html = response.text().await?;

        parse_listing(&html, &url, self.selectors_for(entity))
    }
}

/// URL of a given listing page.
///
/// `{page}` in the template is replaced; otherwise the `page` query parameter
/// is set (replacing any existing one).
pub fn page_url(template: &str, page: u32) -> Result<Url> {
    if template.contains(PAGE_PLACEHOLDER) {
        return Ok(Url::parse(
            &template.replace(PAGE_PLACEHOLDER, &page.to_string()),
        )?);
    }

    let mut url = Url::parse(template)?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("page", &page.to_string());
    Ok(url)
}

/// Extract listing items from a page body.
pub fn parse_listing(html: &str, base_url: &Url, selectors: &ListingSelectors) -> Result<ListingPage> {
    let document = Html::parse_document(html);

    let row_sel = parse_selector(&selectors.row)?;
    let title_sel = parse_selector(&selectors.title)?;
    let link_sel = selectors.link.as_deref().map(parse_selector).transpose()?;
    let next_sel = selectors.next.as_deref().map(parse_selector).transpose()?;

    let mut items = Vec::new();
    for row in document.select(&row_sel) {
        let Some(title_elem) = row.select(&title_sel).next() else {
            continue;
        };
        let title = title_elem
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            continue;
        }

        let link_elem = link_sel
            .as_ref()
            .and_then(|sel| row.select(sel).next())
            .unwrap_or(title_elem);
        let url = link_elem
            .value()
            .attr(&selectors.link_attr)
            .filter(|href| !href.trim().is_empty())
            .map(|href| resolve_url(base_url, href.trim()));

        items.push(ListingItem { title, url });
    }

    let has_next = match &next_sel {
        Some(sel) => document.select(sel).next().is_some(),
        None => !items.is_empty(),
    };

    Ok(ListingPage { items, has_next })
}

/// Resolve a potentially relative URL against a base URL.
fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
