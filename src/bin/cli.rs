//! gapscan CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gapscan::{
    error::{AppError, Result},
    models::{Config, Entity, TaskOutcome, normalize_name, validate_entities},
    pipeline::{self, RunSummary},
    services::TitleNormalizer,
    storage::{CacheDocument, CacheStorage, LocalStorage},
};
use tokio_util::sync::CancellationToken;

/// gapscan - find titles missing from a local library
#[derive(Parser, Debug)]
#[command(
    name = "gapscan",
    version,
    about = "Incremental listing crawler and library gap finder"
)]
struct Cli {
    /// Path to storage directory containing config.toml and entities.json
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl listings and report missing titles
    Scan {
        /// Only scan these entities (repeatable)
        #[arg(short, long = "entity")]
        entities: Vec<String>,

        /// Cap on listing pages per entity
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Show cached state for an entity
    Status {
        #[arg(short, long)]
        entity: String,
    },

    /// Record a title as downloaded
    MarkDownloaded {
        #[arg(short, long)]
        entity: String,

        #[arg(short, long)]
        title: String,
    },

    /// Delete an entity's cache document
    Clear {
        #[arg(short, long)]
        entity: String,
    },

    /// Validate configuration and entity files
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn entities_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join("entities.json")
}

/// Keep only the entities named on the command line.
fn select_entities(all: Vec<Entity>, wanted: &[String]) -> Result<Vec<Entity>> {
    if wanted.is_empty() {
        return Ok(all);
    }

    let mut selected = Vec::with_capacity(wanted.len());
    for name in wanted {
        let key = normalize_name(name);
        let entity = all
            .iter()
            .find(|entity| entity.key() == key)
            .ok_or_else(|| AppError::validation(format!("unknown entity '{name}'")))?;
        selected.push(entity.clone());
    }
    Ok(selected)
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.results {
        match outcome {
            TaskOutcome::Succeeded(report) => {
                println!(
                    "{}: {} missing ({} online, {} pages fetched{})",
                    report.entity,
                    report.missing.len(),
                    report.online_count,
                    report.pages_fetched,
                    if report.full_crawl { ", full crawl" } else { "" }
                );
                for item in &report.missing {
                    match &item.url {
                        Some(url) => println!("  - {} <{}>", item.title, url),
                        None => println!("  - {}", item.title),
                    }
                }
            }
            TaskOutcome::Failed {
                entity,
                error,
                attempts,
            } => println!("{entity}: FAILED after {attempts} attempt(s): {error}"),
            TaskOutcome::Cancelled { entity } => println!("{entity}: cancelled"),
        }
    }

    println!(
        "\n{} submitted, {} succeeded, {} failed, {} cancelled",
        summary.submitted, summary.succeeded, summary.failed, summary.cancelled
    );
}

/// Cache state of one entity, one line per entry.
fn status_lines(document: &CacheDocument) -> Vec<String> {
    let mut lines = vec![
        format!("Discovered titles: {}", document.discovered_items.len()),
        format!("Pages tracked: {}", document.page_freshness.len()),
        format!("Last page fetched: {}", document.last_page_fetched),
        format!(
            "Passes: {} ({} full)",
            document.counters.fetch_count, document.counters.full_fetch_count
        ),
    ];
    if let Some(updated) = document.updated_at {
        lines.push(format!("Updated: {}", updated.to_rfc3339()));
    }

    let missing: Vec<_> = document.missing_entries().collect();
    lines.push(format!("Downloaded: {}", document.downloaded_titles().len()));
    lines.push(format!("Missing: {}", missing.len()));
    for (title, entry) in &missing {
        match &entry.url {
            Some(url) => lines.push(format!("  - {title} <{url}>")),
            None => lines.push(format!("  - {title}")),
        }
    }
    lines
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Arc::new(Config::load_or_default(&config_path));
    let storage = LocalStorage::new(config.cache_dir(&cli.storage_dir));

    match cli.command {
        Command::Scan {
            entities,
            max_pages,
        } => {
            let all = Entity::load_all(entities_path(&cli.storage_dir))?;
            let selected = select_entities(all, &entities)?;

            let config = match max_pages {
                Some(max) => {
                    let mut config = (*config).clone();
                    config.crawler.max_pages = Some(max);
                    Arc::new(config)
                }
                None => config,
            };

            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, cancelling scan...");
                    signal_token.cancel();
                }
            });

            let summary =
                pipeline::run_scan(config, &cli.storage_dir, selected, cancel).await?;
            print_summary(&summary);

            if summary.failed > 0 {
                return Err(AppError::validation(format!(
                    "{} entities failed",
                    summary.failed
                )));
            }
        }

        Command::Status { entity } => {
            let key = normalize_name(&entity);
            let document = storage.load(&key).await?;

            println!("Entity: {}", key);
            println!(
                "Document: {}",
                storage.root_dir().join(LocalStorage::document_key(&key)).display()
            );
            for line in status_lines(&document) {
                println!("{line}");
            }
        }

        Command::MarkDownloaded { entity, title } => {
            let normalizer = TitleNormalizer::from_config(&config.cleaning)?;
            let key = normalize_name(&entity);
            let title = normalizer.normalize(&title);
            if title.is_empty() {
                return Err(AppError::validation("title is empty after normalization"));
            }

            storage.mark_downloaded(&key, &title).await?;
            log::info!("Marked '{}' as downloaded for {}", title, key);
        }

        Command::Clear { entity } => {
            let key = normalize_name(&entity);
            if storage.clear(&key).await? {
                log::info!("Cleared cache for {}", key);
            } else {
                log::info!("No cache found for {}", key);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            TitleNormalizer::from_config(&config.cleaning)?;
            log::info!("✓ Config OK");

            let entities = Entity::load_all(entities_path(&cli.storage_dir))?;
            validate_entities(&entities)?;
            log::info!("✓ {} entities OK", entities.len());

            log::info!("All validations passed!");
        }
    }

    Ok(())
}
