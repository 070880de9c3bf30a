//! # HallowWatch
//!
//! The feed-scraping service behind a security watch dashboard. Operators
//! declare feeds (one third-party source plus the tags they care about);
//! HallowWatch periodically scrapes every feed and stores each discovered
//! item once, keyed by URL.
//!
//! ## Usage
//!
//! ```sh
//! hallow_watch --config watch.yaml seed
//! hallow_watch --config watch.yaml run
//! ```
//!
//! ## Architecture
//!
//! 1. **Dispatch**: one independent job per feed, on a fixed interval
//! 2. **Scrape**: the source's strategy issues its requests in order and
//!    streams raw candidates
//! 3. **Normalize**: clean titles, require absolute URLs
//! 4. **Store**: insert each URL at most once; existing rows stay untouched

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod fetcher;
mod jobs;
mod models;
mod normalize;
mod scrapers;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Config;
use jobs::{Dispatcher, Scheduler, run_scrape_job};
use scrapers::ScrapeContext;
use store::Database;
use utils::truncate_for_log;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(config = %args.config, database = ?args.database, command = ?args.command, "Parsed CLI arguments");

    let mut config = Config::load(Path::new(&args.config))?;
    if let Some(database) = args.database {
        config.database = database;
    }
    info!(config_path = %args.config, database = %config.database, "Loaded configuration");

    let db = Database::open(&config.database).await?;

    match args.command {
        Command::Seed => {
            let report = db.seed(&config).await?;
            println!(
                "Seeded {} tags, {} sources, {} feeds",
                report.tags, report.sources, report.feeds
            );
        }
        Command::Scrape { feed_id } => {
            let ctx = ScrapeContext::from_config(&config)?;
            let report = run_scrape_job(&db, &ctx, feed_id).await?;
            println!(
                "Feed {}: {} scraped, {} new, {} already known, {} failed",
                report.feed_id, report.scraped, report.created, report.existing, report.failed
            );
        }
        Command::Dispatch => {
            let ctx = Arc::new(ScrapeContext::from_config(&config)?);
            let mut dispatcher = Dispatcher::new(db.clone(), ctx);
            let handles = dispatcher.dispatch_all().await?;
            let reports = dispatcher.wait_all().await;
            let created: usize = reports.iter().map(|r| r.created).sum();
            println!(
                "{} jobs dispatched, {} succeeded, {} new contents",
                handles.len(),
                reports.len(),
                created
            );
        }
        Command::Run => {
            let ctx = Arc::new(ScrapeContext::from_config(&config)?);
            let scheduler = Scheduler::new(config.schedule.clone(), Dispatcher::new(db.clone(), ctx));
            info!(interval_secs = config.schedule.interval_secs, "Scheduler starting; Ctrl-C to stop");
            scheduler.run(shutdown_signal()).await;
        }
        Command::Feeds => {
            for feed in db.list_feeds().await? {
                println!(
                    "{}\t{}\tactive={}\tcontents={}\tlast_job={}",
                    feed.id,
                    feed,
                    feed.active,
                    db.feed_count(feed.id).await?,
                    feed.last_job_id.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Contents { limit } => {
            let contents = db.list_contents(limit).await?;
            for content in &contents {
                let line = serde_json::to_string(content)?;
                debug!(preview = %truncate_for_log(&line, 120), "Listing content");
                println!("{line}");
            }
            info!(shown = contents.len(), total = db.count_contents().await?, "Listed contents");
        }
        Command::Tags => {
            for tag in db.list_tags().await? {
                println!("{}\t{}\t{}\tcontents={}", tag.id, tag.slug, tag, db.tag_count(tag.id).await?);
            }
        }
        Command::Show { url } => match db.find_content_by_url(&url).await? {
            Some(content) => println!("{}", serde_json::to_string(&content)?),
            None => println!("No content stored for {url}"),
        },
        Command::View { id, unviewed } => {
            db.mark_viewed(id, !unviewed).await?;
            println!("Content {id}: viewed={}", !unviewed);
        }
        Command::Bookmark { id } => {
            let bookmarked = db.toggle_bookmarked(id).await?;
            println!("Content {id}: bookmarked={bookmarked}");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl-C; stopping");
    }
}
