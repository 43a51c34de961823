//! CLI entry point for the pixivfetch tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::Parser;
use pixivfetch_core::crawlers::{Pipeline, SearchOrder};
use pixivfetch_core::{
    BookmarkCrawler, Config, Crawler, KeywordCrawler, RankingCrawler, UserCrawler, storage,
};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Pixivfetch starting");

    let config = Arc::new(build_config(&args)?);
    storage::ensure_dir(&config.download.store_path)
        .await
        .context("cannot create store directory")?;

    let pipeline = Pipeline::new(Arc::clone(&config)).context("cannot build pipeline")?;
    let crawler: Box<dyn Crawler> = match &args.command {
        Command::Ranking {
            modes,
            date,
            days,
            per_date,
        } => {
            let start_date = parse_start_date(date.as_deref())?;
            Box::new(RankingCrawler::new(
                pipeline,
                modes.clone(),
                start_date,
                *days,
                *per_date,
            ))
        }
        Command::Bookmark { count, private } => {
            if *private {
                Box::new(BookmarkCrawler::private(pipeline, *count))
            } else {
                Box::new(BookmarkCrawler::new(pipeline, *count))
            }
        }
        Command::Keyword {
            keyword,
            popular,
            mode,
            count,
        } => {
            let order = if *popular {
                SearchOrder::Popular
            } else {
                SearchOrder::DateDescending
            };
            Box::new(KeywordCrawler::new(
                pipeline,
                keyword.clone(),
                order,
                (*mode).into(),
                *count,
            ))
        }
        Command::User { artist_id } => Box::new(UserCrawler::new(pipeline, artist_id.clone())),
    };

    let summary = crawler
        .run()
        .await
        .with_context(|| format!("{} crawl failed", crawler.name()))?;

    info!(
        identifiers = summary.identifiers,
        images = summary.images,
        downloaded = summary.download.downloaded(),
        skipped = summary.download.skipped(),
        failed = summary.download.failed(),
        bytes = summary.download.bytes(),
        "Pixivfetch finished"
    );

    if config.download.url_only {
        for url in &summary.url_manifest {
            println!("{url}");
        }
    }

    Ok(())
}

/// Loads the configuration file (when given) and applies CLI overrides.
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("cannot load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(output) = &args.output {
        config.download.store_path.clone_from(output);
    }
    if let Some(threads) = args.threads {
        config.download.num_threads = usize::from(threads);
    }
    if let Some(delay) = args.delay {
        config.download.download_delay_secs = delay;
    }
    if args.url_only {
        config.download.url_only = true;
    }
    if args.with_tag {
        config.download.with_tag = true;
    }
    if args.bookmark_data {
        config.download.bookmark = true;
    }
    Ok(config)
}

/// Parses a `YYYY-MM-DD` start date; defaults to yesterday (rankings are
/// published with a one-day lag).
fn parse_start_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .with_context(|| format!("invalid date `{text}`, expected YYYY-MM-DD")),
        None => Ok(Local::now().date_naive() - Duration::days(1)),
    }
}
