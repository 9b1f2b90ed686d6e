//! issuedebt-sync - CLI tool to refresh the local issue cache
//!
//! Fetches every issue and pull request from the configured GitHub issues
//! endpoint (or reads a JSON dump), normalizes the payloads and merges them
//! into the cache snapshot by id.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Cache: $XDG_DATA_HOME/issuedebt/cache.json (~/.local/share/issuedebt/cache.json)
//! - Logs: $XDG_STATE_HOME/issuedebt/ (~/.local/state/issuedebt/)
//! - Config: $XDG_CONFIG_HOME/issuedebt/config.toml (~/.config/issuedebt/config.toml)

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use issuedebt_core::ingest::{ingest, load_payloads, IngestSummary, SyncFetcher};
use issuedebt_core::{CacheStore, Config, MalformedRecord, Normalizer};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "issuedebt-sync")]
#[command(about = "Fetch GitHub issues into the local cache")]
#[command(version)]
struct Args {
    /// Verbose output (-v lists skipped payloads)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Discard the cache before syncing (recovers from a corrupt snapshot)
    #[arg(long)]
    flush: bool,

    /// Read payloads from a JSON file instead of the GitHub API
    #[arg(long, value_name = "PATH")]
    from_file: Option<PathBuf>,

    /// Normalize but don't write the cache
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        issuedebt_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("issuedebt-sync starting");

    let cache = CacheStore::at(config.resolved_cache_path());
    println!("Cache: {}", cache.path().display());

    if args.flush && !args.dry_run {
        cache.flush().context("failed to flush cache")?;
        println!("Cache flushed");
    }

    let payloads = match &args.from_file {
        Some(path) => {
            let payloads = load_payloads(path)
                .with_context(|| format!("failed to read payloads from {}", path.display()))?;
            println!("Read {} payload(s) from {}", payloads.len(), path.display());
            payloads
        }
        None => fetch(&config)?,
    };

    let normalizer = Normalizer::new(config.priorities.clone(), config.labels.clone());

    if args.dry_run {
        let outcome = normalizer.normalize_batch(&payloads);
        println!("\nDry run - cache not modified");
        println!("  Records:   {}", outcome.records.len());
        println!("  Malformed: {}", outcome.malformed.len());
        print_malformed(&outcome.malformed, args.verbose);
        tracing::info!("Dry run complete");
        return Ok(());
    }

    let summary = ingest(&payloads, &normalizer, &cache).context("failed to update cache")?;
    print_summary(&summary, args.verbose);

    tracing::info!(
        received = summary.received,
        normalized = summary.normalized,
        malformed = summary.malformed.len(),
        total = summary.merge.total,
        "issuedebt-sync complete"
    );

    Ok(())
}

/// Fetch every page from the API with a spinner
fn fetch(config: &Config) -> Result<Vec<Value>> {
    let fetcher =
        SyncFetcher::new(config.github.clone()).context("failed to create GitHub client")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Fetching page 1...");

    let outcome = fetcher
        .fetch_all(|page, total| {
            pb.set_message(format!("Fetching page {} ({} items so far)", page + 1, total));
        })
        .context("failed to fetch issues")?;

    pb.finish_and_clear();

    println!(
        "Fetched {} payload(s) from {} page(s) (stopped: {})",
        outcome.payloads.len(),
        outcome.pages,
        outcome.stopped
    );
    Ok(outcome.payloads)
}

fn print_malformed(malformed: &[MalformedRecord], verbose: u8) {
    if verbose >= 1 {
        for record in malformed {
            println!("    skipped {}", record);
        }
    }
}

fn print_summary(summary: &IngestSummary, verbose: u8) {
    println!("\nSync complete:");
    println!("  Payloads:  {}", summary.received);
    println!("  Records:   {}", summary.normalized);
    println!("  Malformed: {}", summary.malformed.len());
    print_malformed(&summary.malformed, verbose);
    println!("  Inserted:  {}", summary.merge.inserted);
    println!("  Updated:   {}", summary.merge.updated);
    println!("  Unchanged: {}", summary.merge.unchanged);
    println!("  Cached:    {}", summary.merge.total);
}
