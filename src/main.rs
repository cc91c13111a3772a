//! Sat-Harvest main entry point
//!
//! This is the command-line interface for the Sat-Harvest catalog harvester.

use anyhow::Context;
use clap::Parser;
use sat_harvest::config::{load_config_with_hash, Config};
use sat_harvest::crawler::{harvest, StopSignal};
use sat_harvest::query::SearchQuery;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Sat-Harvest: a satellite catalog feed harvester
///
/// Sat-Harvest queries a satellite product catalog for an area of interest,
/// follows the paginated Atom result feed and publishes one message per new
/// product to a message broker.
#[derive(Parser, Debug)]
#[command(name = "sat-harvest")]
#[command(version)]
#[command(about = "A satellite catalog feed harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the search that would run without running it
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show run history from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Run a single harvest even if a schedule interval is configured
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_harvest(&config, &config_hash, cli.once).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sat_harvest=info,warn"),
            1 => EnvFilter::new("sat_harvest=debug,info"),
            2 => EnvFilter::new("sat_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the search
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let query = SearchQuery::from_config(&config.catalog, &config.query)?;

    println!("=== Sat-Harvest Dry Run ===\n");

    println!("Catalog:");
    println!("  Endpoint: {}", config.catalog.endpoint);
    println!("  Username: {}", config.catalog.username);
    println!("  Timeout: {}s", config.catalog.timeout_secs);
    println!("  Max retries: {}", config.catalog.max_retries);

    println!("\nSearch:");
    println!("  Filter: {}", query.filter_expression());
    println!("  Seed URL: {}", query.search_url());

    println!("\nPagination:");
    if config.pagination.relations.is_empty() {
        println!("  Relations: any");
    } else {
        println!("  Relations: {}", config.pagination.relations.join(", "));
    }
    println!(
        "  Allow: {}",
        config.pagination.allow.as_deref().unwrap_or("any URL")
    );
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    match config.crawler.max_pages {
        Some(max) => println!("  Max pages: {}", max),
        None => println!("  Max pages: unlimited"),
    }

    println!("\nBroker:");
    println!("  URL: {}", config.broker.url);
    println!("  Subject: {}", config.broker.subject());

    println!("\nState:");
    println!("  Dedup: {:?}", config.state.dedup);
    println!(
        "  Database: {}",
        config.state.database_path.as_deref().unwrap_or("none")
    );
    match config.schedule.interval_secs {
        Some(secs) => println!("  Interval: every {}s", secs),
        None => println!("  Interval: single run"),
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows run history from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use std::path::Path;
    use sat_harvest::output::{load_statistics, print_statistics};
    use sat_harvest::storage::SqliteStorage;

    let path = config
        .state
        .database_path
        .as_deref()
        .context("No database-path configured in [state]")?;
    println!("Database: {}\n", path);

    let storage = SqliteStorage::new(Path::new(path))
        .with_context(|| format!("Failed to open database {}", path))?;
    let stats = load_statistics(&storage, 20)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest loop
///
/// Ctrl-C raises the stop signal: the current run finishes its in-flight
/// fetches and no further runs start.
async fn handle_harvest(config: &Config, config_hash: &str, once: bool) -> anyhow::Result<()> {
    let stop = StopSignal::new();
    let interval = match (once, config.schedule.interval_secs) {
        (false, Some(secs)) => Some(Duration::from_secs(secs)),
        _ => None,
    };

    let signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after in-flight fetches");
            signal.raise();
        }
    });

    loop {
        let started = tokio::time::Instant::now();

        let outcome = harvest(config, config_hash, &stop).await;

        let Some(interval) = interval else {
            outcome.context("Harvest run failed")?.log_summary();
            break;
        };
        match outcome {
            Ok(report) => report.log_summary(),
            Err(e) => tracing::error!("Harvest run failed: {}", e),
        }
        if stop.is_raised() {
            break;
        }

        let next = started + interval;
        let wait = next.saturating_duration_since(tokio::time::Instant::now());
        tracing::info!("Next run in {}s", wait.as_secs());
        tokio::select! {
            _ = tokio::time::sleep_until(next) => {}
            _ = stop.raised() => break,
        }
    }

    Ok(())
}
