//! Catalog Harvest main entry point
//!
//! This is the command-line interface for the catalog harvester.

use anyhow::Context;
use catalog_harvest::config::{load_config, Config};
use catalog_harvest::crawler::{harvest, HarvestRequest};
use catalog_harvest::output::print_report;
use catalog_harvest::state::{CrawlPhase, StateFile};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog Harvest: a resumable patent catalog harvester
///
/// Walks the result pages of a catalog search, then fetches details for every
/// record not yet enriched. Interrupted runs continue where they stopped.
///
/// Exit codes: 0 when nothing is left, 2 when the run stopped early and can be
/// resumed, 1 when no authenticated session could be established.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A resumable patent catalog harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Catalog column to search (e.g. NomeDepositante)
    #[arg(value_name = "SEARCH_COLUMN")]
    search_column: String,

    /// Search expression
    #[arg(value_name = "QUERY")]
    query: String,

    /// Last listing page to fetch in this run
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Maximum number of detail pages to fetch in this run
    #[arg(long, value_name = "N")]
    max_records: Option<usize>,

    /// Start the search over instead of continuing from the last page
    #[arg(long)]
    fresh: bool,

    /// Keep fetching details after a record fails
    #[arg(long)]
    continue_on_error: bool,

    /// Session cookies ("NAME=value; NAME2=value2"), overriding the config file
    #[arg(long, env = "HARVEST_COOKIES", hide_env_values = true)]
    cookies: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show where the harvest would start, without any request
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the state file and record table and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(cookies) = &cli.cookies {
        config.session.cookies = Some(cookies.clone());
    }

    let request = HarvestRequest {
        query: cli.query.clone(),
        search_column: cli.search_column.clone(),
        max_pages: cli.max_pages,
        max_records: cli.max_records,
        continue_from_last: !cli.fresh,
        continue_on_error: cli.continue_on_error,
    };

    if cli.dry_run {
        handle_dry_run(&config, &request)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        let code = handle_harvest(config, &request).await?;
        std::process::exit(code);
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved config and the start decision
fn handle_dry_run(config: &Config, request: &HarvestRequest) -> anyhow::Result<()> {
    println!("=== Catalog Harvest Dry Run ===\n");

    println!("Catalog:");
    println!("  Search URL: {}", config.catalog.search_url);
    println!("  Probe URL: {}", config.catalog.probe_url);
    println!("  Records per page: {}", config.catalog.records_per_page);

    println!("\nCrawler:");
    println!("  Request interval: {}ms", config.crawler.request_interval_ms);
    println!("  Request timeout: {}ms", config.crawler.request_timeout_ms);
    println!("  Detail timeout: {}ms", config.crawler.detail_timeout_ms);
    println!("  Checkpoint every: {} pages", config.crawler.checkpoint_every_pages);
    println!("  Flush every: {} records", config.crawler.flush_every_records);
    println!("  Probe before request: {}", config.crawler.probe_before_request);

    println!("\nSession:");
    println!("  User agent: {}", config.session.user_agent);
    println!(
        "  Cookies: {}",
        if config.session.cookies.is_some() { "provided" } else { "none" }
    );

    println!("\nOutput:");
    println!("  Records: {}", config.output.records_path);
    println!("  State: {}", config.output.state_path);
    if let Some(cache_dir) = &config.output.cache_dir {
        println!("  Page cache: {}", cache_dir);
    }
    println!("  Enrichment signal: {}", config.output.enrichment_signal);

    let mut state = match StateFile::new(&config.output.state_path).load() {
        Ok(state) => state.unwrap_or_default(),
        Err(e) => {
            println!("\n! {} (a harvest would set it aside and start fresh)", e);
            Default::default()
        }
    };
    let phase = state.resolve(&request.query, &request.search_column, request.continue_from_last);

    println!("\nSearch: '{}' in {}", request.query, request.search_column);
    match phase {
        CrawlPhase::Fresh => println!("✓ Would start a new search from page 1"),
        CrawlPhase::Resuming { next_page } => println!(
            "✓ Would continue from page {} of {}",
            next_page, state.total_pages
        ),
        CrawlPhase::Exhausted => println!(
            "✓ All {} pages already processed; would only fetch missing details",
            state.total_pages
        ),
    }
    println!("✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the durable files
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use catalog_harvest::output::{load_statistics, print_statistics};

    println!("Records: {}", config.output.records_path);
    println!("State: {}\n", config.output.state_path);

    let stats = load_statistics(config).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest and returns the process exit code
async fn handle_harvest(config: Config, request: &HarvestRequest) -> anyhow::Result<i32> {
    if request.continue_from_last {
        tracing::info!("Starting harvest (will resume a matching previous search)");
    } else {
        tracing::info!("Starting fresh harvest (ignoring previous pagination)");
    }

    match harvest(config, request).await {
        Ok(report) => {
            print_report(&report);
            Ok(report.outcome.exit_code())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
