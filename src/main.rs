//! Wygrzeb Search Service
//! Multi-source search aggregation for news, fact-checks, social posts and
//! Polish public data
//!
//! Features:
//! - Seven upstream providers queried in parallel (NewsAPI, Google News,
//!   Google Fact Check, X/Twitter, dane.gov.pl, Statistics Poland, SDG Poland)
//! - Exponential backoff for retryable errors, one fallback call per source
//! - Per-call timeout and per-source deadline
//! - Optional circuit breaker per source
//! - Semaphore-based concurrency limiting
//! - Graceful shutdown with SIGTERM handling
//! - Correlation IDs for every search
//! - Prometheus metrics at /metrics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wygrzeb_search::aggregator::SourceHealth;
use wygrzeb_search::http_client::ResilientHttpClient;
use wygrzeb_search::server::{self, AppState};
use wygrzeb_search::{AggregatedResponse, Aggregator, Config, RawSearchRequest, SourceRegistry};

/// Wygrzeb Search - multi-source search aggregation
#[derive(Parser, Debug)]
#[command(name = "wygrzeb")]
#[command(author = "Wygrzeb Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Searches news, fact-checks, social posts and Polish public data in one query")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file layered under environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP search API
    Serve {
        /// Address to bind, overrides BIND_ADDRESS
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Run one search and print the results
    Search {
        /// Search query
        query: String,

        #[arg(short, long, default_value = "1")]
        page: i64,

        #[arg(long, default_value = "10")]
        page_size: i64,

        /// relevance, date or popularity
        #[arg(long)]
        sort_by: Option<String>,

        /// asc or desc
        #[arg(long)]
        sort_order: Option<String>,

        /// ISO language code, or "all"
        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        country: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Query a single source
        #[arg(short, long)]
        source: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// news, fact-check, social, government or dataset
        #[arg(long)]
        source_category: Option<String>,

        /// Comma-separated source ids
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Per-source deadline (e.g. "5s", "1500ms"), overrides SOURCE_DEADLINE_MS
        #[arg(long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,

        #[arg(short, long, value_enum, default_value = "summary")]
        output: OutputFormat,
    },

    /// List registered sources
    Sources {
        /// Probe every source
        #[arg(long)]
        check: bool,

        /// Bound on each probe
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Json,
    Table,
    Summary,
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Resolves on SIGTERM/SIGINT
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn build_aggregator(config: &Config) -> Result<Aggregator> {
    let client = Arc::new(ResilientHttpClient::new(config.http_client_config())?);
    let registry = SourceRegistry::from_config(config, client);
    Ok(Aggregator::new(Arc::new(registry), config.retry_policy()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Wygrzeb Search");

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate()?;

    info!(
        max_retries = config.max_retries,
        source_timeout_ms = config.source_timeout_ms,
        source_deadline_ms = config.source_deadline_ms,
        max_concurrent = config.max_concurrent_requests,
        circuit_breaker = config.circuit_breaker_enabled,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Serve { bind } => {
            let addr = match bind {
                Some(addr) => addr,
                None => config
                    .bind_address
                    .parse()
                    .with_context(|| format!("Invalid bind address {}", config.bind_address))?,
            };
            run_server(config, addr).await?;
        }

        Commands::Search {
            query,
            page,
            page_size,
            sort_by,
            sort_order,
            language,
            country,
            from,
            to,
            source,
            category,
            source_category,
            sources,
            deadline,
            output,
        } => {
            if let Some(deadline) = deadline {
                config.source_deadline_ms = deadline.as_millis() as u64;
                config.validate()?;
            }
            let raw = RawSearchRequest {
                page: Some(page),
                page_size: Some(page_size),
                sort_by,
                sort_order,
                language,
                country,
                date_from: from,
                date_to: to,
                source,
                category,
                source_category,
                enabled_sources: sources,
                ..RawSearchRequest::new(query)
            };
            run_search(&config, raw, output).await?;
        }

        Commands::Sources { check, timeout } => {
            let timeout = timeout.unwrap_or_else(|| config.health_check_timeout());
            show_sources(&config, check, timeout).await?;
        }
    }

    Ok(())
}

/// Runs the HTTP API until a shutdown signal arrives
async fn run_server(config: Config, addr: SocketAddr) -> Result<()> {
    let aggregator = build_aggregator(&config)?;
    let state = Arc::new(AppState {
        aggregator,
        health_check_timeout: config.health_check_timeout(),
        metrics_enabled: config.metrics_enabled,
    });

    if let Err(e) = server::serve(addr, state, shutdown_signal()).await {
        error!(error = %e, "Search API failed");
        return Err(e.into());
    }

    info!("Wygrzeb Search stopped");
    Ok(())
}

/// Runs a single search from the command line
async fn run_search(config: &Config, raw: RawSearchRequest, output: OutputFormat) -> Result<()> {
    let aggregator = build_aggregator(config)?;
    let response = aggregator.search_raw(raw).await?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Table => print_table(&response),
        OutputFormat::Summary => print_summary(&response),
    }

    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn print_table(response: &AggregatedResponse) {
    println!(
        "\n{:<18} {:<16} {:<26} {:<12} {}",
        "Source", "Type", "Publisher", "Date", "Title"
    );
    println!("{}", "-".repeat(110));
    for result in &response.results {
        let date = result.date.as_deref().map(|d| truncate(d, 10)).unwrap_or_default();
        println!(
            "{:<18} {:<16} {:<26} {:<12} {}",
            result.source_id.as_ref().map(|s| s.as_str()).unwrap_or("-"),
            result.result_type().as_str(),
            truncate(&result.source.name, 23),
            date,
            truncate(&result.title, 60)
        );
    }
    println!(
        "\nPage {} ({} per page), {} of ~{} results",
        response.page,
        response.page_size,
        response.results.len(),
        response.total_results
    );
    if !response.failed_sources.is_empty() {
        println!("Failed sources: {}", join_ids(response));
    }
}

fn print_summary(response: &AggregatedResponse) {
    println!("\nSearch Summary");
    println!("==============");
    println!("Page:     {} ({} per page)", response.page, response.page_size);
    println!("Returned: {}", response.results.len());
    println!("Total:    ~{}", response.total_results);
    println!("More:     {}", if response.has_more { "yes" } else { "no" });

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
    for result in &response.results {
        *by_type.entry(result.result_type().as_str()).or_insert(0) += 1;
        let source = result.source_id.as_ref().map(|s| s.as_str()).unwrap_or("-");
        *by_source.entry(source).or_insert(0) += 1;
    }

    println!("\nBy Type:");
    for (result_type, count) in by_type {
        println!("  - {}: {}", result_type, count);
    }
    println!("\nBy Source:");
    for (source, count) in by_source {
        println!("  - {}: {}", source, count);
    }

    if !response.failed_sources.is_empty() {
        println!("\nFailed sources: {}", join_ids(response));
    }
}

fn join_ids(response: &AggregatedResponse) -> String {
    response
        .failed_sources
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lists sources, optionally with health checks
async fn show_sources(config: &Config, check: bool, timeout: Duration) -> Result<()> {
    let aggregator = build_aggregator(config)?;

    let reports: Vec<SourceHealth> = if check {
        aggregator.health_check(timeout).await
    } else {
        aggregator.list_sources()
    };

    println!("\nWygrzeb Sources");
    println!("===============\n");
    for report in &reports {
        let credentials = if report.configured { "configured" } else { "no credentials" };
        let fallback = if report.has_fallback { "fallback" } else { "no fallback" };
        let health = match (report.healthy, &report.error) {
            (Some(true), _) => format!("healthy ({} ms)", report.latency_ms.unwrap_or_default()),
            (Some(false), Some(e)) => format!("unhealthy: {}", truncate(e, 80)),
            (Some(false), None) => "unhealthy".to_string(),
            (None, _) => String::new(),
        };
        println!(
            "  - {:<18} {:<11} {:<15} {:<12} {}",
            report.id.as_str(),
            report.category.as_str(),
            credentials,
            fallback,
            health
        );
    }

    Ok(())
}
