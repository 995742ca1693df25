//! Page Fetcher main entry point
//!
//! This is the command-line interface for the resilient page fetch stage.

use anyhow::{Context, Result};
use clap::Parser;
use page_fetcher::config::{load_config_with_hash, Config};
use page_fetcher::output::{load_infrastructure_summary, print_infrastructure_summary, print_statistics};
use page_fetcher::storage::Backends;
use page_fetcher::url::parse_target;
use page_fetcher::Coordinator;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Page Fetcher: the resilient fetch stage of the crawl pipeline
///
/// Pulls URLs from the input queue, fetches them politely (robots.txt, per-domain
/// rate limits), caches page bodies, publishes webpage events, and routes failures
/// to re-queue or dead-letter while a circuit breaker rides out site outages.
#[derive(Parser, Debug)]
#[command(name = "page-fetcher")]
#[command(version = "1.0.0")]
#[command(about = "Resilient page fetcher for the crawl pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults and environment only when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate and print the resolved configuration, then exit
    #[arg(long, conflicts_with_all = ["stats", "enqueue"])]
    dry_run: bool,

    /// Show queue sizes and published event count, then exit
    #[arg(long, conflicts_with_all = ["dry_run", "enqueue"])]
    stats: bool,

    /// Push URLs onto the input queue and exit
    #[arg(long, value_name = "URL", num_args = 1.., conflicts_with_all = ["dry_run", "stats"])]
    enqueue: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env may carry RUST_LOG, so it is loaded before the subscriber is built
    let env_file = dotenvy::dotenv().ok();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Some(path) = env_file {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    // Load and validate configuration
    let (config, config_hash) = load_config_with_hash(cli.config.as_deref())
        .context("failed to load configuration")?;
    match (&cli.config, config_hash) {
        (Some(path), Some(hash)) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            hash
        ),
        _ => tracing::info!("Using built-in defaults and environment overrides"),
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let backends = Backends::connect(&config)
        .await
        .context("failed to connect to queues, cache or event log")?;

    if cli.stats {
        handle_stats(&backends).await
    } else if !cli.enqueue.is_empty() {
        handle_enqueue(&backends, &cli.enqueue).await
    } else {
        handle_run(&config, backends).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn log_filter(verbose: u8, quiet: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("page_fetcher=info,warn"),
                1 => EnvFilter::new("page_fetcher=debug,info"),
                2 => EnvFilter::new("page_fetcher=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    })
}

/// Handles the --dry-run mode: prints the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Page Fetcher Dry Run ===\n");

    println!("Infrastructure:");
    println!("  Redis: {}", config.infrastructure.redis_url);
    println!("  Event log: {}", config.infrastructure.event_log_path);
    println!(
        "  Topic: {} ({} partitions)",
        config.event_log.topic, config.event_log.partitions
    );
    println!("  Input queue: {}", config.queues.input);
    println!("  Dead-letter queue: {}", config.queues.dead_letter);
    println!("  Poll timeout: {}s", config.queues.poll_timeout_secs);

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!(
        "  Timeouts: request {}s, connect {}s, probe {}s",
        config.http.request_timeout_secs,
        config.http.connect_timeout_secs,
        config.http.probe_timeout_secs
    );
    println!("  Max redirects: {}", config.http.max_redirects);
    println!(
        "  Attempts: {} (backoff base {}s, Retry-After cap {}s)",
        config.http.max_attempts,
        config.http.retry_backoff_base_secs,
        config.http.max_retry_after_secs
    );
    println!("  Cache TTL: {}s", config.cache.ttl_secs);

    println!("\nPoliteness:");
    println!(
        "  Rate limit: {} requests/s per domain",
        config.rate_limit.requests_per_second
    );
    println!("  robots.txt TTL: {}s", config.robots.cache_ttl_secs);

    println!("\nCircuit Breaker:");
    println!(
        "  Opens after {} consecutive site-wide failures",
        config.circuit_breaker.failure_threshold
    );
    println!(
        "  Backoff {}s -> {}s (x{})",
        config.circuit_breaker.initial_backoff_secs,
        config.circuit_breaker.max_backoff_secs,
        config.circuit_breaker.backoff_multiplier
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows shared queue and log sizes
async fn handle_stats(backends: &Backends) -> Result<()> {
    let summary = load_infrastructure_summary(backends)
        .await
        .context("failed to read infrastructure sizes")?;
    print_infrastructure_summary(&summary);
    Ok(())
}

/// Handles the --enqueue mode: pushes valid URLs onto the input queue
async fn handle_enqueue(backends: &Backends, urls: &[String]) -> Result<()> {
    let mut pushed = 0;
    for raw in urls {
        if let Err(e) = parse_target(raw) {
            tracing::warn!("Not enqueueing {}: {}", raw, e);
            continue;
        }
        backends
            .input_queue
            .push(raw)
            .await
            .with_context(|| format!("failed to enqueue {}", raw))?;
        pushed += 1;
    }
    println!("Enqueued {} of {} URLs", pushed, urls.len());
    Ok(())
}

/// Runs the processing loop until SIGINT/SIGTERM
async fn handle_run(config: &Config, backends: Backends) -> Result<()> {
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing current step");
        signal_cancel.cancel();
    });

    let mut coordinator =
        Coordinator::new(config, backends).context("failed to build the fetcher")?;

    match coordinator.run(cancel).await {
        Ok(stats) => {
            print_statistics(&stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Page fetcher stopped: {}", e);
            Err(e.into())
        }
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rust_log_from_env_file_drives_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "RUST_LOG=page_fetcher=trace").unwrap();

        dotenvy::from_path_override(&path).unwrap();

        assert!(log_filter(0, true).to_string().contains("page_fetcher=trace"));
    }

    #[test]
    fn test_cli_parses_enqueue_list() {
        let cli = Cli::parse_from([
            "page-fetcher",
            "--enqueue",
            "https://example.com/a",
            "https://example.com/b",
        ]);
        assert_eq!(cli.enqueue.len(), 2);
        assert!(cli.config.is_none());
    }
}
