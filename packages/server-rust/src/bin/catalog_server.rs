//! Book catalog server binary.
//!
//! Wires the record store, the author client and the resilience settings
//! from flags or `CATALOG_*` environment variables, then serves HTTP until
//! Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use catalog_core::BookPayload;
use catalog_server::author::{AuthorClientConfig, HttpAuthorClient};
use catalog_server::network::{NetworkConfig, NetworkModule};
use catalog_server::service::{
    BulkheadConfig, CatalogService, CircuitBreakerConfig, ResilienceConfig, RetryConfig,
    ServerConfig,
};
use catalog_server::storage::HashMapBookStore;
use catalog_server::BookStore;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Book catalog with an author-enriched listing.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bind address
    #[arg(long, env = "CATALOG_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 = OS-assigned)
    #[arg(short, long, env = "CATALOG_PORT", default_value_t = 8081)]
    port: u16,

    /// Base URL of the author service
    #[arg(long, env = "CATALOG_AUTHOR_URL", default_value = "http://127.0.0.1:8080")]
    author_url: String,

    /// Connect timeout for the author service, in milliseconds
    #[arg(long, env = "CATALOG_AUTHOR_CONNECT_TIMEOUT_MS", default_value_t = 1000)]
    author_connect_timeout_ms: u64,

    /// Author lookups in flight per listing run (1 = sequential)
    #[arg(long, env = "CATALOG_LOOKUP_CONCURRENCY", default_value_t = 1)]
    lookup_concurrency: usize,

    /// Retries after the first failed attempt
    #[arg(long, env = "CATALOG_RETRY_MAX", default_value_t = 2)]
    retry_max: u32,

    /// Base delay between attempts, in milliseconds
    #[arg(long, env = "CATALOG_RETRY_DELAY_MS", default_value_t = 400)]
    retry_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay, in milliseconds
    #[arg(long, env = "CATALOG_RETRY_JITTER_MS", default_value_t = 300)]
    retry_jitter_ms: u64,

    /// Cumulative retry budget from the first failure, in milliseconds
    #[arg(long, env = "CATALOG_RETRY_BUDGET_MS", default_value_t = 3000)]
    retry_budget_ms: u64,

    /// Bound on a single attempt, in milliseconds
    #[arg(long, env = "CATALOG_ATTEMPT_TIMEOUT_MS", default_value_t = 5000)]
    attempt_timeout_ms: u64,

    /// Concurrent listing runs
    #[arg(long, env = "CATALOG_BULKHEAD_CONCURRENT", default_value_t = 5)]
    bulkhead_concurrent: usize,

    /// Callers allowed to wait for a listing slot
    #[arg(long, env = "CATALOG_BULKHEAD_WAITING", default_value_t = 10)]
    bulkhead_waiting: usize,

    /// Rolling window size of the circuit breaker
    #[arg(long, env = "CATALOG_CIRCUIT_WINDOW", default_value_t = 10)]
    circuit_window: usize,

    /// Failure ratio that opens the circuit
    #[arg(long, env = "CATALOG_CIRCUIT_FAILURE_RATIO", default_value_t = 0.4)]
    circuit_failure_ratio: f64,

    /// Half-open successes that close the circuit
    #[arg(long, env = "CATALOG_CIRCUIT_SUCCESSES", default_value_t = 3)]
    circuit_successes: u32,

    /// Time the circuit stays open, in milliseconds
    #[arg(long, env = "CATALOG_CIRCUIT_DELAY_MS", default_value_t = 5000)]
    circuit_delay_ms: u64,

    /// Surface listing failures instead of serving the plain listing
    #[arg(long, env = "CATALOG_NO_FALLBACK")]
    no_fallback: bool,

    /// Total request timeout, in seconds
    #[arg(long, env = "CATALOG_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "CATALOG_LOG_JSON")]
    log_json: bool,

    /// Insert a few sample books at startup
    #[arg(long)]
    seed_demo: bool,

    /// `PostgreSQL` connection URL; the in-memory store is used when absent
    #[cfg(feature = "postgres")]
    #[arg(long, env = "CATALOG_DATABASE_URL")]
    database_url: Option<String>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            lookup_concurrency: self.lookup_concurrency,
            resilience: ResilienceConfig {
                retry: RetryConfig {
                    max_retries: self.retry_max,
                    delay_ms: self.retry_delay_ms,
                    jitter_ms: self.retry_jitter_ms,
                    max_duration_ms: self.retry_budget_ms,
                },
                attempt_timeout_ms: self.attempt_timeout_ms,
                bulkhead: BulkheadConfig {
                    max_concurrent: self.bulkhead_concurrent,
                    max_waiting: self.bulkhead_waiting,
                },
                circuit_breaker: CircuitBreakerConfig {
                    request_volume_threshold: self.circuit_window,
                    failure_ratio: self.circuit_failure_ratio,
                    success_threshold: self.circuit_successes,
                    delay_ms: self.circuit_delay_ms,
                },
                fallback_enabled: !self.no_fallback,
            },
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    fn author_config(&self) -> AuthorClientConfig {
        AuthorClientConfig {
            base_url: self.author_url.clone(),
            connect_timeout: Duration::from_millis(self.author_connect_timeout_ms),
        }
    }
}

fn init_logging(json: bool) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(feature = "postgres")]
async fn open_store(cli: &Cli) -> Result<Arc<dyn BookStore>> {
    use catalog_server::storage::PostgresBookStore;

    if let Some(url) = &cli.database_url {
        let store = PostgresBookStore::connect(url, 5)
            .await
            .context("failed to connect to PostgreSQL")?;
        info!("using PostgreSQL book store");
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(HashMapBookStore::new()))
}

#[cfg(not(feature = "postgres"))]
#[allow(clippy::unused_async)]
async fn open_store(_cli: &Cli) -> Result<Arc<dyn BookStore>> {
    Ok(Arc::new(HashMapBookStore::new()))
}

async fn seed_demo(store: &dyn BookStore) -> Result<()> {
    let samples = [
        ("978-0134685991", "Effective Java", "jbloch", 45.0),
        ("978-1593278281", "The Rust Programming Language", "sklabnik", 39.95),
        ("978-1492052593", "Programming Rust", "jblandy", 59.99),
    ];
    for (isbn, title, author, price) in samples {
        store
            .insert(BookPayload {
                id: None,
                isbn: isbn.to_string(),
                title: title.to_string(),
                author: author.to_string(),
                price,
            })
            .await?;
    }
    info!(count = samples.len(), "seeded demo books");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C; shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "starting catalog server");

    let store = open_store(&cli).await?;
    store
        .initialize()
        .await
        .context("failed to initialize book store")?;
    if cli.seed_demo {
        seed_demo(store.as_ref()).await?;
    }

    let authors = Arc::new(
        HttpAuthorClient::new(&cli.author_config()).context("failed to build author client")?,
    );
    let catalog = Arc::new(CatalogService::new(
        Arc::clone(&store),
        authors,
        &cli.server_config(),
    ));

    let mut network = NetworkModule::new(cli.network_config(), catalog);
    let port = network.start().await?;
    info!(port, author_url = %cli.author_url, "catalog server ready");

    network.serve(shutdown_signal()).await?;

    store.close().await.context("failed to close book store")?;
    info!("catalog server stopped");
    Ok(())
}
