//! # malmail CLI
//!
//! ## Usage
//!
//! ```bash
//! malmail --config ./config/malmail.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `malmail init` | Create the SQLite database and schema |
//! | `malmail ingest` | Read the mailbox and record the links it contains |
//! | `malmail crawl` | Fetch unexplored URLs with every identity |
//! | `malmail run` | `ingest` followed by `crawl` |
//! | `malmail fetch <url>` | Fetch one URL with every identity, no database |
//! | `malmail stats` | Summarize the database |
//!
//! Logs go to stderr (`RUST_LOG`, default `malmail=info,warn`); command
//! summaries go to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use malmail::config::{self, Config};
use malmail::crawl::{CrawlReport, CrawlScheduler};
use malmail::fetcher::MultiAgentFetcher;
use malmail::ingest::{self, IngestReport};
use malmail::mailbox::DirectoryMailbox;
use malmail::migrate;
use malmail::snapshot;
use malmail::sqlite_store::SqliteStore;
use malmail::stats;
use malmail::transport::HttpTransport;

/// malmail: find links in suspect email and check whether the sites
/// behind them serve different content to different browsers.
#[derive(Parser)]
#[command(name = "malmail", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/malmail.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema. Safe to run repeatedly.
    Init,

    /// Parse every message in the mailbox and record its links.
    Ingest {
        /// Mailbox directory, overriding `mailbox.root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Fetch unexplored URLs with each identity, for up to `depth` rounds.
    Crawl {
        /// Fetch rounds, overriding `crawl.depth`.
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Ingest the mailbox, then crawl.
    Run {
        /// Fetch rounds, overriding `crawl.depth`.
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Fetch a single URL with every identity without touching the database.
    Fetch {
        url: String,

        /// Write each distinct response and an identity log to this directory.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the grouped responses as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show database counts.
    Stats,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("malmail=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let config = config::load_config(&cli.config)?;
            migrate::run_migrations(&config).await?;
            println!("init");
            println!("  database: {}", config.db.path.display());
            println!("ok");
        }
        Commands::Ingest { root } => {
            let mut config = config::load_config(&cli.config)?;
            if let Some(root) = root {
                config.mailbox.root = root;
            }
            let store = SqliteStore::open(&config).await?;
            let result = run_ingest(&config, &store).await;
            store.close().await;
            result?.print();
        }
        Commands::Crawl { depth } => {
            let config = with_depth(config::load_config(&cli.config)?, depth)?;
            let store = SqliteStore::open(&config).await?;
            let result = run_crawl(&config, &store).await;
            store.close().await;
            result?.print();
        }
        Commands::Run { depth } => {
            let config = with_depth(config::load_config(&cli.config)?, depth)?;
            let store = SqliteStore::open(&config).await?;
            let result = ingest_then_crawl(&config, &store).await;
            store.close().await;
            let (ingested, crawled) = result?;
            ingested.print();
            crawled.print();
        }
        Commands::Fetch { url, out, json } => {
            let config = config_or_minimal(&cli.config)?;
            let fetcher = MultiAgentFetcher::new(
                HttpTransport::new()?,
                config.crawl.user_agents.clone(),
                config.crawl.timeout(),
            )
            .with_concurrency(config.crawl.identity_concurrency);

            let outcome = fetcher.fetch(&url).await;
            if let Some(dir) = out {
                let snap = snapshot::write_snapshot(&outcome.groups, &dir)?;
                tracing::info!(log = %snap.log.display(), files = snap.bodies.len(), "snapshot written");
            }
            if json {
                println!("{}", snapshot::outcome_json(&url, &outcome)?);
            } else {
                snapshot::print_outcome(&url, &outcome);
            }
        }
        Commands::Stats => {
            let config = config::load_config(&cli.config)?;
            stats::run_stats(&config).await?;
        }
    }

    Ok(())
}

async fn run_ingest(config: &Config, store: &SqliteStore) -> Result<IngestReport> {
    let mailbox = DirectoryMailbox::from_config(&config.mailbox)?;
    ingest::ingest_mailbox(store, &mailbox, &config.mailbox.trusted_senders)
        .await
        .with_context(|| format!("ingesting mailbox {}", mailbox.root().display()))
}

async fn run_crawl(config: &Config, store: &SqliteStore) -> Result<CrawlReport> {
    let scheduler = CrawlScheduler::from_config(HttpTransport::new()?, &config.crawl);
    scheduler.run(store).await
}

async fn ingest_then_crawl(
    config: &Config,
    store: &SqliteStore,
) -> Result<(IngestReport, CrawlReport)> {
    let ingested = run_ingest(config, store).await?;
    let crawled = run_crawl(config, store).await?;
    Ok((ingested, crawled))
}

fn with_depth(mut config: Config, depth: Option<usize>) -> Result<Config> {
    if let Some(depth) = depth {
        config.crawl.depth = depth;
        config::validate(&config)?;
    }
    Ok(config)
}

fn config_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}
