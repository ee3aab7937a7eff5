use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crawlq_client::{HttpRendererFactory, XPathExtractor};
use crawlq_core::{
    CrawlRequest, CrawlerConfig, InMemoryQueueStore, JobResult, QueueStore, StatusService,
    SubmissionService, WorkerPool,
};
use crawlq_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "crawlq", version, about = "Queued headless page crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workers against the shared PostgreSQL queue until interrupted
    Worker {
        /// Number of concurrent workers
        #[arg(short, long, env = "CRAWLQ_WORKERS", default_value_t = 1)]
        concurrency: usize,

        /// Allow crawling loopback and private network addresses
        #[arg(long, env = "CRAWLQ_ALLOW_PRIVATE_URLS", default_value_t = false)]
        allow_private_urls: bool,

        /// Render pages with headless Chromium (needs the `browser` feature)
        #[arg(long, default_value_t = false)]
        browser: bool,
    },

    /// Crawl a single URL in-process and print the outcome as JSON
    Crawl {
        /// Target URL
        #[arg(short, long)]
        url: String,

        /// XPath expression to evaluate (repeatable)
        #[arg(short = 'x', long = "x-path")]
        x_paths: Vec<String>,

        /// Return the raw page instead of the reader view
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Omit the page source from the output
        #[arg(long, default_value_t = false)]
        no_source: bool,

        /// Extra seconds to wait after the page loads
        #[arg(long, default_value_t = 0.0)]
        wait: f64,

        /// Allow crawling loopback and private network addresses
        #[arg(long, env = "CRAWLQ_ALLOW_PRIVATE_URLS", default_value_t = false)]
        allow_private_urls: bool,
    },

    /// Delete finished jobs whose results have expired
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crawlq=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CrawlerConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Worker {
            concurrency,
            allow_private_urls,
            browser,
        } => {
            let config = CrawlerConfig {
                workers: concurrency,
                ..config
            };
            cmd_worker(&config, allow_private_urls, browser).await?;
        }
        Commands::Crawl {
            url,
            x_paths,
            raw,
            no_source,
            wait,
            allow_private_urls,
        } => {
            let request = CrawlRequest::new([url])
                .with_x_paths(x_paths)
                .with_simplify_source(!raw)
                .with_return_source(!no_source)
                .with_load_wait_time(wait);
            cmd_crawl(request, &config, allow_private_urls).await?;
        }
        Commands::Purge => {
            let db = connect_db().await?;
            let purged = db
                .queue_store()
                .purge_expired()
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Purged {purged} expired jobs");
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply pending migrations.
async fn connect_db() -> Result<Database> {
    let db_config = DatabaseConfig::from_env().context("DATABASE_URL not set or invalid")?;
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

fn spawn_pool<Q: QueueStore + 'static>(
    store: Q,
    config: &CrawlerConfig,
    allow_private_urls: bool,
    browser: bool,
) -> Result<WorkerPool> {
    #[cfg(feature = "browser")]
    if browser {
        return Ok(WorkerPool::spawn(
            store,
            crawlq_client::BrowserLauncher::new(),
            XPathExtractor::new(),
            config,
        ));
    }
    #[cfg(not(feature = "browser"))]
    anyhow::ensure!(!browser, "crawlq was built without the `browser` feature");

    let mut renderer = HttpRendererFactory::with_timeout(config.max_page_load_timeout)
        .context("Failed to create HTTP client")?;
    if allow_private_urls {
        tracing::warn!("SSRF protection disabled for the HTTP renderer");
        renderer = renderer.allow_private_urls();
    }

    Ok(WorkerPool::spawn(
        store,
        renderer,
        XPathExtractor::new(),
        config,
    ))
}

async fn cmd_worker(config: &CrawlerConfig, allow_private_urls: bool, browser: bool) -> Result<()> {
    anyhow::ensure!(config.workers > 0, "--concurrency must be at least 1");

    let db = connect_db().await?;
    let pool = spawn_pool(db.queue_store(), config, allow_private_urls, browser)?;
    tracing::info!(workers = pool.len(), "Workers started, press Ctrl+C to stop");

    let cancel = pool.cancel_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            tracing::info!("Shutdown signal received, finishing current jobs");
        }
        _ = cancel.cancelled() => {}
    }

    pool.shutdown().await.map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("Workers stopped");
    Ok(())
}

async fn cmd_crawl(
    request: CrawlRequest,
    config: &CrawlerConfig,
    allow_private_urls: bool,
) -> Result<()> {
    let store = InMemoryQueueStore::new();
    let submission = SubmissionService::new(store.clone(), config.default_results_ttl)
        .with_max_load_wait(config.max_page_load_timeout);
    let status = StatusService::new(store.clone());

    let receipt = submission
        .submit(request)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let id = receipt.job_ids[0];

    let config = CrawlerConfig {
        workers: 1,
        poll_interval: Duration::from_millis(50),
        ..config.clone()
    };
    let pool = spawn_pool(store, &config, allow_private_urls, false)?;

    let result = loop {
        let mut results = status
            .get_results(&[id])
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        match results.pop().map(|(_, result)| result) {
            Some(JobResult::NotReady { .. }) => tokio::time::sleep(config.poll_interval).await,
            Some(result) => break result,
            None => anyhow::bail!("Job {id} vanished from the queue"),
        }
    };
    pool.shutdown().await.map_err(|e| anyhow::anyhow!(e))?;

    match result {
        JobResult::Ready(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        JobResult::Failed { reason, .. } => anyhow::bail!("Crawl failed: {reason}"),
        _ => anyhow::bail!("Job {id} expired before its result was read"),
    }
}
