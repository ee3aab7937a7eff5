use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crawlq_client::{HttpRendererFactory, XPathExtractor};
use crawlq_core::{CrawlerConfig, InMemoryQueueStore, QueueStore, WorkerPool};
use crawlq_db::{Database, DatabaseConfig};
use crawlq_server::routes;
use crawlq_server::state::{AnyQueueStore, AppState};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crawlq=info".parse()?))
        .with_target(false)
        .init();

    let config = CrawlerConfig::from_env()?;
    let port = std::env::var("CRAWLQ_SERVER_PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");

    let store = if std::env::var("DATABASE_URL").is_ok() {
        let db = Database::connect(&DatabaseConfig::from_env()?).await?;
        db.migrate().await?;
        AnyQueueStore::Postgres(db.queue_store())
    } else {
        tracing::warn!("DATABASE_URL not set; jobs are kept in memory and lost on restart");
        AnyQueueStore::Memory(InMemoryQueueStore::new())
    };

    let pool = spawn_workers(&store, &config)?;
    let background = CancellationToken::new();
    let purger = tokio::spawn(purge_expired_periodically(store.clone(), background.clone()));

    let state = Arc::new(AppState::new(store, &config));
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(workers = pool.len(), "Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    background.cancel();
    let _ = purger.await;
    pool.shutdown().await?;
    tracing::info!("Server stopped");

    Ok(())
}

/// Start the in-process worker pool (`CRAWLQ_WORKERS`, 0 disables it).
fn spawn_workers(store: &AnyQueueStore, config: &CrawlerConfig) -> anyhow::Result<WorkerPool> {
    #[cfg(feature = "browser")]
    if std::env::var("CRAWLQ_RENDERER").is_ok_and(|r| r == "browser") {
        return Ok(WorkerPool::spawn(
            store.clone(),
            crawlq_client::BrowserLauncher::new(),
            XPathExtractor::new(),
            config,
        ));
    }

    let mut renderer = HttpRendererFactory::with_timeout(config.max_page_load_timeout)?;
    if std::env::var("CRAWLQ_ALLOW_PRIVATE_URLS").is_ok_and(|v| v == "true" || v == "1") {
        tracing::warn!("SSRF protection disabled for the HTTP renderer");
        renderer = renderer.allow_private_urls();
    }

    Ok(WorkerPool::spawn(
        store.clone(),
        renderer,
        XPathExtractor::new(),
        config,
    ))
}

async fn purge_expired_periodically(store: AnyQueueStore, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired results"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired results"),
            },
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
