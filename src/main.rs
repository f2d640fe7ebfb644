//! pushrelay binary: wire the store, queue, workers, and HTTP API
//! together and serve until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pushrelay::api;
use pushrelay::config::{Config, SeedConfig};
use pushrelay::dispatch::Dispatcher;
use pushrelay::fetch::{HttpUrlFetcher, UrlFetcher};
use pushrelay::invoker::{AiInvoker, ChannelInvoker, HttpExecutor};
use pushrelay::queue::{JobQueue, MemoryQueue};
use pushrelay::store::MemoryStore;
use pushrelay::tracker::StatusTracker;
use pushrelay::worker::{WorkerContext, WorkerPool};

/// Interval between recovery sweeps.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.config_file {
        let seed = SeedConfig::load(path)?;
        let duplicates = seed.duplicate_ids();
        if !duplicates.is_empty() {
            anyhow::bail!("duplicate ids in seed file: {}", duplicates.join(", "));
        }
        let (tokens, channels, ai_channels) =
            (seed.tokens.len(), seed.channels.len(), seed.ai_channels.len());
        for token in seed.tokens {
            store.add_token(token).await;
        }
        for channel in seed.channels {
            store.add_channel(channel).await?;
        }
        for ai in seed.ai_channels {
            store.add_ai_channel(ai).await?;
        }
        tracing::info!(tokens, channels, ai_channels, "Seed configuration loaded");
    } else {
        tracing::warn!("No seed file configured; every push will be rejected");
    }

    if let Some(dir) = &config.file_storage_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let queue = Arc::new(MemoryQueue::new(config.queue_capacity));
    let executor = Arc::new(HttpExecutor::new());
    let tracker = Arc::new(StatusTracker::new(
        Arc::clone(&store) as _,
        Arc::clone(&queue) as _,
        config.retry_policy(),
    ));

    let fetcher: Arc<dyn UrlFetcher> = Arc::new(HttpUrlFetcher::new(
        config.fetch_timeout(),
        config.fetch_max_chars,
        config.file_storage_dir.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&queue) as _,
        Some(fetcher),
        config.backpressure,
        config.base_url.clone(),
    ));

    let ctx = Arc::new(WorkerContext {
        channels: Arc::clone(&store) as _,
        ai_channels: Arc::clone(&store) as _,
        messages: Arc::clone(&store) as _,
        tracker,
        channel_invoker: Arc::new(ChannelInvoker::new(
            Arc::clone(&executor),
            config.channel_timeout(),
        )),
        ai_invoker: Arc::new(AiInvoker::new(
            executor,
            config.ai_timeout(),
            config.default_prompts(),
        )),
        base_url: config.base_url.clone(),
    });
    let pool = WorkerPool::spawn(Arc::clone(&queue) as Arc<dyn JobQueue>, ctx, config.workers);

    // Periodic sweep for links stranded by crashes or backpressure.
    let sweep_dispatcher = Arc::clone(&dispatcher);
    let staleness = config.sending_staleness();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RECOVERY_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_dispatcher.recover(staleness).await {
                tracing::error!(error = %e, "Recovery sweep failed");
            }
        }
    });

    let app = api::router(dispatcher);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, workers = config.workers, "pushrelay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    pool.shutdown().await;
    Ok(())
}
