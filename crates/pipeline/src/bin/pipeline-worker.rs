//! pipeline-worker — turns raw posts into feed posts.
//!
//! Runs three loops under one worker lifecycle:
//! - ingest consumer: `raw_post.created` → pipeline pass per active feed
//! - feed consumer: `feed.created` → bootstrap, source boost, initial sync
//! - queue purge: expired bounded-time messages

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::info;

use depesche_core::config::{load_dotenv, PipelineConfig, QueueConfig};
use depesche_core::Config;
use depesche_pipeline::{
    handle_feed_created, handle_raw_posts_created, PostProcessor, RelayProcessor,
};
use depesche_rohrpost::{
    run_consume_loop, run_purge_loop, streams, DurableQueue, QueuePublisher, RohrpostError,
    Worker, WorkerBuilder, WorkerRunner,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Depesche pipeline worker — raw post processing and feed bootstrap.
#[derive(Parser, Debug)]
#[command(name = "pipeline-worker", version, about)]
struct Cli {
    /// Health ping interval in seconds.
    #[arg(long, env = "PIPELINE_HEALTH_INTERVAL", default_value_t = 30)]
    health_interval: u64,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "PIPELINE_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── PipelineWorker ──────────────────────────────────────────────────

struct PipelineWorker {
    pool: PgPool,
    queue: DurableQueue,
    publisher: Arc<dyn QueuePublisher>,
    processor: Arc<dyn PostProcessor>,
    queue_config: QueueConfig,
    pipeline_config: PipelineConfig,
    boost_minutes: u32,
    purge_interval: Duration,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl Worker for PipelineWorker {
    async fn start(&self) -> Result<(), RohrpostError> {
        {
            let queue = self.queue.clone();
            let config = self.queue_config.clone();
            let shutdown = self.shutdown.clone();
            let pool = self.pool.clone();
            let publisher = self.publisher.clone();
            let processor = self.processor.clone();
            let batch_limit = self.pipeline_config.batch_limit;
            tokio::spawn(async move {
                run_consume_loop(queue, &streams::INGEST, config, shutdown, move |delivery| {
                    let pool = pool.clone();
                    let publisher = publisher.clone();
                    let processor = processor.clone();
                    async move {
                        handle_raw_posts_created(
                            &pool,
                            publisher.as_ref(),
                            processor.as_ref(),
                            &delivery.envelope,
                            batch_limit,
                        )
                        .await
                    }
                })
                .await
            });
        }

        {
            let queue = self.queue.clone();
            let config = self.queue_config.clone();
            let shutdown = self.shutdown.clone();
            let pool = self.pool.clone();
            let publisher = self.publisher.clone();
            let processor = self.processor.clone();
            let sync_limit = self.pipeline_config.initial_sync_limit;
            let boost_minutes = self.boost_minutes;
            tokio::spawn(async move {
                run_consume_loop(queue, &streams::FEEDS, config, shutdown, move |delivery| {
                    let pool = pool.clone();
                    let publisher = publisher.clone();
                    let processor = processor.clone();
                    async move {
                        handle_feed_created(
                            &pool,
                            publisher.as_ref(),
                            processor.as_ref(),
                            &delivery.envelope,
                            sync_limit,
                            boost_minutes,
                        )
                        .await
                    }
                })
                .await
            });
        }

        let queue = self.queue.clone();
        let interval = self.purge_interval;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { run_purge_loop(queue, interval, shutdown).await });

        info!("pipeline worker started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RohrpostError> {
        self.shutdown.notify_waiters();
        info!("pipeline worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "pipeline-worker"
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let pool = depesche_store::init_pool(&config.postgres).await?;
    let queue = DurableQueue::new(pool.clone());
    let publisher: Arc<dyn QueuePublisher> = Arc::new(queue.clone());

    let shutdown = Arc::new(Notify::new());
    let worker = Arc::new(PipelineWorker {
        pool,
        queue,
        publisher: publisher.clone(),
        processor: Arc::new(RelayProcessor),
        queue_config: config.queue.clone(),
        pipeline_config: config.pipeline.clone(),
        boost_minutes: config.scheduler.boost_minutes,
        purge_interval: Duration::from_secs(config.queue.purge_interval_secs),
        shutdown: shutdown.clone(),
    });

    let runner_config = WorkerBuilder::new("pipeline-worker")
        .health_interval(Duration::from_secs(cli.health_interval))
        .shutdown_timeout(Duration::from_secs(cli.shutdown_timeout))
        .build();

    info!("pipeline-worker starting");
    WorkerRunner::run(worker, publisher, runner_config, Some(shutdown)).await?;
    info!("pipeline-worker exited cleanly");
    Ok(())
}
