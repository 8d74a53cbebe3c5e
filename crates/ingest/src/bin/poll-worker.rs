//! poll-worker — polls due sources and announces new raw posts.
//!
//! Runs three loops under one worker lifecycle:
//! - poll loop: due scan → concurrent fetch → store → announce
//! - tier sweep: usage-based HOT/COLD reconciliation
//! - queue purge: expired bounded-time messages

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::info;

use depesche_core::config::load_dotenv;
use depesche_core::Config;
use depesche_ingest::{DefaultFetcher, Poller};
use depesche_rohrpost::{
    run_purge_loop, DurableQueue, QueuePublisher, RohrpostError, Worker, WorkerBuilder,
    WorkerRunner,
};
use depesche_scheduler::run_sweep_loop;
use depesche_store::init_pool;

// ── CLI ─────────────────────────────────────────────────────────────

/// Depesche poll worker — source polling, tier sweep, queue purge.
#[derive(Parser, Debug)]
#[command(name = "poll-worker", version, about)]
struct Cli {
    /// Health ping interval in seconds.
    #[arg(long, env = "POLL_HEALTH_INTERVAL", default_value_t = 30)]
    health_interval: u64,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "POLL_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── PollWorker ──────────────────────────────────────────────────────

struct PollWorker {
    poller: Arc<Poller>,
    pool: PgPool,
    queue: DurableQueue,
    sweep_interval: Duration,
    purge_interval: Duration,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl Worker for PollWorker {
    async fn start(&self) -> Result<(), RohrpostError> {
        let poller = self.poller.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { poller.run(shutdown).await });

        let pool = self.pool.clone();
        let interval = self.sweep_interval;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { run_sweep_loop(pool, interval, shutdown).await });

        let queue = self.queue.clone();
        let interval = self.purge_interval;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { run_purge_loop(queue, interval, shutdown).await });

        info!("poll worker started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RohrpostError> {
        self.shutdown.notify_waiters();
        info!("poll worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "poll-worker"
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

    let pool = init_pool(&config.postgres).await?;
    let queue = DurableQueue::new(pool.clone());
    let publisher: Arc<dyn QueuePublisher> = Arc::new(queue.clone());

    let fetcher = Arc::new(DefaultFetcher::new()?);
    let poller = Arc::new(Poller::new(
        pool.clone(),
        fetcher,
        publisher.clone(),
        &config.scheduler,
    ));

    let shutdown = Arc::new(Notify::new());
    let worker = Arc::new(PollWorker {
        poller,
        pool,
        queue,
        sweep_interval: Duration::from_secs(config.scheduler.sweep_interval_secs),
        purge_interval: Duration::from_secs(config.queue.purge_interval_secs),
        shutdown: shutdown.clone(),
    });

    let runner_config = WorkerBuilder::new("poll-worker")
        .health_interval(Duration::from_secs(cli.health_interval))
        .shutdown_timeout(Duration::from_secs(cli.shutdown_timeout))
        .build();

    info!("poll-worker starting");
    WorkerRunner::run(worker, publisher, runner_config, Some(shutdown)).await?;
    info!("poll-worker exited cleanly");
    Ok(())
}
