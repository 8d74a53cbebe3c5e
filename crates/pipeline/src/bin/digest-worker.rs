//! digest-worker — drives the recurring digest cycle.
//!
//! Consumes the digest stream (due `digest.pending` triggers and
//! `digest.execute` orders) and purges expired messages. Every executed
//! digest re-arms its own next trigger, so the cycle needs no cron.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use depesche_core::config::{load_dotenv, QueueConfig};
use depesche_core::Config;
use depesche_pipeline::{handle_digest_envelope, DigestRunner, NoopDigestRunner};
use depesche_rohrpost::{
    run_consume_loop, run_purge_loop, streams, DurableQueue, QueuePublisher, RohrpostError,
    Worker, WorkerBuilder, WorkerRunner,
};
use depesche_scheduler::DigestScheduler;

// ── CLI ─────────────────────────────────────────────────────────────

/// Depesche digest worker — digest execution and re-arming.
#[derive(Parser, Debug)]
#[command(name = "digest-worker", version, about)]
struct Cli {
    /// Health ping interval in seconds.
    #[arg(long, env = "DIGEST_HEALTH_INTERVAL", default_value_t = 30)]
    health_interval: u64,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "DIGEST_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── DigestWorker ────────────────────────────────────────────────────

struct DigestWorker {
    queue: DurableQueue,
    publisher: Arc<dyn QueuePublisher>,
    runner: Arc<dyn DigestRunner>,
    scheduler: Arc<DigestScheduler>,
    queue_config: QueueConfig,
    purge_interval: Duration,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl Worker for DigestWorker {
    async fn start(&self) -> Result<(), RohrpostError> {
        {
            let queue = self.queue.clone();
            let config = self.queue_config.clone();
            let shutdown = self.shutdown.clone();
            let publisher = self.publisher.clone();
            let runner = self.runner.clone();
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move {
                run_consume_loop(queue, &streams::DIGESTS, config, shutdown, move |delivery| {
                    let publisher = publisher.clone();
                    let runner = runner.clone();
                    let scheduler = scheduler.clone();
                    async move {
                        handle_digest_envelope(
                            &delivery.envelope,
                            publisher.as_ref(),
                            runner.as_ref(),
                            &scheduler,
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

        info!("digest worker started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RohrpostError> {
        self.shutdown.notify_waiters();
        info!("digest worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "digest-worker"
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
    let worker = Arc::new(DigestWorker {
        queue,
        publisher: publisher.clone(),
        runner: Arc::new(NoopDigestRunner),
        scheduler: Arc::new(DigestScheduler::new(publisher.clone())),
        queue_config: config.queue.clone(),
        purge_interval: Duration::from_secs(config.queue.purge_interval_secs),
        shutdown: shutdown.clone(),
    });

    let runner_config = WorkerBuilder::new("digest-worker")
        .health_interval(Duration::from_secs(cli.health_interval))
        .shutdown_timeout(Duration::from_secs(cli.shutdown_timeout))
        .build();

    info!("digest-worker starting");
    WorkerRunner::run(worker, publisher, runner_config, Some(shutdown)).await?;
    info!("digest-worker exited cleanly");
    Ok(())
}
