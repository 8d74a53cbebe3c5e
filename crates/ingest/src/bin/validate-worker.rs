//! validate-worker — answers source validation requests over the
//! ZeroMQ bridge.
//!
//! Binds the ROUTER side of the bridge and serves `source.validate`
//! requests; replies go back to the requesting DEALER, matched by
//! correlation id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use depesche_core::config::load_dotenv;
use depesche_core::Config;
use depesche_ingest::{run_validation_responder, SourceValidator};
use depesche_rohrpost::{
    BridgeServer, DurableQueue, QueuePublisher, RohrpostError, Transport, Worker, WorkerBuilder,
    WorkerRunner,
};
use depesche_store::init_pool;

// ── CLI ─────────────────────────────────────────────────────────────

/// Depesche validate worker — source validation responder.
#[derive(Parser, Debug)]
#[command(name = "validate-worker", version, about)]
struct Cli {
    /// Health ping interval in seconds.
    #[arg(long, env = "VALIDATE_HEALTH_INTERVAL", default_value_t = 30)]
    health_interval: u64,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "VALIDATE_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── ValidateWorker ──────────────────────────────────────────────────

struct ValidateWorker {
    server: Arc<BridgeServer>,
    validator: Arc<SourceValidator>,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl Worker for ValidateWorker {
    async fn start(&self) -> Result<(), RohrpostError> {
        let server = self.server.clone();
        let validator = self.validator.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { run_validation_responder(server, validator, shutdown).await });

        info!("validate worker started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RohrpostError> {
        self.shutdown.notify_waiters();
        info!("validate worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "validate-worker"
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
    let publisher: Arc<dyn QueuePublisher> = Arc::new(DurableQueue::new(pool));

    let transport = Transport::Tcp {
        host: config.bridge.host.clone(),
        port: config.bridge.port,
    };
    let server = Arc::new(BridgeServer::bind(&transport).await?);
    let validator = Arc::new(SourceValidator::new()?);

    let shutdown = Arc::new(Notify::new());
    let worker = Arc::new(ValidateWorker {
        server,
        validator,
        shutdown: shutdown.clone(),
    });

    let runner_config = WorkerBuilder::new("validate-worker")
        .health_interval(Duration::from_secs(cli.health_interval))
        .shutdown_timeout(Duration::from_secs(cli.shutdown_timeout))
        .build();

    info!("validate-worker starting");
    WorkerRunner::run(worker, publisher, runner_config, Some(shutdown)).await?;
    info!("validate-worker exited cleanly");
    Ok(())
}
