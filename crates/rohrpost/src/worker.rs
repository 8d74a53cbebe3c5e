//! Worker trait and lifecycle management.
//!
//! Provides the [`Worker`] trait for defining long-running processes,
//! [`WorkerBuilder`] for fluent configuration, and [`WorkerRunner`] for
//! executing the event loop with automatic health pings and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::envelope::Envelope;
use crate::error::RohrpostError;
use crate::messages::events::{WorkerHealth, WorkerStatus};
use crate::messages::subjects::WORKER_HEALTH;
use crate::traits::QueuePublisher;

// ── Worker trait ─────────────────────────────────────────────────────

/// A long-running process in the depesche worker fleet.
///
/// Implementors define their startup/shutdown logic. The [`WorkerRunner`]
/// handles health pings, signal handling, and graceful shutdown.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Called once when the worker starts. Open connections, spawn loops.
    async fn start(&self) -> Result<(), RohrpostError>;

    /// Called once during graceful shutdown. Drain in-flight work, close connections.
    async fn stop(&self) -> Result<(), RohrpostError>;

    /// Human-readable name for this worker (used in health pings and logging).
    fn name(&self) -> &str;
}

// ── WorkerBuilder ────────────────────────────────────────────────────

/// Fluent builder for configuring a [`WorkerRunner`].
///
/// # Example
/// ```ignore
/// let config = WorkerBuilder::new("poll-worker")
///     .health_interval(Duration::from_secs(10))
///     .build();
/// ```
pub struct WorkerBuilder {
    name: String,
    health_interval: Duration,
    shutdown_timeout: Duration,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Set the interval between health pings (default: 30s).
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Set the maximum time to wait for in-flight work during shutdown (default: 5s).
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Build the runner configuration. The actual [`Worker`] impl and publisher
    /// are provided to [`WorkerRunner::run`].
    pub fn build(self) -> WorkerRunnerConfig {
        WorkerRunnerConfig {
            name: self.name,
            health_interval: self.health_interval,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

// ── WorkerRunnerConfig ───────────────────────────────────────────────

/// Configuration produced by [`WorkerBuilder`], consumed by [`WorkerRunner`].
pub struct WorkerRunnerConfig {
    pub name: String,
    pub health_interval: Duration,
    pub shutdown_timeout: Duration,
}

// ── WorkerRunner ─────────────────────────────────────────────────────

/// Runs a [`Worker`] with automatic health pings and graceful shutdown.
///
/// The runner manages three concurrent tasks:
/// 1. **Health ping loop**: publishes [`WorkerHealth`] at a configured interval
/// 2. **Signal handler**: listens for SIGINT/SIGTERM and initiates shutdown
/// 3. **Worker lifecycle**: calls `start()`, waits for shutdown, then calls `stop()`
pub struct WorkerRunner;

impl WorkerRunner {
    /// Run a worker to completion.
    ///
    /// This blocks until a shutdown signal is received or `shutdown_notify` is
    /// triggered. The `publisher` is used for health pings.
    pub async fn run(
        worker: Arc<dyn Worker>,
        publisher: Arc<dyn QueuePublisher>,
        config: WorkerRunnerConfig,
        shutdown_notify: Option<Arc<Notify>>,
    ) -> Result<(), RohrpostError> {
        let worker_name = config.name.clone();
        info!(worker = %worker_name, "starting worker");

        // Start the worker
        worker.start().await?;
        info!(worker = %worker_name, "worker started");

        // Publish initial health ping
        Self::publish_health(&*publisher, &worker_name, WorkerStatus::Healthy).await;

        // Create a shared shutdown signal
        let shutdown = Arc::new(Notify::new());

        // Spawn health ping loop
        let health_shutdown = shutdown.clone();
        let health_publisher = publisher.clone();
        let health_name = worker_name.clone();
        let health_interval = config.health_interval;
        let health_handle = tokio::spawn(async move {
            Self::health_loop(
                &*health_publisher,
                &health_name,
                health_interval,
                &health_shutdown,
            )
            .await;
        });

        // Wait for shutdown signal (OS signal or programmatic notify)
        let external_shutdown = shutdown_notify.clone();
        let sig_shutdown = shutdown.clone();
        let sig_name = worker_name.clone();
        let signal_handle = tokio::spawn(async move {
            Self::wait_for_shutdown(external_shutdown).await;
            info!(worker = %sig_name, "shutdown signal received");
            sig_shutdown.notify_waiters();
        });

        // Wait for shutdown to be triggered
        shutdown.notified().await;

        // Cancel health loop and signal handler
        health_handle.abort();
        signal_handle.abort();

        // Graceful shutdown: stop the worker with timeout
        info!(worker = %worker_name, timeout = ?config.shutdown_timeout, "stopping worker");
        match tokio::time::timeout(config.shutdown_timeout, worker.stop()).await {
            Ok(Ok(())) => {
                info!(worker = %worker_name, "worker stopped gracefully");
            }
            Ok(Err(e)) => {
                warn!(worker = %worker_name, error = %e, "worker stop returned error");
            }
            Err(_) => {
                warn!(worker = %worker_name, "worker stop timed out, forcing shutdown");
            }
        }

        // Final health ping: unhealthy (going down)
        Self::publish_health(&*publisher, &worker_name, WorkerStatus::Unhealthy).await;

        info!(worker = %worker_name, "worker shutdown complete");
        Ok(())
    }

    /// Periodically publish health pings until shutdown is signalled.
    async fn health_loop(
        publisher: &dyn QueuePublisher,
        worker_name: &str,
        interval: Duration,
        shutdown: &Notify,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick (we already sent an initial ping)
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::publish_health(publisher, worker_name, WorkerStatus::Healthy).await;
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Publish a single health ping envelope.
    async fn publish_health(
        publisher: &dyn QueuePublisher,
        worker_name: &str,
        status: WorkerStatus,
    ) {
        let health = WorkerHealth {
            worker_id: worker_name.to_string(),
            status,
        };

        match Envelope::new(WORKER_HEALTH, &health) {
            Ok(env) => {
                if let Err(e) = publisher.publish(&env).await {
                    warn!(worker = %worker_name, error = %e, "failed to publish health ping");
                }
            }
            Err(e) => {
                warn!(worker = %worker_name, error = %e, "failed to serialize health ping");
            }
        }
    }

    /// Wait for either an OS shutdown signal or a programmatic notification.
    async fn wait_for_shutdown(external: Option<Arc<Notify>>) {
        match external {
            Some(notify) => {
                tokio::select! {
                    _ = Self::os_signal() => {}
                    _ = notify.notified() => {}
                }
            }
            None => {
                Self::os_signal().await;
            }
        }
    }

    /// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
    async fn os_signal() {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl_c");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
