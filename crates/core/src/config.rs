use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineConfig,
    pub bridge: BridgeConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            postgres: PostgresConfig::from_env(),
            queue: QueueConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
            bridge: BridgeConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  postgres:   host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!(
            "  queue:      batch={}, visibility={}s",
            self.queue.pull_batch,
            self.queue.visibility_secs
        );
        tracing::info!(
            "  scheduler:  tick={}s, quarantine_after={}",
            self.scheduler.poll_tick_secs,
            self.scheduler.quarantine_threshold
        );
        tracing::info!(
            "  pipeline:   batch_limit={}, initial_sync={}",
            self.pipeline.batch_limit,
            self.pipeline.initial_sync_limit
        );
        tracing::info!("  bridge:     {}:{}", self.bridge.host, self.bridge.port);
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("PG_HOST", "localhost"),
            port: env_u16("PG_PORT", 5432),
            database: env_or("PG_DATABASE", "depesche"),
            username: env_opt("PG_USERNAME"),
            password: env_opt("PG_PASSWORD"),
            ssl_mode: env_or("PG_SSL_MODE", "prefer"),
            max_connections: env_u32("PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Durable queue ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Max messages claimed per pull.
    pub pull_batch: i64,
    /// Seconds a claimed message stays invisible before redelivery.
    pub visibility_secs: u64,
    /// Sleep between pulls when a stream is empty.
    pub idle_sleep_ms: u64,
    /// How often expired messages of bounded-time streams are purged.
    pub purge_interval_secs: u64,
}

impl QueueConfig {
    fn from_env() -> Self {
        Self {
            pull_batch: env_i64("QUEUE_PULL_BATCH", 10),
            visibility_secs: env_u64("QUEUE_VISIBILITY_SECS", 30),
            idle_sleep_ms: env_u64("QUEUE_IDLE_SLEEP_MS", 1000),
            purge_interval_secs: env_u64("QUEUE_PURGE_INTERVAL_SECS", 300),
        }
    }
}

// ── Poll scheduler ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scans for due sources.
    pub poll_tick_secs: u64,
    /// Consecutive failures before a source is quarantined.
    pub quarantine_threshold: u32,
    /// Upper bound on sources polled at the same time.
    pub max_concurrent_polls: u32,
    /// Seconds between usage sweeps that promote/demote tiers.
    pub sweep_interval_secs: u64,
    /// Minutes a new source keeps its priority boost.
    pub boost_minutes: u32,
}

impl SchedulerConfig {
    fn from_env() -> Self {
        Self {
            poll_tick_secs: env_u64("SCHEDULER_POLL_TICK_SECS", 10),
            quarantine_threshold: env_u32("SCHEDULER_QUARANTINE_THRESHOLD", 10),
            max_concurrent_polls: env_u32("SCHEDULER_MAX_CONCURRENT_POLLS", 8),
            sweep_interval_secs: env_u64("SCHEDULER_SWEEP_INTERVAL_SECS", 60),
            boost_minutes: env_u32("SCHEDULER_BOOST_MINUTES", 60),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max raw posts handed to a processor per pass and source.
    pub batch_limit: i64,
    /// Newest raw posts processed when a feed is first created.
    pub initial_sync_limit: i64,
}

impl PipelineConfig {
    fn from_env() -> Self {
        Self {
            batch_limit: env_i64("PIPELINE_BATCH_LIMIT", 50),
            initial_sync_limit: env_i64("PIPELINE_INITIAL_SYNC_LIMIT", 5),
        }
    }
}

// ── Validation bridge ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Seconds a validation request waits for a reply.
    pub request_timeout_secs: u64,
}

impl BridgeConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("BRIDGE_HOST", "127.0.0.1"),
            port: env_u16("BRIDGE_PORT", 5661),
            request_timeout_secs: env_u64("BRIDGE_REQUEST_TIMEOUT_SECS", 10),
        }
    }
}
