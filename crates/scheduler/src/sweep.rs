//! Periodic tier sweep.
//!
//! Reconciles stored tiers with actual feed usage: sources still
//! referenced by an active feed are HOT, unreferenced ones drop to
//! COLD. Quarantined sources are skipped; only a successful poll
//! releases them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use depesche_store::SourceStore;
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Runs the tier sweep until `shutdown` is notified.
///
/// Failures are logged and the loop keeps going; a missed sweep only
/// delays demotion by one interval.
pub async fn run_sweep_loop(pool: PgPool, interval: Duration, shutdown: Arc<Notify>) {
    info!(interval_secs = interval.as_secs(), "tier sweep running");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => {
                info!("tier sweep stopping");
                return;
            }
        }

        match SourceStore::sweep_tiers(&pool, Utc::now()).await {
            Ok(0) => {}
            Ok(changed) => info!(changed, "tier sweep adjusted sources"),
            Err(error) => warn!(%error, "tier sweep failed"),
        }
    }
}
