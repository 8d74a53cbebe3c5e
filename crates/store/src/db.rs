use depesche_core::config::PostgresConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;

/// Connect a PostgreSQL pool and run pending migrations.
///
/// Every worker binary calls this at startup, so the schema is always
/// current before the first query runs.
pub async fn init_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!(
        host = %config.host,
        database = %config.database,
        max_connections = config.max_connections,
        "postgres pool ready"
    );
    Ok(pool)
}
