//! reserve-core daemon entry point.
//!
//! Connects to PostgreSQL, bootstraps the storage schema, and drives the
//! auth-data retention sweep on an interval. The query surface is a
//! library concern; collaborators embed [`reserve_core`] directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use reserve_core::config::ReserveConfig;
use reserve_core::service::RetentionJob;
use reserve_core::storage::{PostgresStorage, SnapshotStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ReserveConfig::from_env();
    tracing::info!("starting reserve-core");

    // Connect to PostgreSQL and bootstrap the schema
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await?;
    let storage = Arc::new(
        PostgresStorage::new(pool, config.trade_history_max_window_ms).await?,
    );

    // Drive the retention sweep
    let retention = RetentionJob::new(
        Arc::clone(&storage) as Arc<dyn SnapshotStore>,
        config.auth_data_retention_ms,
        config.export_dir.clone(),
    );
    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.retention_sweep_interval_secs));
    loop {
        ticker.tick().await;
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        match retention.run_once(now_ms).await {
            Ok((exported, pruned)) => {
                tracing::debug!(exported, pruned, "retention sweep ok");
            }
            Err(e) => {
                tracing::error!(error = %e, "retention sweep failed");
            }
        }
    }
}
