// Bootstrap utilities for binary initialization and database lifecycle hooks

use crate::config::Settings;
use crate::db::{ConnectionPool, Database, PgConnectionPool, PgDatabase};
use crate::errors::DatabaseError;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Load `.env` and layered settings, then validate them
pub fn load_settings() -> Result<Settings> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(settings)
}

/// Initialize database pool
///
/// The pool connects lazily; the first real session is opened by `connect_to_db`.
#[tracing::instrument(skip(settings))]
pub fn init_database_pool(settings: &Settings) -> Arc<PgConnectionPool> {
    info!("Initializing database pool");
    let pool = Arc::new(PgConnectionPool::new(&settings.database));
    info!("Database pool initialized");
    pool
}

/// Database client bound to the shared pool and the configured connect policy
pub fn database(pool: Arc<PgConnectionPool>, settings: &Settings) -> PgDatabase {
    Database::new(pool, settings.database.connect_policy())
}

/// Startup hook: establish the lifecycle connection before serving requests
#[tracing::instrument(skip(db))]
pub async fn connect_to_db<P: ConnectionPool>(db: &mut Database<P>) -> Result<(), DatabaseError> {
    db.connect().await
}

/// Shutdown hook: hand the lifecycle connection back to the pool
#[tracing::instrument(skip(db))]
pub fn disconnect_from_db<P: ConnectionPool>(db: &mut Database<P>) {
    db.disconnect();
}
