use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use common::config::{ReportDefinition, Settings};
use common::db::{Database, PgConnectionPool, PgDatabase};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<PgConnectionPool>,
    pub config: Arc<Settings>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(
        db_pool: Arc<PgConnectionPool>,
        config: Settings,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            db_pool,
            config: Arc::new(config),
            metrics,
        }
    }

    /// A fresh database client for one request; only the pool is shared
    pub fn database(&self) -> PgDatabase {
        Database::new(
            Arc::clone(&self.db_pool),
            self.config.database.connect_policy(),
        )
    }

    pub fn report(&self, name: &str) -> Option<&ReportDefinition> {
        self.config.reports.iter().find(|r| r.name == name)
    }
}
