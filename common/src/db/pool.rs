// Connection pool contract and its PostgreSQL implementation

use crate::config::DatabaseConfig;
use crate::db::query::{Row, SqlValue};
use crate::errors::DatabaseError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgTypeInfo,
    Postgres,
};
use sqlx::query::Query;
use sqlx::types::Decimal;
use sqlx::{Column, Encode, Row as _, Type, ValueRef};
use std::time::Duration;
use tracing::{info, instrument};

/// One live session checked out from a pool
#[async_trait]
pub trait Connection: Send {
    /// True once the session has suffered a connection-level fault
    fn is_closed(&self) -> bool;

    async fn begin(&mut self) -> Result<(), DatabaseError>;

    async fn fetch_all(&mut self, query: &str, params: &[SqlValue])
        -> Result<Vec<Row>, DatabaseError>;

    /// Execute a statement and return the number of affected rows
    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<u64, DatabaseError>;

    async fn commit(&mut self) -> Result<(), DatabaseError>;

    async fn rollback(&mut self) -> Result<(), DatabaseError>;
}

/// Bounded set of reusable connections
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    type Handle: Connection;

    /// Check out a handle. Fails with `PoolExhausted` when none frees up in time,
    /// `ConnectionFailed` when a new session cannot be established
    async fn acquire(&self) -> Result<Self::Handle, DatabaseError>;

    /// Return a handle to the available set; closed handles are discarded
    fn release(&self, handle: Self::Handle);

    /// Connections currently open (idle + in use)
    fn size(&self) -> u32;

    fn in_use(&self) -> u32;

    fn max_size(&self) -> u32;
}

/// PostgreSQL connection pool backed by sqlx
#[derive(Debug, Clone)]
pub struct PgConnectionPool {
    pool: PgPool,
    max_connections: u32,
}

impl PgConnectionPool {
    /// Create the pool without opening any session yet.
    ///
    /// Sessions are established on first acquire, so startup failures surface through the
    /// database client's connect retry instead of aborting pool construction.
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub fn new(config: &DatabaseConfig) -> Self {
        info!("Initializing database connection pool");

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_lazy_with(options);

        info!(
            host = %config.host,
            database = %config.name,
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database connection pool initialized"
        );

        Self {
            pool,
            max_connections: config.max_connections,
        }
    }

    /// Perform a health check on the database connection
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                DatabaseError::HealthCheckFailed(e.to_string())
            })?;

        tracing::debug!("Database health check passed");
        Ok(())
    }

    /// Close the connection pool gracefully
    #[instrument(skip(self))]
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl ConnectionPool for PgConnectionPool {
    type Handle = PgConnection;

    async fn acquire(&self) -> Result<PgConnection, DatabaseError> {
        match self.pool.acquire().await {
            Ok(inner) => Ok(PgConnection {
                inner,
                closed: false,
            }),
            Err(sqlx::Error::PoolTimedOut)
                if is_saturated(self.pool.size(), self.pool.num_idle(), self.max_connections) =>
            {
                Err(DatabaseError::PoolExhausted(format!(
                    "no connection available out of {}",
                    self.max_connections
                )))
            }
            // A timeout with room left in the pool means new sessions kept failing to open.
            // Authentication and network failures alike mean no session could be opened.
            Err(e) => Err(DatabaseError::ConnectionFailed(e.to_string())),
        }
    }

    fn release(&self, mut handle: PgConnection) {
        if handle.closed {
            handle.inner.close_on_drop();
        }
        drop(handle);
    }

    fn size(&self) -> u32 {
        self.pool.size()
    }

    fn in_use(&self) -> u32 {
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        self.pool.size().saturating_sub(idle)
    }

    fn max_size(&self) -> u32 {
        self.max_connections
    }
}

/// Every slot is open and checked out
fn is_saturated(size: u32, idle: usize, max_connections: u32) -> bool {
    size >= max_connections && idle == 0
}

/// A pooled PostgreSQL session
pub struct PgConnection {
    inner: PoolConnection<Postgres>,
    closed: bool,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl PgConnection {
    /// Convert a driver error, marking the session closed on connection-level faults
    fn fault(&mut self, err: sqlx::Error) -> DatabaseError {
        match DatabaseError::from(err) {
            DatabaseError::ConnectionFailed(msg) | DatabaseError::QueryExecutionFailed(msg) => {
                self.closed = true;
                DatabaseError::QueryExecutionFailed(msg)
            }
            other => other,
        }
    }

    async fn run_control(&mut self, statement: &'static str) -> Result<(), DatabaseError> {
        match sqlx::query(statement).execute(&mut *self.inner).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fault(e)),
        }
    }
}

#[async_trait]
impl Connection for PgConnection {
    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn begin(&mut self) -> Result<(), DatabaseError> {
        self.run_control("BEGIN").await
    }

    async fn fetch_all(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Row>, DatabaseError> {
        let result = bind_all(sqlx::query(query), params)
            .fetch_all(&mut *self.inner)
            .await;

        match result {
            Ok(rows) => Ok(rows.iter().map(decode_row).collect()),
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<u64, DatabaseError> {
        let result = bind_all(sqlx::query(query), params)
            .execute(&mut *self.inner)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.run_control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.run_control("ROLLBACK").await
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<UntypedNull>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
        };
    }
    query
}

/// NULL parameter declared with OID 0, so the server infers its type from the statement
/// instead of rejecting it against a non-text column
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Convert a row to a JSON object, probing the common column types in turn
fn decode_row(row: &PgRow) -> Row {
    let mut row_map = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(i).map(|v| v.is_null()).unwrap_or(true);

        let value = if is_null {
            serde_json::Value::Null
        } else if let Ok(v) = row.try_get::<String, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<i64, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<i32, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<i16, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<f64, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<f32, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Decimal, _>(i) {
            // NUMERIC keeps its exact digits as a string
            json!(v.to_string())
        } else if let Ok(v) = row.try_get::<bool, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(i) {
            json!(v.to_string())
        } else if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(i) {
            json!(v.to_string())
        } else if let Ok(v) = row.try_get::<chrono::DateTime<Utc>, _>(i) {
            json!(v.to_rfc3339())
        } else if let Ok(v) = row.try_get::<uuid::Uuid, _>(i) {
            json!(v.to_string())
        } else if let Ok(v) = row.try_get::<serde_json::Value, _>(i) {
            v
        } else {
            // Unmapped types (arrays, intervals, ...): cast in SQL, e.g. `::text`
            serde_json::Value::Null
        };

        row_map.insert(column.name().to_string(), value);
    }

    row_map
}
