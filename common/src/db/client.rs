// Database client: pooled connect/disconnect with retry and per-call query execution

use crate::db::cursor::Cursor;
use crate::db::pool::{Connection, ConnectionPool};
use crate::db::query::{
    is_read_statement, rewrite_placeholders, QueryParams, QueryRequest, QueryResult, SqlValue,
};
use crate::errors::DatabaseError;
use crate::retry::{FixedDelay, RetryStrategy};
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Execution attempts per query: the first try plus one reconnect-and-retry
pub const MAX_EXECUTE_ATTEMPTS: u32 = 2;

/// Database access wrapper around a shared connection pool.
///
/// Holds at most one connection at a time. Every `execute_query`/`execute_many` call
/// connects if needed, runs the statement, and returns the connection to the pool before
/// it returns, whatever the outcome. Construct one per unit of work; the pool is the only
/// state shared between instances.
pub struct Database<P: ConnectionPool> {
    pool: Arc<P>,
    connect_policy: FixedDelay,
    connection: Option<P::Handle>,
}

impl<P: ConnectionPool> Database<P> {
    pub fn new(pool: Arc<P>, connect_policy: FixedDelay) -> Self {
        Self {
            pool,
            connect_policy,
            connection: None,
        }
    }

    /// True while a live (not closed) connection is held
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Log and publish the pool's open and in-use counts against its capacity
    pub fn log_connection_status(&self) {
        let open = self.pool.size();
        let active = self.pool.in_use();
        let total = self.pool.max_size();
        gauge!("db_pool_connections_in_use").set(f64::from(active));
        info!(
            open_connections = open,
            active_connections = active,
            total_connections_allowed = total,
            "Connection pool status"
        );
    }

    /// Acquire a connection using the configured retry policy
    pub async fn connect(&mut self) -> Result<(), DatabaseError> {
        let policy = self.connect_policy.clone();
        self.connect_with(&policy).await
    }

    /// Acquire a connection, making up to `retries` attempts `delay` apart
    pub async fn connect_with_retries(
        &mut self,
        retries: u32,
        delay: Duration,
    ) -> Result<(), DatabaseError> {
        self.connect_with(&FixedDelay::new(retries, delay)).await
    }

    #[instrument(skip_all, fields(max_attempts = strategy.max_attempts()))]
    async fn connect_with<S: RetryStrategy>(&mut self, strategy: &S) -> Result<(), DatabaseError> {
        if !self.is_connected() {
            // A handle that went bad is handed back so the pool can discard it
            if let Some(stale) = self.connection.take() {
                self.pool.release(stale);
            }

            let mut attempt = 0;
            let handle = loop {
                match self.pool.acquire().await {
                    Ok(handle) => break handle,
                    Err(e @ DatabaseError::ConnectionFailed(_)) => {
                        counter!("db_connect_failures_total").increment(1);
                        error!(attempt = attempt + 1, error = %e, "Database connection failed");

                        match strategy.next_delay(attempt) {
                            Some(delay) => {
                                info!(delay_secs = delay.as_secs_f64(), "Retrying connection");
                                tokio::time::sleep(delay).await;
                                attempt += 1;
                            }
                            None => {
                                error!(
                                    attempts = attempt + 1,
                                    "All retry attempts failed, giving up"
                                );
                                return Err(e);
                            }
                        }
                    }
                    // Pool exhaustion follows the pool's own policy and is not retried here
                    Err(e) => {
                        error!(error = %e, "Could not obtain a database connection");
                        return Err(e);
                    }
                }
            };
            self.connection = Some(handle);
        }

        info!("Database connection established");
        self.log_connection_status();
        Ok(())
    }

    /// Return the held connection to the pool; no-op when none is held
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.connection.take() {
            self.pool.release(handle);
            info!("Database connection returned to pool");
            self.log_connection_status();
        }
    }

    /// Execute one statement. Reads (text starting with `SELECT`) return their rows,
    /// anything else is committed and returns the affected-row count.
    ///
    /// A connection-level fault triggers exactly one reconnect-and-retry; a second fault is
    /// returned to the caller. Statement-level errors are returned immediately.
    pub async fn execute_query(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, DatabaseError> {
        self.run(QueryRequest::single(query, params.to_vec())).await
    }

    /// Execute one statement per parameter set as a single transaction and return the
    /// total affected-row count. Same retry policy as `execute_query`.
    pub async fn execute_many(
        &mut self,
        query: &str,
        params_list: &[Vec<SqlValue>],
    ) -> Result<u64, DatabaseError> {
        let result = self
            .run(QueryRequest::batch(query, params_list.to_vec()))
            .await?;
        Ok(result.rows_affected().unwrap_or_default())
    }

    /// Drive a request through connect → execute → disconnect with the bounded retry
    #[instrument(skip_all, fields(kind = request.kind()))]
    pub async fn run(&mut self, request: QueryRequest) -> Result<QueryResult, DatabaseError> {
        let kind = request.kind();
        let started = Instant::now();
        let mut attempt = 1;

        let result = loop {
            if !self.is_connected() {
                if let Err(e) = self.connect().await {
                    break Err(e);
                }
            }

            match self.execute_on_held(&request).await {
                Err(e) if e.is_operational() && attempt < MAX_EXECUTE_ATTEMPTS => {
                    error!(error = %e, "Query execution failed");
                    info!("Reconnecting and retrying the query");
                    counter!("db_query_retries_total", "kind" => kind).increment(1);
                    self.disconnect();
                    attempt += 1;
                }
                Err(e) if e.is_operational() => {
                    error!(error = %e, "Query retry failed after reconnecting");
                    break Err(e);
                }
                Err(e) => {
                    error!(error = %e, "Query execution failed");
                    break Err(e);
                }
                Ok(result) => break Ok(result),
            }
        };

        // Connections never outlive the call
        self.disconnect();

        let outcome = if result.is_ok() { "success" } else { "failure" };
        counter!("db_queries_total", "kind" => kind, "outcome" => outcome).increment(1);
        histogram!("db_query_duration_seconds", "kind" => kind)
            .record(started.elapsed().as_secs_f64());

        result
    }

    async fn execute_on_held(&mut self, request: &QueryRequest) -> Result<QueryResult, DatabaseError> {
        let Some(conn) = self.connection.as_mut() else {
            return Err(DatabaseError::ConnectionFailed(
                "no connection held".to_string(),
            ));
        };

        let mut cursor = Cursor::open(conn);
        let outcome = run_statement(&mut cursor, request).await;
        cursor.close().await;
        outcome
    }
}

impl<P: ConnectionPool> Drop for Database<P> {
    fn drop(&mut self) {
        if let Some(handle) = self.connection.take() {
            warn!("Database dropped while holding a connection, returning it to the pool");
            self.pool.release(handle);
        }
    }
}

async fn run_statement<C: Connection + ?Sized>(
    cursor: &mut Cursor<'_, C>,
    request: &QueryRequest,
) -> Result<QueryResult, DatabaseError> {
    let query = rewrite_placeholders(&request.query);

    match &request.params {
        QueryParams::Single(params) => {
            debug!(query = %request.query, params = params.len(), "Executing query");

            if is_read_statement(&query) {
                let rows = cursor.fetch_all(&query, params).await?;
                debug!(rows = ?rows, "Query result");
                Ok(QueryResult::Rows(rows))
            } else {
                let affected = cursor.execute(&query, params).await?;
                cursor.commit().await?;
                info!(rows_affected = affected, "Query executed successfully");
                Ok(QueryResult::RowsAffected(affected))
            }
        }
        QueryParams::Batch(params_list) => {
            debug!(
                query = %request.query,
                parameter_sets = params_list.len(),
                "Executing batch query"
            );
            cursor.execute_many(&query, params_list).await?;
            cursor.commit().await?;
            let total = cursor.rowcount();
            info!(
                rows_affected = total,
                "Batch query executed successfully"
            );
            Ok(QueryResult::RowsAffected(total))
        }
    }
}
