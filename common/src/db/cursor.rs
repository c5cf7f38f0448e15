// Scoped per-statement execution context over a held connection

use crate::db::pool::Connection;
use crate::db::query::{Row, SqlValue};
use crate::errors::DatabaseError;
use tracing::{info, warn};

/// Borrows the client's connection for one statement.
///
/// Writes open a transaction lazily; `close` rolls back anything left uncommitted, so the
/// caller must close the cursor on every exit path before releasing the connection.
pub struct Cursor<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    in_transaction: bool,
    rowcount: u64,
}

impl<'c, C: Connection + ?Sized> Cursor<'c, C> {
    pub fn open(conn: &'c mut C) -> Self {
        info!("Cursor opened");
        Self {
            conn,
            in_transaction: false,
            rowcount: 0,
        }
    }

    /// Run a read statement and return every row
    pub async fn fetch_all(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Row>, DatabaseError> {
        let rows = self.conn.fetch_all(query, params).await?;
        self.rowcount = rows.len() as u64;
        Ok(rows)
    }

    /// Run a statement inside the cursor's transaction
    pub async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<u64, DatabaseError> {
        self.ensure_transaction().await?;
        let affected = self.conn.execute(query, params).await?;
        self.rowcount = affected;
        Ok(affected)
    }

    /// Run a statement once per parameter set inside one transaction
    pub async fn execute_many(
        &mut self,
        query: &str,
        params_list: &[Vec<SqlValue>],
    ) -> Result<u64, DatabaseError> {
        self.ensure_transaction().await?;
        let mut total = 0;
        for params in params_list {
            total += self.conn.execute(query, params).await?;
        }
        self.rowcount = total;
        Ok(total)
    }

    pub async fn commit(&mut self) -> Result<(), DatabaseError> {
        if self.in_transaction {
            self.conn.commit().await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    /// Rows fetched or affected by the last statement
    pub fn rowcount(&self) -> u64 {
        self.rowcount
    }

    pub async fn close(self) {
        if self.in_transaction && !self.conn.is_closed() {
            if let Err(e) = self.conn.rollback().await {
                warn!(error = %e, "Rollback of uncommitted transaction failed");
            }
        }
        info!("Cursor closed");
    }

    async fn ensure_transaction(&mut self) -> Result<(), DatabaseError> {
        if !self.in_transaction {
            self.conn.begin().await?;
            self.in_transaction = true;
        }
        Ok(())
    }
}
