// Error handling framework for the reports service

use thiserror::Error;

/// Database-specific errors
///
/// Only `ConnectionFailed` and `QueryExecutionFailed` are operational (connection-level)
/// faults; the database client retries those and nothing else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),
}

impl DatabaseError {
    /// Whether this is a connection-class fault that warrants reconnecting
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::QueryExecutionFailed(_)
        )
    }
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Unknown report: {0}")]
    UnknownReport(String),
}

/// SQLSTATE codes that mean the session itself is gone
fn is_connection_sqlstate(code: &str) -> bool {
    // Class 08 - Connection Exception, 57P01..57P03 - server shutting down / cannot connect now
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // sqlx also times out while the server refuses new sessions; only the pool
            // knows whether it was actually full, see `PgConnectionPool::acquire`
            sqlx::Error::PoolTimedOut
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DatabaseError::ConnectionFailed(err.to_string()),
            sqlx::Error::Database(db_err) => {
                // Check for specific database error codes
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        c if is_connection_sqlstate(c) => {
                            DatabaseError::QueryExecutionFailed(db_err.message().to_string())
                        }
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operational_classification() {
        assert!(DatabaseError::ConnectionFailed("reset".into()).is_operational());
        assert!(DatabaseError::QueryExecutionFailed("server closed".into()).is_operational());
        assert!(!DatabaseError::PoolExhausted("busy".into()).is_operational());
        assert!(!DatabaseError::QueryFailed("syntax error".into()).is_operational());
        assert!(!DatabaseError::DuplicateKey("dup".into()).is_operational());
    }

    #[test]
    fn test_bare_pool_timeout_is_a_connection_failure() {
        let err: DatabaseError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));
        assert!(err.is_operational());
    }

    #[test]
    fn test_io_error_is_operational() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: DatabaseError = sqlx::Error::Io(io).into();
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));
        assert!(err.is_operational());
    }

    #[test]
    fn test_row_not_found_is_statement_level() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }

    #[test]
    fn test_connection_sqlstates() {
        assert!(is_connection_sqlstate("08006"));
        assert!(is_connection_sqlstate("57P01"));
        assert!(!is_connection_sqlstate("42601"));
        assert!(!is_connection_sqlstate("23505"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::MissingField("gstin".to_string());
        assert!(err.to_string().contains("gstin"));

        let err = ValidationError::InvalidFieldValue {
            field: "year".to_string(),
            reason: "expected an integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid field value for year: expected an integer"
        );
    }
}
