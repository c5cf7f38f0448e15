// Database access layer: pool contract, query model, scoped cursor and the client

pub mod client;
pub mod cursor;
pub mod pool;
pub mod query;

pub use client::Database;
pub use pool::{Connection, ConnectionPool, PgConnection, PgConnectionPool};
pub use query::{QueryRequest, QueryResult, Row, SqlValue};

/// Database client over the PostgreSQL pool, as used by the service
pub type PgDatabase = Database<PgConnectionPool>;
