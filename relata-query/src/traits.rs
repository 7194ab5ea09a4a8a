//! Store collaborator traits.
//!
//! The resolver owns no driver. A [`ConnectionPool`] hands out one
//! [`Connection`] per request; every statement of that request is issued on
//! it, one at a time.

use async_trait::async_trait;

use crate::error::QueryResult;
use crate::filter::FilterValue;
use crate::row::Row;
use crate::sql::DatabaseType;

/// A single-statement-at-a-time store connection.
#[async_trait]
pub trait Connection: Send {
    /// Execute a SELECT and return every row.
    async fn query(&mut self, sql: &str, params: &[FilterValue]) -> QueryResult<Vec<Row>>;

    /// Open the request's read transaction.
    async fn begin(&mut self) -> QueryResult<()> {
        Ok(())
    }

    /// Close the transaction after a successful request.
    async fn commit(&mut self) -> QueryResult<()> {
        Ok(())
    }

    /// Close the transaction after a failed or cancelled request.
    async fn rollback(&mut self) -> QueryResult<()> {
        Ok(())
    }
}

/// Source of per-request connections.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Connection type handed out by the pool; released when dropped.
    type Connection: Connection + 'static;

    /// Acquire a connection for one request.
    async fn acquire(&self) -> QueryResult<Self::Connection>;

    /// Placeholder style statements must use.
    fn dialect(&self) -> DatabaseType;
}
