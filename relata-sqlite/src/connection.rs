//! SQLite connection wrapper.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value;
use tokio::sync::OwnedSemaphorePermit;
use tracing::trace;

use relata_query::error::QueryResult;
use relata_query::filter::FilterValue;
use relata_query::row::Row;
use relata_query::traits::Connection;

use crate::error::{SqliteError, SqliteResult};
use crate::types::{filter_value_to_sqlite, value_at};

pub(crate) type IdleQueue = Arc<Mutex<VecDeque<PooledConnection>>>;

/// An idle connection waiting in the pool.
pub(crate) struct PooledConnection {
    pub conn: tokio_rusqlite::Connection,
    pub created_at: Instant,
    pub last_used: Instant,
}

impl PooledConnection {
    pub fn new(conn: tokio_rusqlite::Connection) -> Self {
        let now = Instant::now();
        Self {
            conn,
            created_at: now,
            last_used: now,
        }
    }
}

/// A connection checked out of a [`SqlitePool`](crate::SqlitePool).
///
/// Dropping it returns the underlying connection to the pool's idle queue
/// (file databases only) and releases its permit.
pub struct SqliteConnection {
    conn: Option<tokio_rusqlite::Connection>,
    _permit: OwnedSemaphorePermit,
    return_to_pool: Option<IdleQueue>,
    created_at: Instant,
}

impl SqliteConnection {
    pub(crate) fn new(
        conn: tokio_rusqlite::Connection,
        permit: OwnedSemaphorePermit,
        return_to_pool: Option<IdleQueue>,
        created_at: Instant,
    ) -> Self {
        Self {
            conn: Some(conn),
            _permit: permit,
            return_to_pool,
            created_at,
        }
    }

    fn conn(&self) -> SqliteResult<&tokio_rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| SqliteError::connection("connection already returned to the pool"))
    }

    /// Run a query with parameters and return every row.
    pub async fn query_rows(&self, sql: &str, params: Vec<Value>) -> SqliteResult<Vec<Row>> {
        let sql = sql.to_string();
        trace!(sql = %sql, params = params.len(), "Executing query");

        self.conn()?
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let columns: Vec<String> = stmt
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();

                let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok(columns
                        .iter()
                        .enumerate()
                        .map(|(i, col)| (col.clone(), value_at(row, i)))
                        .collect::<Row>())
                })?;

                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Execute multiple statements in a batch.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        trace!(sql = %sql, "Executing batch");

        self.conn()?
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(SqliteError::from)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn query(&mut self, sql: &str, params: &[FilterValue]) -> QueryResult<Vec<Row>> {
        let params = params.iter().map(filter_value_to_sqlite).collect();
        Ok(self.query_rows(sql, params).await?)
    }

    async fn begin(&mut self) -> QueryResult<()> {
        Ok(self.execute_batch("BEGIN").await?)
    }

    async fn commit(&mut self) -> QueryResult<()> {
        Ok(self.execute_batch("COMMIT").await?)
    }

    async fn rollback(&mut self) -> QueryResult<()> {
        Ok(self.execute_batch("ROLLBACK").await?)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let (Some(pool), Some(conn)) = (self.return_to_pool.take(), self.conn.take()) {
            trace!("Returning connection to pool");
            pool.lock().push_back(PooledConnection {
                conn,
                created_at: self.created_at,
                last_used: Instant::now(),
            });
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("pooled", &self.return_to_pool.is_some())
            .finish_non_exhaustive()
    }
}
