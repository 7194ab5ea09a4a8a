//! Connection pool for SQLite.
//!
//! SQLite has unique characteristics compared with server databases:
//!
//! - In-memory databases: each connection has its own isolated database,
//!   so every checkout opens a fresh one
//! - File-based databases: connections share the file and are reused
//!   through an idle queue
//!
//! A semaphore bounds the number of connections checked out at once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, trace};

use relata_query::error::QueryResult;
use relata_query::sql::DatabaseType;
use relata_query::traits::ConnectionPool;

use crate::config::{DatabasePath, SqliteConfig};
use crate::connection::{IdleQueue, PooledConnection, SqliteConnection};
use crate::error::{SqliteError, SqliteResult};

/// A connection pool for SQLite.
///
/// # Example
///
/// ```rust,ignore
/// use relata_sqlite::{SqliteConfig, SqlitePool};
///
/// let pool = SqlitePool::new(SqliteConfig::file("data.db")).await?;
/// let conn = pool.get().await?;
/// // Connection is returned to the pool when dropped
/// ```
#[derive(Clone)]
pub struct SqlitePool {
    config: Arc<SqliteConfig>,
    semaphore: Arc<Semaphore>,
    idle_connections: IdleQueue,
    pool_config: Arc<PoolConfig>,
    stats: Arc<Mutex<PoolStats>>,
}

/// Statistics about pool usage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of connection reuses.
    pub reuses: u64,
    /// Number of new connections opened.
    pub opens: u64,
    /// Number of idle connections closed due to expiration.
    pub expirations: u64,
}

impl SqlitePool {
    /// Create a new connection pool from configuration.
    pub async fn new(config: SqliteConfig) -> SqliteResult<Self> {
        Self::with_pool_config(config, PoolConfig::default()).await
    }

    /// Create a new connection pool with custom pool configuration.
    ///
    /// Opens one connection up front so a bad path fails here rather than
    /// on the first request.
    pub async fn with_pool_config(
        config: SqliteConfig,
        pool_config: PoolConfig,
    ) -> SqliteResult<Self> {
        if pool_config.max_connections == 0 {
            return Err(SqliteError::config("max_connections must be at least 1"));
        }

        let first = Self::open_connection(&config).await?;

        let pool = Self {
            config: Arc::new(config),
            semaphore: Arc::new(Semaphore::new(pool_config.max_connections)),
            idle_connections: Arc::new(Mutex::new(Default::default())),
            pool_config: Arc::new(pool_config),
            stats: Arc::new(Mutex::new(PoolStats::default())),
        };

        if !pool.config.path.is_memory() {
            pool.idle_connections.lock().push_back(PooledConnection::new(first));
        }

        info!(
            path = %pool.config.path.as_str(),
            max_connections = pool.pool_config.max_connections,
            "SQLite connection pool created"
        );
        Ok(pool)
    }

    async fn open_connection(config: &SqliteConfig) -> SqliteResult<tokio_rusqlite::Connection> {
        let init_sql = config.init_sql();

        let conn = match &config.path {
            DatabasePath::Memory => tokio_rusqlite::Connection::open_in_memory().await?,
            DatabasePath::File(path) => tokio_rusqlite::Connection::open(path).await?,
        };

        conn.call(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        })
        .await?;

        debug!(path = %config.path.as_str(), "Opened SQLite connection");
        Ok(conn)
    }

    /// Get a connection from the pool.
    ///
    /// Waits for a free slot (up to `connection_timeout`), then reuses an
    /// idle connection if one is still fresh, or opens a new one.
    pub async fn get(&self) -> SqliteResult<SqliteConnection> {
        trace!("Acquiring connection from pool");

        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let permit = match self.pool_config.connection_timeout {
            Some(limit) => tokio::time::timeout(limit, acquire)
                .await
                .map_err(|_| {
                    SqliteError::timeout(format!("no connection available within {:?}", limit))
                })?,
            None => acquire.await,
        }
        .map_err(|e| SqliteError::pool(format!("failed to acquire permit: {}", e)))?;

        if self.config.path.is_memory() {
            let conn = Self::open_connection(&self.config).await?;
            self.stats.lock().opens += 1;
            return Ok(SqliteConnection::new(conn, permit, None, Instant::now()));
        }

        if let Some(pooled) = self.take_idle() {
            self.stats.lock().reuses += 1;
            return Ok(SqliteConnection::new(
                pooled.conn,
                permit,
                Some(Arc::clone(&self.idle_connections)),
                pooled.created_at,
            ));
        }

        debug!("No idle connections, opening new connection");
        let conn = Self::open_connection(&self.config).await?;
        self.stats.lock().opens += 1;
        Ok(SqliteConnection::new(
            conn,
            permit,
            Some(Arc::clone(&self.idle_connections)),
            Instant::now(),
        ))
    }

    /// Pop the first idle connection that has not expired, dropping the
    /// expired ones on the way.
    fn take_idle(&self) -> Option<PooledConnection> {
        let mut idle = self.idle_connections.lock();
        while let Some(pooled) = idle.pop_front() {
            let expired = self
                .pool_config
                .max_lifetime
                .is_some_and(|lifetime| pooled.created_at.elapsed() > lifetime);
            let idle_expired = self
                .pool_config
                .idle_timeout
                .is_some_and(|timeout| pooled.last_used.elapsed() > timeout);

            if expired || idle_expired {
                self.stats.lock().expirations += 1;
                continue;
            }
            return Some(pooled);
        }
        None
    }

    /// Get the database configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Get the pool settings.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    /// Get the number of available permits.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the number of idle connections in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle_connections.lock().len()
    }

    /// Create a builder for configuring the pool.
    pub fn builder() -> SqlitePoolBuilder {
        SqlitePoolBuilder::new()
    }
}

#[async_trait]
impl ConnectionPool for SqlitePool {
    type Connection = SqliteConnection;

    async fn acquire(&self) -> QueryResult<SqliteConnection> {
        Ok(self.get().await?)
    }

    fn dialect(&self) -> DatabaseType {
        DatabaseType::SQLite
    }
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool")
            .field("config", &self.config)
            .field("pool_config", &self.pool_config)
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// Configuration for the connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once.
    pub max_connections: usize,
    /// How long `get` waits for a free slot.
    pub connection_timeout: Option<Duration>,
    /// Maximum idle time before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a connection before it's recycled.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connection_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(300)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

/// Builder for creating a connection pool.
#[derive(Debug, Default)]
pub struct SqlitePoolBuilder {
    config: Option<SqliteConfig>,
    url: Option<String>,
    pool_config: PoolConfig,
}

impl SqlitePoolBuilder {
    /// Create a new pool builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: SqliteConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.pool_config.max_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connection_timeout = Some(timeout);
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = Some(timeout);
        self
    }

    /// Build the connection pool.
    pub async fn build(self) -> SqliteResult<SqlitePool> {
        let config = match (self.config, self.url) {
            (Some(config), _) => config,
            (None, Some(url)) => SqliteConfig::from_url(url)?,
            (None, None) => return Err(SqliteError::config("no database URL or config provided")),
        };

        SqlitePool::with_pool_config(config, self.pool_config).await
    }
}
