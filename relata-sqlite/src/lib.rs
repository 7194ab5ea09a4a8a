//! SQLite connection pool for relata.
//!
//! This crate implements the resolver's [`ConnectionPool`] and
//! [`Connection`] traits on top of `tokio-rusqlite`, so a
//! [`Resolver`](relata_query::Resolver) can read from a SQLite file.
//!
//! # Features
//!
//! - Async/await support via `tokio-rusqlite`
//! - Connection reuse for file databases
//! - One transaction per resolved request
//! - JSON-typed text columns decoded into JSON attributes
//!
//! # Example
//!
//! ```rust,ignore
//! use relata_sqlite::{SqliteConfig, SqlitePool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SqlitePool::new(SqliteConfig::from_url("sqlite://./blog.db")?).await?;
//!     let resolver = relata_query::Resolver::new(schema, pool);
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! [`ConnectionPool`]: relata_query::ConnectionPool
//! [`Connection`]: relata_query::Connection

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};
pub use pool::{PoolConfig, PoolStats, SqlitePool, SqlitePoolBuilder};
