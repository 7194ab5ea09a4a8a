//! # relata
//!
//! Concurrent relationship resolution for JSON:API style read endpoints.
//!
//! relata computes compound documents (`{data, included}`) from a
//! relational store. It follows every kind of relationship, resolves nested
//! includes with one batched statement per relationship, deduplicates
//! included resources, and returns exactly one error instead of a partial
//! document when a referenced resource is missing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relata::prelude::*;
//! use relata::sqlite::{SqliteConfig, SqlitePool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueryError> {
//!     let schema = SchemaRegistry::builder()
//!         .collection(CollectionDef::new("people").columns(["id", "name"]))
//!         .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
//!         .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
//!         .build()?;
//!
//!     let pool = SqlitePool::new(SqliteConfig::from_url("sqlite://blog.db")?).await?;
//!     let resolver = Resolver::new(Arc::new(schema), pool)
//!         .with_config(ResolverConfig::from_env()?);
//!
//!     let doc = resolver
//!         .resolve_resource("articles", "42", &QuerySpec::new().include(["author"]))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&doc).unwrap());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `sqlite`: the bundled SQLite connection pool
//! - `tracing-subscriber`: [`init_logging`] installs a subscriber configured
//!   by `RELATA_DEBUG`, `RELATA_LOG_LEVEL` and `RELATA_LOG_FORMAT`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use relata_query::*;

/// SQLite connection pool.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use relata_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use relata_query::prelude::*;

    #[cfg(feature = "sqlite")]
    pub use relata_sqlite::{SqliteConfig, SqlitePool};
}
