//! # relata-query
//!
//! Relationship resolution engine for JSON:API style read endpoints.
//!
//! Given a resource, the relationships to follow, and the fields to
//! return, the engine computes the whole compound document:
//! - every relationship variant (one-to-one local or remote, many-to-one,
//!   one-to-many, many-to-many)
//! - nested includes, fetched as one batched statement per relationship
//! - deduplicated `included` resources
//! - a single error instead of a partial document when anything is missing
//!
//! All statements of a request share one connection. Independent fetches
//! run concurrently and take turns on the connection lock; the first
//! failure cancels everything still pending.
//!
//! ## Schema
//!
//! ```rust
//! use relata_query::schema::{CollectionDef, RelationshipDef, SchemaRegistry};
//! use relata_query::JoinTableSpec;
//!
//! let schema = SchemaRegistry::builder()
//!     .collection(CollectionDef::new("people").columns(["id", "name"]))
//!     .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
//!     .collection(CollectionDef::new("tags").columns(["id", "label"]))
//!     .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
//!     .relationship(RelationshipDef::one_to_many("people", "articles", "articles", "author_id"))
//!     .relationship(RelationshipDef::many_to_many(
//!         "articles",
//!         "tags",
//!         "tags",
//!         JoinTableSpec::new("article_tags", "article_id", "tag_id"),
//!     ))
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## Query Spec
//!
//! ```rust
//! use relata_query::{Filter, FilterValue, OrderBy, QuerySpec};
//!
//! let spec = QuerySpec::new()
//!     .fields("people", ["name"])
//!     .filter(Filter::and([
//!         Filter::Gt("id".into(), FilterValue::Int(10)),
//!         Filter::IsNotNull("title".into()),
//!     ]))
//!     .sort(OrderBy::parse("-title,id"))
//!     .include(["author"]);
//! assert_eq!(spec.include, vec!["author"]);
//! ```
//!
//! ## Errors
//!
//! ```rust
//! use relata_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::resource_not_found("people", 77);
//! assert_eq!(err.code, ErrorCode::ResourceNotFound);
//! assert_eq!(err.http_status(), 404);
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod id;
pub mod logging;
pub mod query_spec;
pub mod relations;
pub mod resolve;
pub mod resolver;
pub mod row;
pub mod schema;
pub mod sql;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{EnvSource, MapEnvSource, ResolverConfig, StdEnvSource};
pub use document::{
    Document, IncludedSet, Linkage, LinkageData, PrimaryData, ResourceIdentifier, ResourceObject,
};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use filter::{Filter, FilterValue};
pub use id::{IdFormat, ResourceId};
pub use query_spec::QuerySpec;
pub use relations::{Cardinality, IncludeTree, JoinTableSpec, Relationship, RelationshipKind};
pub use resolver::Resolver;
pub use row::Row;
pub use schema::{CollectionDef, CollectionId, RelationshipDef, RelationshipId, SchemaRegistry};
pub use sql::DatabaseType;
pub use traits::{Connection, ConnectionPool};
pub use types::{OrderBy, OrderByField, SortOrder};

// Re-export logging utilities
pub use logging::{init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ResolverConfig;
    pub use crate::document::{
        Document, Linkage, LinkageData, PrimaryData, ResourceIdentifier, ResourceObject,
    };
    pub use crate::error::{ErrorCode, QueryError, QueryResult};
    pub use crate::filter::{Filter, FilterValue};
    pub use crate::id::{IdFormat, ResourceId};
    pub use crate::query_spec::QuerySpec;
    pub use crate::relations::JoinTableSpec;
    pub use crate::resolver::Resolver;
    pub use crate::schema::{CollectionDef, RelationshipDef, SchemaRegistry};
    pub use crate::traits::{Connection, ConnectionPool};
    pub use crate::types::{OrderBy, OrderByField};
}
