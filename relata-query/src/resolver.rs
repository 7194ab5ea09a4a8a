//! Read entry points.
//!
//! A [`Resolver`] pairs a schema with a connection pool. Each call
//! validates its input against the schema, acquires one connection, runs
//! the environment tree on it and assembles the document:
//!
//! ```rust,ignore
//! let resolver = Resolver::new(schema, pool);
//!
//! // GET /articles/42?include=author,comments.author
//! let spec = QuerySpec::new().include(["author", "comments.author"]);
//! let doc = resolver.resolve_resource("articles", "42", &spec).await?;
//!
//! // GET /articles/42/comments?sort=-created
//! let spec = QuerySpec::new().sort(OrderBy::parse("-created"));
//! let doc = resolver.resolve_related("articles", "42", "comments", &spec).await?;
//!
//! // GET /articles/42/relationships/tags
//! let doc = resolver.resolve_linkage("articles", "42", "tags").await?;
//! ```

use std::sync::Arc;

use tracing::instrument;

use crate::config::ResolverConfig;
use crate::document::Document;
use crate::error::QueryResult;
use crate::id::ResourceId;
use crate::query_spec::QuerySpec;
use crate::relations::{Cardinality, FetchKeys, IncludeTree};
use crate::resolve::{
    DocumentAssembler, DocumentShape, EnvTarget, ResolutionEnvironment, RootPlan, SharedConnection,
    TaskOrchestrator,
};
use crate::schema::{CollectionId, SchemaRegistry};
use crate::sql::DatabaseType;
use crate::traits::ConnectionPool;

/// Resolves read requests against a schema and a pool.
pub struct Resolver<P> {
    schema: Arc<SchemaRegistry>,
    pool: P,
    config: ResolverConfig,
}

/// A validated request, ready to run.
struct Plan {
    root: RootPlan,
    include: IncludeTree,
    id: ResourceId,
    shape: DocumentShape,
}

impl<P: ConnectionPool> Resolver<P> {
    /// Create a resolver with default settings.
    pub fn new(schema: Arc<SchemaRegistry>, pool: P) -> Self {
        Self {
            schema,
            pool,
            config: ResolverConfig::default(),
        }
    }

    /// Replace the settings.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// The schema.
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// The pool.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// The settings.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn dialect(&self) -> DatabaseType {
        self.config.dialect.unwrap_or_else(|| self.pool.dialect())
    }

    /// Resolve `/{collection}/{id}/{relationship}`.
    ///
    /// `data` holds the related resource (or null) for to-one relationships
    /// and the related resources for to-many ones. Filter and sort apply to
    /// to-many data; includes are relative to the related type.
    #[instrument(skip(self, spec), fields(include = spec.include.len()))]
    pub async fn resolve_related(
        &self,
        collection: &str,
        id: &str,
        relationship: &str,
        spec: &QuerySpec,
    ) -> QueryResult<Document> {
        let owner = self.schema.collection_id(collection)?;
        let id = self.config.id_format.parse(id)?;
        let rel_id = self.schema.relationship_id(owner, relationship)?;
        let rel = self.schema.relationship(rel_id);

        spec.validate_fields(&self.schema)?;
        if rel.is_to_many() {
            spec.validate_columns(self.schema.collection(rel.related))?;
        }
        let include = self.include_tree(rel.related, spec)?;

        let plan = Plan {
            root: RootPlan {
                target: EnvTarget::Related(rel_id),
                collection: rel.related,
                cardinality: rel.cardinality(),
                key_only: false,
                filtered: true,
            },
            include,
            id,
            shape: DocumentShape::Resources,
        };
        self.execute(plan, spec).await
    }

    /// Resolve `/{collection}/{id}`.
    ///
    /// `data` is the resource itself; includes are relative to its type.
    #[instrument(skip(self, spec), fields(include = spec.include.len()))]
    pub async fn resolve_resource(
        &self,
        collection: &str,
        id: &str,
        spec: &QuerySpec,
    ) -> QueryResult<Document> {
        let coll = self.schema.collection_id(collection)?;
        let id = self.config.id_format.parse(id)?;

        spec.validate_fields(&self.schema)?;
        let include = self.include_tree(coll, spec)?;

        let plan = Plan {
            root: RootPlan {
                target: EnvTarget::Primary,
                collection: coll,
                cardinality: Cardinality::ToOne,
                key_only: false,
                filtered: false,
            },
            include,
            id,
            shape: DocumentShape::Resources,
        };
        self.execute(plan, spec).await
    }

    /// Resolve `/{collection}/{id}/relationships/{relationship}`.
    ///
    /// `data` holds resource identifiers only and nothing is included.
    #[instrument(skip(self))]
    pub async fn resolve_linkage(
        &self,
        collection: &str,
        id: &str,
        relationship: &str,
    ) -> QueryResult<Document> {
        let owner = self.schema.collection_id(collection)?;
        let id = self.config.id_format.parse(id)?;
        let rel_id = self.schema.relationship_id(owner, relationship)?;
        let rel = self.schema.relationship(rel_id);

        let plan = Plan {
            root: RootPlan {
                target: EnvTarget::Related(rel_id),
                collection: rel.related,
                cardinality: rel.cardinality(),
                key_only: true,
                filtered: false,
            },
            include: IncludeTree::new(),
            id,
            shape: DocumentShape::Identifiers,
        };
        self.execute(plan, &QuerySpec::new()).await
    }

    fn include_tree(&self, root: CollectionId, spec: &QuerySpec) -> QueryResult<IncludeTree> {
        IncludeTree::parse(&self.schema, root, &spec.include, self.config.max_include_depth)
    }

    async fn execute(&self, plan: Plan, spec: &QuerySpec) -> QueryResult<Document> {
        let conn = self.pool.acquire().await?;
        let shared = Arc::new(SharedConnection::new(conn));
        let root =
            ResolutionEnvironment::tree(&self.schema, spec, plan.root, &plan.include, &shared);

        TaskOrchestrator::new(&self.schema, Arc::clone(&shared), self.dialect())
            .with_timeout(self.config.request_timeout)
            .run(&root, FetchKeys::Request(plan.id))
            .await?;

        DocumentAssembler::new(&self.schema, spec)
            .assemble(&root, plan.shape)
            .await
    }
}

impl<P> std::fmt::Debug for Resolver<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
