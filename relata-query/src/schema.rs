//! Immutable schema registry.
//!
//! The registry maps collection names to table metadata and owns every
//! [`Relationship`] descriptor. Collections and relationships are addressed
//! by copyable handles ([`CollectionId`], [`RelationshipId`]) so descriptors
//! never hold references to one another. A registry is built once, checked
//! for dangling key references, and then shared read-only (usually behind an
//! `Arc`) by every request.
//!
//! ```rust
//! use relata_query::schema::{CollectionDef, RelationshipDef, SchemaRegistry};
//!
//! let schema = SchemaRegistry::builder()
//!     .collection(CollectionDef::new("people").columns(["id", "name"]))
//!     .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
//!     .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
//!     .relationship(RelationshipDef::one_to_many("people", "articles", "articles", "author_id"))
//!     .build()
//!     .unwrap();
//!
//! let articles = schema.collection_id("articles").unwrap();
//! assert!(schema.relationship_id(articles, "author").is_ok());
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::relations::{JoinTableSpec, Relationship, RelationshipKind};

/// Handle of a collection inside a [`SchemaRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(usize);

/// Handle of a relationship inside a [`SchemaRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId(usize);

/// Table metadata for one collection.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Collection (resource type) name.
    pub name: String,
    /// Backing table name.
    pub table: String,
    /// Primary-key column.
    pub primary_key: String,
    /// Columns in declaration order, primary key included.
    pub columns: Vec<String>,
    relationships: IndexMap<String, RelationshipId>,
    local_keys: IndexMap<String, RelationshipId>,
}

impl Collection {
    /// Whether `column` is a column of this collection.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Relationship handles by name, in declaration order.
    pub fn relationships(&self) -> impl Iterator<Item = (&str, RelationshipId)> {
        self.relationships.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Look up a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<RelationshipId> {
        self.relationships.get(name).copied()
    }

    /// The local relationship whose foreign key is stored in `column`.
    pub fn local_key_relationship(&self, column: &str) -> Option<RelationshipId> {
        self.local_keys.get(column).copied()
    }

    /// Whether `column` is an ordinary attribute (not the key, not a local foreign key).
    pub fn is_attribute(&self, column: &str) -> bool {
        column != self.primary_key
            && self.has_column(column)
            && !self.local_keys.contains_key(column)
    }
}

/// Definition of a collection, fed to [`SchemaBuilder`].
#[derive(Debug, Clone)]
pub struct CollectionDef {
    name: String,
    table: Option<String>,
    primary_key: String,
    columns: Vec<String>,
}

impl CollectionDef {
    /// Create a collection whose table shares its name and whose key is `id`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key: "id".to_string(),
            columns: Vec::new(),
        }
    }

    /// Set the backing table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the primary-key column.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Set the column list.
    pub fn columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Definition of a relationship, fed to [`SchemaBuilder`].
#[derive(Debug, Clone)]
pub struct RelationshipDef {
    owner: String,
    name: String,
    related: String,
    kind: RelationshipKind,
}

impl RelationshipDef {
    fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        related: impl Into<String>,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            related: related.into(),
            kind,
        }
    }

    /// One-to-one with the foreign key on `owner`.
    pub fn one_to_one_local(
        owner: impl Into<String>,
        name: impl Into<String>,
        related: impl Into<String>,
        local_key: impl Into<String>,
    ) -> Self {
        let kind = RelationshipKind::OneToOneLocal {
            local_key: local_key.into(),
        };
        Self::new(owner, name, related, kind)
    }

    /// One-to-one with the foreign key on `related`.
    pub fn one_to_one_remote(
        owner: impl Into<String>,
        name: impl Into<String>,
        related: impl Into<String>,
        remote_key: impl Into<String>,
    ) -> Self {
        let kind = RelationshipKind::OneToOneRemote {
            remote_key: remote_key.into(),
        };
        Self::new(owner, name, related, kind)
    }

    /// Many-to-one with the foreign key on `owner`.
    pub fn many_to_one(
        owner: impl Into<String>,
        name: impl Into<String>,
        related: impl Into<String>,
        local_key: impl Into<String>,
    ) -> Self {
        Self::new(owner, name, related, RelationshipKind::ManyToOne { local_key: local_key.into() })
    }

    /// One-to-many with the foreign key on `related`.
    pub fn one_to_many(
        owner: impl Into<String>,
        name: impl Into<String>,
        related: impl Into<String>,
        remote_key: impl Into<String>,
    ) -> Self {
        let kind = RelationshipKind::OneToMany {
            remote_key: remote_key.into(),
        };
        Self::new(owner, name, related, kind)
    }

    /// Many-to-many through `association`.
    pub fn many_to_many(
        owner: impl Into<String>,
        name: impl Into<String>,
        related: impl Into<String>,
        association: JoinTableSpec,
    ) -> Self {
        Self::new(owner, name, related, RelationshipKind::ManyToMany { association })
    }
}

/// Builder that validates definitions into a [`SchemaRegistry`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    collections: Vec<CollectionDef>,
    relationships: Vec<RelationshipDef>,
}

impl SchemaBuilder {
    /// Add a collection.
    pub fn collection(mut self, def: CollectionDef) -> Self {
        self.collections.push(def);
        self
    }

    /// Add a relationship.
    pub fn relationship(mut self, def: RelationshipDef) -> Self {
        self.relationships.push(def);
        self
    }

    /// Validate every definition and build the registry.
    ///
    /// Fails with `InvalidSchema` on duplicate names, a missing primary key
    /// column, or any relationship naming an unknown collection or column.
    pub fn build(self) -> QueryResult<SchemaRegistry> {
        let mut collections = Vec::with_capacity(self.collections.len());
        let mut by_name = HashMap::with_capacity(self.collections.len());

        for def in self.collections {
            if by_name.contains_key(&def.name) {
                return Err(QueryError::invalid_schema(format!(
                    "collection '{}' is defined twice",
                    def.name
                )));
            }
            if !def.columns.iter().any(|c| *c == def.primary_key) {
                return Err(QueryError::invalid_schema(format!(
                    "primary key '{}' is not a column of '{}'",
                    def.primary_key, def.name
                ))
                .with_collection(&def.name));
            }
            by_name.insert(def.name.clone(), CollectionId(collections.len()));
            collections.push(Collection {
                table: def.table.unwrap_or_else(|| def.name.clone()),
                name: def.name,
                primary_key: def.primary_key,
                columns: def.columns,
                relationships: IndexMap::new(),
                local_keys: IndexMap::new(),
            });
        }

        let mut relationships = Vec::with_capacity(self.relationships.len());
        for def in self.relationships {
            let lookup = |name: &str| {
                by_name.get(name).copied().ok_or_else(|| {
                    QueryError::invalid_schema(format!(
                        "relationship '{}' references unknown collection '{}'",
                        def.name, name
                    ))
                    .with_relationship(&def.name)
                })
            };
            let owner = lookup(&def.owner)?;
            let related = lookup(&def.related)?;

            let owner_coll = &collections[owner.0];
            let related_coll = &collections[related.0];
            match &def.kind {
                RelationshipKind::OneToOneLocal { local_key }
                | RelationshipKind::ManyToOne { local_key } => {
                    if !owner_coll.has_column(local_key) || *local_key == owner_coll.primary_key {
                        return Err(unknown_key(&def, &owner_coll.name, local_key));
                    }
                }
                RelationshipKind::OneToOneRemote { remote_key }
                | RelationshipKind::OneToMany { remote_key } => {
                    if !related_coll.has_column(remote_key) {
                        return Err(unknown_key(&def, &related_coll.name, remote_key));
                    }
                }
                RelationshipKind::ManyToMany { association } => {
                    if association.table_name.is_empty()
                        || association.source_column.is_empty()
                        || association.target_column.is_empty()
                    {
                        return Err(QueryError::invalid_schema(format!(
                            "relationship '{}' has an incomplete association table",
                            def.name
                        ))
                        .with_relationship(&def.name));
                    }
                }
            }
            if owner_coll.relationships.contains_key(&def.name) {
                return Err(QueryError::invalid_schema(format!(
                    "relationship '{}' is defined twice on '{}'",
                    def.name, owner_coll.name
                ))
                .with_collection(&owner_coll.name));
            }
            if owner_coll.is_attribute(&def.name) || def.name == owner_coll.primary_key {
                return Err(QueryError::invalid_schema(format!(
                    "relationship '{}' shadows a column of '{}'",
                    def.name, owner_coll.name
                ))
                .with_collection(&owner_coll.name));
            }

            let id = RelationshipId(relationships.len());
            let owner_coll = &mut collections[owner.0];
            owner_coll.relationships.insert(def.name.clone(), id);
            if let Some(local_key) = def.kind.local_key() {
                owner_coll.local_keys.insert(local_key.to_string(), id);
            }
            relationships.push(Relationship {
                name: def.name,
                owner,
                related,
                kind: def.kind,
            });
        }

        debug!(
            collections = collections.len(),
            relationships = relationships.len(),
            "Schema registry built"
        );

        Ok(SchemaRegistry {
            collections,
            by_name,
            relationships,
        })
    }
}

fn unknown_key(def: &RelationshipDef, collection: &str, column: &str) -> QueryError {
    QueryError::invalid_schema(format!(
        "relationship '{}' uses unknown key column '{}.{}'",
        def.name, collection, column
    ))
    .with_relationship(&def.name)
    .with_field(column)
}

/// Collections and relationships known to the resolver.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    collections: Vec<Collection>,
    by_name: HashMap<String, CollectionId>,
    relationships: Vec<Relationship>,
}

impl SchemaRegistry {
    /// Start building a registry.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Get a collection by handle.
    pub fn collection(&self, id: CollectionId) -> &Collection {
        &self.collections[id.0]
    }

    /// Get a relationship by handle.
    pub fn relationship(&self, id: RelationshipId) -> &Relationship {
        &self.relationships[id.0]
    }

    /// Resolve a collection name.
    pub fn collection_id(&self, name: &str) -> QueryResult<CollectionId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::unknown_collection(name))
    }

    /// Resolve a relationship name on a collection.
    pub fn relationship_id(
        &self,
        collection: CollectionId,
        name: &str,
    ) -> QueryResult<RelationshipId> {
        let coll = self.collection(collection);
        coll.relationship(name)
            .ok_or_else(|| QueryError::unknown_relationship(&coll.name, name))
    }

    /// Iterate all collections.
    pub fn collections(&self) -> impl Iterator<Item = (CollectionId, &Collection)> {
        self.collections.iter().enumerate().map(|(i, c)| (CollectionId(i), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::relations::Cardinality;

    fn blog() -> SchemaBuilder {
        SchemaRegistry::builder()
            .collection(CollectionDef::new("people").columns(["id", "name"]))
            .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
            .collection(CollectionDef::new("tags").table("tag").columns(["id", "label"]))
    }

    #[test]
    fn test_build_registry() {
        let schema = blog()
            .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
            .relationship(RelationshipDef::many_to_many(
                "articles",
                "tags",
                "tags",
                JoinTableSpec::new("article_tags", "article_id", "tag_id"),
            ))
            .build()
            .unwrap();

        let articles = schema.collection_id("articles").unwrap();
        let author = schema.relationship_id(articles, "author").unwrap();
        let rel = schema.relationship(author);
        assert_eq!(rel.cardinality(), Cardinality::ToOne);
        assert_eq!(schema.collection(rel.related).name, "people");

        let coll = schema.collection(articles);
        assert_eq!(coll.local_key_relationship("author_id"), Some(author));
        assert!(coll.is_attribute("title"));
        assert!(!coll.is_attribute("author_id"));
        assert!(!coll.is_attribute("id"));

        let tags = schema.collection_id("tags").unwrap();
        assert_eq!(schema.collection(tags).table, "tag");
    }

    #[test]
    fn test_unknown_names() {
        let schema = blog().build().unwrap();
        let err = schema.collection_id("comments").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownCollection);

        let people = schema.collection_id("people").unwrap();
        let err = schema.relationship_id(people, "articles").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownRelationship);
    }

    #[test]
    fn test_rejects_unknown_key_column() {
        let err = blog()
            .relationship(RelationshipDef::one_to_many(
                "people",
                "articles",
                "articles",
                "writer_id",
            ))
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSchema);
        assert_eq!(err.context.field.as_deref(), Some("writer_id"));
    }

    #[test]
    fn test_rejects_unknown_collection() {
        let err = blog()
            .relationship(RelationshipDef::many_to_one(
                "articles",
                "editor",
                "editors",
                "author_id",
            ))
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSchema);
        assert!(err.message.contains("editors"));
    }

    #[test]
    fn test_rejects_missing_primary_key() {
        let err = SchemaRegistry::builder()
            .collection(CollectionDef::new("people").primary_key("pid").columns(["id"]))
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSchema);
    }

    #[test]
    fn test_rejects_shadowing_relationship() {
        let err = blog()
            .relationship(RelationshipDef::many_to_one("articles", "title", "people", "author_id"))
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSchema);
    }
}
