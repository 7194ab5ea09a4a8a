//! Fetch strategies for each relationship variant.
//!
//! A [`ResourceFetcher`] turns one relationship plus a set of keys into a
//! single SELECT against the related table. Which SQL it writes depends on
//! where the foreign key lives:
//!
//! | Variant | Key predicate on the related table |
//! |---|---|
//! | `OneToOneLocal`, `ManyToOne` | `pk IN (SELECT fk FROM owner WHERE ...)` or `pk IN (fks)` |
//! | `OneToOneRemote`, `OneToMany` | `fk = ?` / `fk IN (...)` |
//! | `ManyToMany` | `pk IN (SELECT target FROM assoc WHERE source ...)` |
//!
//! An empty result is not an error. Only when the keys came straight from
//! the request does the fetcher look at the owner table to tell an empty
//! relationship apart from a missing owner.
//!
//! Relationships keyed on the related side also get a linkage statement
//! reading `(owner, related)` key pairs, so resource objects can carry
//! their linkage.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::id::ResourceId;
use crate::relations::{Relationship, RelationshipKind};
use crate::row::Row;
use crate::schema::{Collection, CollectionId, RelationshipId, SchemaRegistry};
use crate::sql::{DatabaseType, SqlBuilder};
use crate::traits::Connection;
use crate::types::OrderBy;

/// A rendered statement and its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with dialect placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<FilterValue>,
}

impl From<SqlBuilder> for Statement {
    fn from(builder: SqlBuilder) -> Self {
        let (sql, params) = builder.build();
        Self { sql, params }
    }
}

/// Columns selected from a collection's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<String>,
}

impl Projection {
    /// Columns for `fieldset` (all columns when `None`), plus the primary
    /// key and any `required` columns, in table declaration order.
    ///
    /// Relationship names in the fieldset select their local foreign key.
    pub fn new<S: AsRef<str>>(
        schema: &SchemaRegistry,
        collection: CollectionId,
        fieldset: Option<&[String]>,
        required: &[S],
    ) -> Self {
        let coll = schema.collection(collection);
        let Some(fields) = fieldset else {
            return Self {
                columns: coll.columns.clone(),
            };
        };

        let mut wanted: HashSet<&str> = required.iter().map(AsRef::as_ref).collect();
        wanted.insert(&coll.primary_key);
        for field in fields {
            if coll.is_attribute(field) {
                wanted.insert(field);
            } else if let Some(local_key) = coll
                .relationship(field)
                .and_then(|id| schema.relationship(id).kind.local_key())
            {
                wanted.insert(local_key);
            }
        }

        Self {
            columns: coll
                .columns
                .iter()
                .filter(|c| wanted.contains(c.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Only the primary key.
    pub fn key_only(collection: &Collection) -> Self {
        Self {
            columns: vec![collection.primary_key.clone()],
        }
    }

    /// Selected columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn write_select(&self, builder: &mut SqlBuilder, table: &str) {
        builder
            .push("SELECT ")
            .push_identifiers(self.columns.iter().map(String::as_str))
            .push(" FROM ")
            .push_identifier(table);
    }
}

/// The keys one fetch is driven by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchKeys {
    /// The id named by the request. An empty result triggers an owner
    /// existence check.
    Request(ResourceId),
    /// Primary keys of already-fetched owner rows.
    Owners(Vec<ResourceId>),
    /// Foreign-key values read from owner rows (local variants). Every
    /// referenced row must exist.
    References(Vec<ResourceId>),
}

impl FetchKeys {
    /// The ids bound into the key predicate.
    pub fn ids(&self) -> &[ResourceId] {
        match self {
            Self::Request(id) => std::slice::from_ref(id),
            Self::Owners(ids) | Self::References(ids) => ids,
        }
    }

    /// Whether there is nothing to fetch.
    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

/// Per-fetch options.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions<'a> {
    /// Columns to select.
    pub projection: &'a Projection,
    /// Extra row filter, ANDed with the key predicate.
    pub filter: Option<&'a Filter>,
    /// Ordering.
    pub sort: Option<&'a OrderBy>,
}

impl<'a> FetchOptions<'a> {
    /// Options with no filter and no sort.
    pub fn new(projection: &'a Projection) -> Self {
        Self {
            projection,
            filter: None,
            sort: None,
        }
    }

    /// Set the filter; an empty filter is ignored.
    pub fn filter(mut self, filter: &'a Filter) -> Self {
        self.filter = (!filter.is_none()).then_some(filter);
        self
    }

    /// Set the ordering; an empty ordering is ignored.
    pub fn sort(mut self, sort: Option<&'a OrderBy>) -> Self {
        self.sort = sort.filter(|s| !s.is_empty());
        self
    }
}

/// Fetches the related rows of one relationship.
#[derive(Debug, Clone, Copy)]
pub struct ResourceFetcher<'a> {
    relationship: &'a Relationship,
    owner: &'a Collection,
    related: &'a Collection,
    dialect: DatabaseType,
}

impl<'a> ResourceFetcher<'a> {
    /// Create a fetcher for `relationship`.
    pub fn new(
        schema: &'a SchemaRegistry,
        relationship: RelationshipId,
        dialect: DatabaseType,
    ) -> Self {
        let relationship = schema.relationship(relationship);
        Self {
            relationship,
            owner: schema.collection(relationship.owner),
            related: schema.collection(relationship.related),
            dialect,
        }
    }

    /// The relationship this fetcher serves.
    pub fn relationship(&self) -> &'a Relationship {
        self.relationship
    }

    /// Keys for fetching this relationship beneath already-fetched owner
    /// rows, deduplicated in row order.
    pub fn keys_for<'r>(&self, owner_rows: impl IntoIterator<Item = &'r Row>) -> FetchKeys {
        let mut seen = HashSet::new();
        match self.relationship.kind.local_key() {
            Some(local_key) => FetchKeys::References(
                owner_rows
                    .into_iter()
                    .filter_map(|row| row.id(local_key))
                    .filter(|id| seen.insert(id.clone()))
                    .collect(),
            ),
            None => FetchKeys::Owners(
                owner_rows
                    .into_iter()
                    .filter_map(|row| row.id(&self.owner.primary_key))
                    .filter(|id| seen.insert(id.clone()))
                    .collect(),
            ),
        }
    }

    /// Render the related-rows statement.
    pub fn statement(&self, keys: &FetchKeys, options: &FetchOptions<'_>) -> Statement {
        let mut builder = SqlBuilder::new(self.dialect);
        options.projection.write_select(&mut builder, &self.related.table);
        builder.push(" WHERE ");
        self.write_key_predicate(&mut builder, keys);

        if let Some(filter) = options.filter {
            builder.push(" AND (");
            filter.write_sql(&mut builder);
            builder.push(")");
        }
        if let Some(sort) = options.sort {
            builder.push(" ORDER BY ").push(sort.to_sql());
        }
        builder.into()
    }

    fn write_key_predicate(&self, builder: &mut SqlBuilder, keys: &FetchKeys) {
        let ids = keys.ids();
        match &self.relationship.kind {
            RelationshipKind::OneToOneLocal { .. } | RelationshipKind::ManyToOne { .. }
                if matches!(keys, FetchKeys::References(_)) =>
            {
                write_match(builder, &self.related.primary_key, ids);
            }
            RelationshipKind::OneToOneLocal { local_key }
            | RelationshipKind::ManyToOne { local_key } => {
                builder
                    .push_identifier(&self.related.primary_key)
                    .push(" IN (SELECT ")
                    .push_identifier(local_key)
                    .push(" FROM ")
                    .push_identifier(&self.owner.table)
                    .push(" WHERE ");
                write_match(builder, &self.owner.primary_key, ids);
                builder.push(")");
            }
            RelationshipKind::OneToOneRemote { remote_key }
            | RelationshipKind::OneToMany { remote_key } => {
                write_match(builder, remote_key, ids);
            }
            RelationshipKind::ManyToMany { association } => {
                builder
                    .push_identifier(&self.related.primary_key)
                    .push(" IN (SELECT ")
                    .push_identifier(&association.target_column)
                    .push(" FROM ")
                    .push_identifier(&association.table_name)
                    .push(" WHERE ");
                write_match(builder, &association.source_column, ids);
                builder.push(")");
            }
        }
    }

    /// Render the owner lookup used after an empty request-keyed fetch.
    pub fn existence_statement(&self, id: &ResourceId) -> Statement {
        let mut builder = SqlBuilder::new(self.dialect);
        builder
            .push("SELECT ")
            .push_identifier(&self.owner.primary_key)
            .push(" FROM ")
            .push_identifier(&self.owner.table)
            .push(" WHERE ");
        write_match(&mut builder, &self.owner.primary_key, std::slice::from_ref(id));
        builder.into()
    }

    /// Fetch the related rows for `keys`.
    ///
    /// No statement is issued for empty keys. Fails with `ResourceNotFound`
    /// when a request-keyed owner is missing or when a referenced row does
    /// not exist.
    pub async fn fetch<C>(
        &self,
        conn: &mut C,
        keys: &FetchKeys,
        options: &FetchOptions<'_>,
    ) -> QueryResult<Vec<Row>>
    where
        C: Connection + ?Sized,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let rows = execute(conn, &self.statement(keys, options)).await?;
        match keys {
            FetchKeys::Request(id) if rows.is_empty() => self.verify_owner(conn, id).await?,
            FetchKeys::References(ids)
                if self.relationship.kind.local_key().is_some() && options.filter.is_none() =>
            {
                self.check_references(ids, &rows)?
            }
            _ => {}
        }
        Ok(rows)
    }

    async fn verify_owner<C>(&self, conn: &mut C, id: &ResourceId) -> QueryResult<()>
    where
        C: Connection + ?Sized,
    {
        let rows = execute(conn, &self.existence_statement(id)).await?;
        if rows.is_empty() {
            return Err(QueryError::resource_not_found(&self.owner.name, id));
        }
        Ok(())
    }

    fn check_references(&self, ids: &[ResourceId], rows: &[Row]) -> QueryResult<()> {
        let found: HashSet<ResourceId> = rows
            .iter()
            .filter_map(|row| row.id(&self.related.primary_key))
            .collect();
        match ids.iter().find(|id| !found.contains(*id)) {
            Some(missing) => Err(QueryError::resource_not_found(&self.related.name, missing)
                .with_relationship(&self.relationship.name)),
            None => Ok(()),
        }
    }

    /// Table and `(owner, related)` key columns read for linkage, or `None`
    /// when the key lives on the owner row.
    fn linkage_columns(&self) -> Option<(&'a str, &'a str, &'a str)> {
        let (relationship, related) = (self.relationship, self.related);
        match &relationship.kind {
            RelationshipKind::OneToOneLocal { .. } | RelationshipKind::ManyToOne { .. } => None,
            RelationshipKind::OneToOneRemote { remote_key }
            | RelationshipKind::OneToMany { remote_key } => Some((
                related.table.as_str(),
                remote_key.as_str(),
                related.primary_key.as_str(),
            )),
            RelationshipKind::ManyToMany { association } => Some((
                association.table_name.as_str(),
                association.source_column.as_str(),
                association.target_column.as_str(),
            )),
        }
    }

    /// Render the statement reading `(owner, related)` key pairs for
    /// `owners`. Local variants need no statement.
    pub fn linkage_statement(&self, owners: &[ResourceId]) -> Option<Statement> {
        let (table, owner_column, related_column) = self.linkage_columns()?;
        let mut builder = SqlBuilder::new(self.dialect);
        builder
            .push("SELECT ")
            .push_identifiers([owner_column, related_column])
            .push(" FROM ")
            .push_identifier(table)
            .push(" WHERE ");
        write_match(&mut builder, owner_column, owners);
        Some(builder.into())
    }

    /// Fetch the related ids of every owner in `owners`.
    ///
    /// Owners without related rows are absent from the map.
    pub async fn fetch_linkage<C>(
        &self,
        conn: &mut C,
        owners: &[ResourceId],
    ) -> QueryResult<LinkageMap>
    where
        C: Connection + ?Sized,
    {
        let mut linkage = LinkageMap::new();
        if owners.is_empty() {
            return Ok(linkage);
        }
        let (Some(statement), Some((_, owner_column, related_column))) =
            (self.linkage_statement(owners), self.linkage_columns())
        else {
            return Ok(linkage);
        };

        for row in execute(conn, &statement).await? {
            if let (Some(owner), Some(related)) = (row.id(owner_column), row.id(related_column)) {
                let ids = linkage.entry(owner).or_default();
                if !ids.contains(&related) {
                    ids.push(related);
                }
            }
        }
        Ok(linkage)
    }
}

/// Related ids per owner id, in arrival order.
pub type LinkageMap = IndexMap<ResourceId, Vec<ResourceId>>;

/// Fetches a resource of a collection by primary key.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryFetcher<'a> {
    collection: &'a Collection,
    dialect: DatabaseType,
}

impl<'a> PrimaryFetcher<'a> {
    /// Create a fetcher for `collection`.
    pub fn new(
        schema: &'a SchemaRegistry,
        collection: CollectionId,
        dialect: DatabaseType,
    ) -> Self {
        Self {
            collection: schema.collection(collection),
            dialect,
        }
    }

    /// Render the lookup statement.
    pub fn statement(&self, id: &ResourceId, projection: &Projection) -> Statement {
        let mut builder = SqlBuilder::new(self.dialect);
        projection.write_select(&mut builder, &self.collection.table);
        builder.push(" WHERE ");
        write_match(&mut builder, &self.collection.primary_key, std::slice::from_ref(id));
        builder.into()
    }

    /// Fetch the row, failing with `ResourceNotFound` when it is absent.
    pub async fn fetch<C>(
        &self,
        conn: &mut C,
        id: &ResourceId,
        projection: &Projection,
    ) -> QueryResult<Vec<Row>>
    where
        C: Connection + ?Sized,
    {
        let rows = execute(conn, &self.statement(id, projection)).await?;
        if rows.is_empty() {
            return Err(QueryError::resource_not_found(&self.collection.name, id));
        }
        Ok(rows)
    }
}

fn write_match(builder: &mut SqlBuilder, column: &str, ids: &[ResourceId]) {
    builder.push_identifier(column);
    match ids {
        [id] => {
            builder.push(" = ").push_param(id);
        }
        ids => {
            builder.push(" IN ").push_param_list(ids);
        }
    }
}

/// Issue one statement on `conn`.
pub(crate) async fn execute<C>(conn: &mut C, statement: &Statement) -> QueryResult<Vec<Row>>
where
    C: Connection + ?Sized,
{
    debug!(sql = %statement.sql, params = statement.params.len(), "Dispatching statement");
    conn.query(&statement.sql, &statement.params).await.map_err(|e| {
        if e.context.sql.is_none() {
            e.with_sql(&statement.sql)
        } else {
            e
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::relations::JoinTableSpec;
    use crate::schema::{CollectionDef, RelationshipDef};
    use crate::testing::{ScriptedPool, row};
    use crate::traits::ConnectionPool;
    use crate::types::OrderByField;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::builder()
            .collection(CollectionDef::new("people").columns(["id", "name", "twitter"]))
            .collection(CollectionDef::new("profiles").columns(["id", "bio", "person_id"]))
            .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
            .collection(CollectionDef::new("tags").columns(["id", "label"]))
            .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
            .relationship(RelationshipDef::one_to_many(
                "people",
                "articles",
                "articles",
                "author_id",
            ))
            .relationship(RelationshipDef::one_to_one_remote(
                "people",
                "profile",
                "profiles",
                "person_id",
            ))
            .relationship(RelationshipDef::one_to_one_local(
                "profiles",
                "person",
                "people",
                "person_id",
            ))
            .relationship(RelationshipDef::many_to_many(
                "articles",
                "tags",
                "tags",
                JoinTableSpec::new("article_tags", "article_id", "tag_id"),
            ))
            .build()
            .unwrap()
    }

    fn rel(schema: &SchemaRegistry, collection: &str, name: &str) -> RelationshipId {
        let coll = schema.collection_id(collection).unwrap();
        schema.relationship_id(coll, name).unwrap()
    }

    fn fetcher<'a>(
        schema: &'a SchemaRegistry,
        collection: &str,
        name: &str,
    ) -> ResourceFetcher<'a> {
        ResourceFetcher::new(schema, rel(schema, collection, name), DatabaseType::SQLite)
    }

    fn all_columns(schema: &SchemaRegistry, collection: &str) -> Projection {
        Projection::new::<&str>(schema, schema.collection_id(collection).unwrap(), None, &[])
    }

    #[test]
    fn test_projection_always_has_primary_key() {
        let schema = schema();
        let articles = schema.collection_id("articles").unwrap();
        let fields = vec!["title".to_string()];

        let projection = Projection::new::<&str>(&schema, articles, Some(&fields), &[]);
        assert_eq!(projection.columns(), ["id", "title"]);

        let fields = vec!["author".to_string()];
        let projection = Projection::new(&schema, articles, Some(&fields), &["title"]);
        assert_eq!(projection.columns(), ["id", "title", "author_id"]);

        let projection = Projection::new::<&str>(&schema, articles, Some(&[]), &[]);
        assert_eq!(projection.columns(), ["id"]);
    }

    #[test]
    fn test_local_statements() {
        let schema = schema();
        let author = fetcher(&schema, "articles", "author");
        let projection = all_columns(&schema, "people");
        let options = FetchOptions::new(&projection);

        let stmt = author.statement(&FetchKeys::Request(ResourceId::Int(42)), &options);
        assert_eq!(
            stmt.sql,
            "SELECT id, name, twitter FROM people WHERE id IN (SELECT author_id FROM articles WHERE id = ?)"
        );
        assert_eq!(stmt.params, vec![FilterValue::Int(42)]);

        let stmt = author.statement(
            &FetchKeys::References(vec![ResourceId::Int(1), ResourceId::Int(2)]),
            &options,
        );
        assert_eq!(stmt.sql, "SELECT id, name, twitter FROM people WHERE id IN (?, ?)");

        let stmt = author.existence_statement(&ResourceId::Int(42));
        assert_eq!(stmt.sql, "SELECT id FROM articles WHERE id = ?");
        assert_eq!(author.linkage_statement(&[ResourceId::Int(42)]), None);

        let person = fetcher(&schema, "profiles", "person");
        let stmt = person.statement(&FetchKeys::Request(ResourceId::Int(5)), &options);
        assert_eq!(
            stmt.sql,
            "SELECT id, name, twitter FROM people WHERE id IN (SELECT person_id FROM profiles WHERE id = ?)"
        );
        let stmt = person.statement(&FetchKeys::References(vec![ResourceId::Int(3)]), &options);
        assert_eq!(stmt.sql, "SELECT id, name, twitter FROM people WHERE id = ?");
    }

    #[test]
    fn test_linkage_statements() {
        let schema = schema();
        let owners = [ResourceId::Int(1), ResourceId::Int(2)];

        let stmt = fetcher(&schema, "people", "articles").linkage_statement(&owners).unwrap();
        assert_eq!(stmt.sql, "SELECT author_id, id FROM articles WHERE author_id IN (?, ?)");
        assert_eq!(stmt.params, vec![FilterValue::Int(1), FilterValue::Int(2)]);

        let stmt = fetcher(&schema, "people", "profile").linkage_statement(&owners[..1]).unwrap();
        assert_eq!(stmt.sql, "SELECT person_id, id FROM profiles WHERE person_id = ?");

        let stmt = fetcher(&schema, "articles", "tags").linkage_statement(&owners).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT article_id, tag_id FROM article_tags WHERE article_id IN (?, ?)"
        );

        assert!(fetcher(&schema, "profiles", "person").linkage_statement(&owners).is_none());
    }

    #[tokio::test]
    async fn test_fetch_linkage() {
        let schema = schema();
        let pool = ScriptedPool::new().table(
            "article_tags",
            vec![
                row(json!({"article_id": 2, "tag_id": 5})),
                row(json!({"article_id": 1, "tag_id": 6})),
                row(json!({"article_id": 2, "tag_id": 4})),
                row(json!({"article_id": 2, "tag_id": 5})),
            ],
        );
        let mut conn = pool.acquire().await.unwrap();
        let tags = fetcher(&schema, "articles", "tags");

        let linkage = tags
            .fetch_linkage(&mut conn, &[ResourceId::Int(1), ResourceId::Int(2), ResourceId::Int(3)])
            .await
            .unwrap();
        assert_eq!(linkage[&ResourceId::Int(1)], vec![ResourceId::Int(6)]);
        assert_eq!(linkage[&ResourceId::Int(2)], vec![ResourceId::Int(5), ResourceId::Int(4)]);
        assert!(!linkage.contains_key(&ResourceId::Int(3)));

        assert!(tags.fetch_linkage(&mut conn, &[]).await.unwrap().is_empty());
        assert_eq!(pool.dispatch_count(), 1);
    }

    #[test]
    fn test_remote_statement_with_filter_and_sort() {
        let schema = schema();
        let articles = fetcher(&schema, "people", "articles");
        let projection = all_columns(&schema, "articles");
        let filter = Filter::Contains("title".into(), "rust".into());
        let sort = OrderBy::from(OrderByField::desc("title"));
        let options = FetchOptions::new(&projection).filter(&filter).sort(Some(&sort));

        let stmt = articles.statement(&FetchKeys::Request(ResourceId::Int(9)), &options);
        assert_eq!(
            stmt.sql,
            "SELECT id, title, author_id FROM articles WHERE author_id = ? AND (title LIKE ?) ORDER BY title DESC"
        );
        assert_eq!(stmt.params, vec![FilterValue::Int(9), FilterValue::String("%rust%".into())]);

        let stmt = articles.statement(
            &FetchKeys::Owners(vec![ResourceId::Int(1), ResourceId::Int(2), ResourceId::Int(3)]),
            &FetchOptions::new(&projection),
        );
        assert_eq!(
            stmt.sql,
            "SELECT id, title, author_id FROM articles WHERE author_id IN (?, ?, ?)"
        );
    }

    #[test]
    fn test_many_to_many_statement() {
        let schema = schema();
        let tags = fetcher(&schema, "articles", "tags");
        let projection = all_columns(&schema, "tags");

        let stmt = tags.statement(
            &FetchKeys::Request(ResourceId::Int(5)),
            &FetchOptions::new(&projection),
        );
        assert_eq!(
            stmt.sql,
            "SELECT id, label FROM tags WHERE id IN (SELECT tag_id FROM article_tags WHERE article_id = ?)"
        );
    }

    #[test]
    fn test_keys_for_rows() {
        let schema = schema();
        let rows = vec![
            row(json!({"id": 1, "author_id": 7})),
            row(json!({"id": 2, "author_id": null})),
            row(json!({"id": 3, "author_id": 7})),
        ];

        assert_eq!(
            fetcher(&schema, "articles", "author").keys_for(&rows),
            FetchKeys::References(vec![ResourceId::Int(7)])
        );
        assert_eq!(
            fetcher(&schema, "articles", "tags").keys_for(&rows),
            FetchKeys::Owners(vec![ResourceId::Int(1), ResourceId::Int(2), ResourceId::Int(3)])
        );
    }

    #[tokio::test]
    async fn test_empty_keys_issue_nothing() {
        let schema = schema();
        let pool = ScriptedPool::new();
        let mut conn = pool.acquire().await.unwrap();
        let projection = all_columns(&schema, "tags");

        let rows = fetcher(&schema, "articles", "tags")
            .fetch(&mut conn, &FetchKeys::Owners(vec![]), &FetchOptions::new(&projection))
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(pool.dispatch_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_result_with_existing_owner() {
        let schema = schema();
        let pool = ScriptedPool::new().table("people", vec![row(json!({"id": 3}))]);
        let mut conn = pool.acquire().await.unwrap();
        let projection = all_columns(&schema, "profiles");

        let rows = fetcher(&schema, "people", "profile")
            .fetch(
                &mut conn,
                &FetchKeys::Request(ResourceId::Int(3)),
                &FetchOptions::new(&projection),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(pool.dispatched_tables(), vec!["profiles", "people"]);
    }

    #[tokio::test]
    async fn test_empty_result_with_missing_owner() {
        let schema = schema();
        let pool = ScriptedPool::new();
        let mut conn = pool.acquire().await.unwrap();
        let projection = all_columns(&schema, "articles");

        let err = fetcher(&schema, "people", "articles")
            .fetch(
                &mut conn,
                &FetchKeys::Request(ResourceId::Int(3)),
                &FetchOptions::new(&projection),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
        assert_eq!(err.context.collection.as_deref(), Some("people"));
    }

    #[tokio::test]
    async fn test_missing_target_from_request_is_empty() {
        let schema = schema();
        let pool = ScriptedPool::new()
            .table("articles", vec![row(json!({"id": 42, "author_id": 77}))])
            .table("profiles", vec![row(json!({"id": 5, "person_id": 99}))]);
        let mut conn = pool.acquire().await.unwrap();
        let projection = all_columns(&schema, "people");
        let options = FetchOptions::new(&projection);

        for (collection, name, id) in [("articles", "author", 42), ("profiles", "person", 5)] {
            let rows = fetcher(&schema, collection, name)
                .fetch(&mut conn, &FetchKeys::Request(ResourceId::Int(id)), &options)
                .await
                .unwrap();
            assert!(rows.is_empty());
        }
        assert_eq!(
            pool.dispatched_tables(),
            vec!["people", "articles", "people", "profiles"]
        );
    }

    #[tokio::test]
    async fn test_dangling_reference() {
        let schema = schema();
        let pool = ScriptedPool::new();
        let mut conn = pool.acquire().await.unwrap();
        let projection = all_columns(&schema, "people");
        let author = fetcher(&schema, "articles", "author");

        let err = author
            .fetch(
                &mut conn,
                &FetchKeys::References(vec![ResourceId::Int(77)]),
                &FetchOptions::new(&projection),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
        assert_eq!(err.context.collection.as_deref(), Some("people"));
        assert!(err.message.contains("77"));
    }

    #[tokio::test]
    async fn test_primary_fetch() {
        let schema = schema();
        let pool = ScriptedPool::new().table("tags", vec![row(json!({"id": 1, "label": "rust"}))]);
        let mut conn = pool.acquire().await.unwrap();
        let tags = schema.collection_id("tags").unwrap();
        let people = schema.collection_id("people").unwrap();
        let projection = all_columns(&schema, "tags");

        let rows = PrimaryFetcher::new(&schema, tags, DatabaseType::SQLite)
            .fetch(&mut conn, &ResourceId::Int(1), &projection)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let err = PrimaryFetcher::new(&schema, people, DatabaseType::SQLite)
            .fetch(&mut conn, &ResourceId::Int(1), &all_columns(&schema, "people"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_postgres_placeholders() {
        let schema = schema();
        let tags = ResourceFetcher::new(
            &schema,
            rel(&schema, "articles", "tags"),
            DatabaseType::PostgreSQL,
        );
        let projection = all_columns(&schema, "tags");
        let stmt = tags.statement(
            &FetchKeys::Owners(vec![ResourceId::Int(1), ResourceId::Int(2)]),
            &FetchOptions::new(&projection),
        );
        assert!(stmt.sql.ends_with("WHERE article_id IN ($1, $2))"));
    }
}
