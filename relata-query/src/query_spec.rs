//! Per-request query parameters.

use std::collections::HashMap;

use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::filter::Filter;
use crate::schema::{Collection, SchemaRegistry};
use crate::types::OrderBy;

/// Already-parsed request parameters: sparse fieldsets, filter, sort and
/// include paths. Read-only during resolution.
///
/// ```rust
/// use relata_query::{Filter, OrderBy, QuerySpec};
///
/// let spec = QuerySpec::new()
///     .fields("articles", ["title", "author"])
///     .filter(Filter::IsNotNull("title".into()))
///     .sort(OrderBy::parse("-title"))
///     .include(["author", "comments.author"]);
///
/// assert_eq!(spec.fieldset("articles").map(<[String]>::len), Some(2));
/// assert_eq!(spec.fieldset("people"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Requested fields per resource type.
    pub fields: HashMap<String, Vec<String>>,
    /// Row filter for to-many related data.
    pub filter: Filter,
    /// Ordering for to-many related data.
    pub sort: Option<OrderBy>,
    /// Dotted include paths.
    pub include: Vec<String>,
}

impl QuerySpec {
    /// An empty spec: all fields, no filter, no sort, no includes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the fields returned for resource type `collection`.
    pub fn fields(
        mut self,
        collection: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.fields
            .insert(collection.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the sort order.
    pub fn sort(mut self, sort: impl Into<OrderBy>) -> Self {
        let sort = sort.into();
        self.sort = (!sort.is_empty()).then_some(sort);
        self
    }

    /// Add include paths.
    pub fn include(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Requested fields for a type, if restricted.
    pub fn fieldset(&self, collection: &str) -> Option<&[String]> {
        self.fields.get(collection).map(Vec::as_slice)
    }

    /// Check every fieldset names a known type and known fields.
    pub fn validate_fields(&self, schema: &SchemaRegistry) -> QueryResult<()> {
        for (type_name, fields) in &self.fields {
            let collection = schema.collection_id(type_name).map_err(|_| {
                QueryError::new(
                    ErrorCode::InvalidField,
                    format!("Fieldset names unknown resource type '{}'", type_name),
                )
                .with_collection(type_name)
            })?;
            let collection = schema.collection(collection);
            for field in fields {
                if !is_field(collection, field) {
                    return Err(QueryError::invalid_field(&collection.name, field));
                }
            }
        }
        Ok(())
    }

    /// Check the filter and sort only reference columns of `collection`.
    pub fn validate_columns(&self, collection: &Collection) -> QueryResult<()> {
        let sort_columns = self
            .sort
            .iter()
            .flat_map(|sort| sort.fields().iter().map(|f| f.column.as_str()));
        for column in self.filter.columns().into_iter().chain(sort_columns) {
            if !collection.has_column(column) {
                return Err(QueryError::invalid_field(&collection.name, column));
            }
        }
        Ok(())
    }
}

fn is_field(collection: &Collection, field: &str) -> bool {
    collection.is_attribute(field) || collection.relationship(field).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, RelationshipDef};
    use crate::types::OrderByField;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::builder()
            .collection(CollectionDef::new("people").columns(["id", "name"]))
            .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
            .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_validate_fields() {
        let schema = schema();
        QuerySpec::new()
            .fields("articles", ["title", "author"])
            .validate_fields(&schema)
            .unwrap();

        let err = QuerySpec::new()
            .fields("articles", ["author_id"])
            .validate_fields(&schema)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidField);

        let err = QuerySpec::new()
            .fields("comments", ["body"])
            .validate_fields(&schema)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidField);
    }

    #[test]
    fn test_validate_columns() {
        let schema = schema();
        let articles = schema.collection(schema.collection_id("articles").unwrap());

        QuerySpec::new()
            .filter(Filter::Equals("title".into(), "x".into()))
            .sort(OrderByField::desc("author_id"))
            .validate_columns(articles)
            .unwrap();

        let err = QuerySpec::new()
            .sort(OrderByField::asc("published"))
            .validate_columns(articles)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidField);
        assert_eq!(err.context.field.as_deref(), Some("published"));
    }

    #[test]
    fn test_empty_sort_is_none() {
        let spec = QuerySpec::new().sort(OrderBy::parse(""));
        assert!(spec.sort.is_none());
    }
}
