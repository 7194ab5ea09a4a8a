//! Turning a completed environment tree into a document.

use std::sync::Arc;

use crate::document::{
    Document, IncludedSet, Linkage, PrimaryData, ResourceIdentifier, ResourceObject,
};
use crate::error::{QueryError, QueryResult};
use crate::query_spec::QuerySpec;
use crate::relations::Cardinality;
use crate::row::Row;
use crate::schema::{Collection, SchemaRegistry};

use super::env::{EnvData, EnvState, ResolutionEnvironment};

/// Layout of the primary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    /// Full resource objects.
    Resources,
    /// Resource identifiers only.
    Identifiers,
}

/// Collapses environments into `{data, included}`.
#[derive(Debug, Clone, Copy)]
pub struct DocumentAssembler<'a> {
    schema: &'a SchemaRegistry,
    spec: &'a QuerySpec,
}

impl<'a> DocumentAssembler<'a> {
    /// Create an assembler.
    pub fn new(schema: &'a SchemaRegistry, spec: &'a QuerySpec) -> Self {
        Self { schema, spec }
    }

    /// Build the document once every environment has completed.
    ///
    /// Fails with `Internal` if any environment did not complete; callers
    /// only assemble after a successful run.
    pub async fn assemble<C>(
        &self,
        root: &Arc<ResolutionEnvironment<C>>,
        shape: DocumentShape,
    ) -> QueryResult<Document> {
        let mut envs = Vec::new();
        root.walk(&mut |env| envs.push(Arc::clone(env)));
        for env in &envs {
            let state = env.completed().await;
            if state != EnvState::Completed {
                return Err(QueryError::internal(format!(
                    "cannot assemble an environment in state {:?}",
                    state
                )));
            }
        }

        let data = self.primary_data(root, shape);

        let mut included = IncludedSet::new();
        for key in data.identifiers() {
            included.reserve(key);
        }
        for child in root.children() {
            self.collect(child, &mut included);
        }

        Ok(Document {
            data,
            included: included.into_vec(),
        })
    }

    fn primary_data<C>(&self, env: &ResolutionEnvironment<C>, shape: DocumentShape) -> PrimaryData {
        let collection = self.schema.collection(env.collection());
        env.with_data(|data| match (data, shape) {
            (EnvData::ToOne(row), DocumentShape::Resources) => {
                PrimaryData::One(row.as_ref().and_then(|row| self.render(env, collection, row)))
            }
            (EnvData::ToMany(rows), DocumentShape::Resources) => PrimaryData::Many(
                rows.values()
                    .filter_map(|row| self.render(env, collection, row))
                    .collect(),
            ),
            (EnvData::ToOne(row), DocumentShape::Identifiers) => {
                PrimaryData::Identifier(row.as_ref().and_then(|row| identifier(collection, row)))
            }
            (EnvData::ToMany(rows), DocumentShape::Identifiers) => PrimaryData::Identifiers(
                rows.values()
                    .filter_map(|row| identifier(collection, row))
                    .collect(),
            ),
        })
    }

    fn collect<C>(&self, env: &ResolutionEnvironment<C>, included: &mut IncludedSet) {
        let collection = self.schema.collection(env.collection());
        env.with_data(|data| {
            for row in data.rows() {
                if let Some(object) = self.render(env, collection, row) {
                    included.insert(object);
                }
            }
        });
        for child in env.children() {
            self.collect(child, included);
        }
    }

    /// Render one row of `env` with its local and fetched linkage.
    fn render<C>(
        &self,
        env: &ResolutionEnvironment<C>,
        collection: &Collection,
        row: &Row,
    ) -> Option<ResourceObject> {
        let mut object = self.resource(collection, row)?;
        for &rel_id in env.linked() {
            let Some(ids) = env.linkage(rel_id, &object.id) else {
                continue;
            };
            let relationship = self.schema.relationship(rel_id);
            let related = &self.schema.collection(relationship.related).name;
            let mut identifiers = ids.into_iter().map(|id| ResourceIdentifier::new(related, id));
            let linkage = match relationship.cardinality() {
                Cardinality::ToOne => Linkage::one(identifiers.next()),
                Cardinality::ToMany => Linkage::many(identifiers.collect()),
            };
            object.relationships.insert(relationship.name.clone(), linkage);
        }
        Some(object)
    }

    /// Render one row, honouring the collection's fieldset.
    ///
    /// Local foreign keys become relationship linkage; other non-key
    /// columns become attributes.
    pub fn resource(&self, collection: &Collection, row: &Row) -> Option<ResourceObject> {
        let id = row.id(&collection.primary_key)?;
        let fieldset = self.spec.fieldset(&collection.name);
        let visible = |name: &str| fieldset.is_none_or(|fields| fields.iter().any(|f| f == name));

        let mut object = ResourceObject::new(&collection.name, id);
        for (column, value) in row.iter() {
            if let Some(rel_id) = collection.local_key_relationship(column) {
                let relationship = self.schema.relationship(rel_id);
                if visible(&relationship.name) {
                    let related = &self.schema.collection(relationship.related).name;
                    let linkage = row
                        .id(column)
                        .map(|id| ResourceIdentifier::new(related, id));
                    object
                        .relationships
                        .insert(relationship.name.clone(), Linkage::one(linkage));
                }
            } else if collection.is_attribute(column) && visible(column) {
                object.attributes.insert(column.to_string(), value.clone());
            }
        }
        Some(object)
    }
}

fn identifier(collection: &Collection, row: &Row) -> Option<ResourceIdentifier> {
    row.id(&collection.primary_key)
        .map(|id| ResourceIdentifier::new(&collection.name, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, RelationshipDef};
    use crate::testing::row;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::builder()
            .collection(CollectionDef::new("people").columns(["id", "name"]))
            .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
            .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_resource_object() {
        let schema = schema();
        let articles = schema.collection(schema.collection_id("articles").unwrap());
        let spec = QuerySpec::new();
        let assembler = DocumentAssembler::new(&schema, &spec);

        let object = assembler
            .resource(articles, &row(json!({"id": 1, "title": "Hi", "author_id": 9})))
            .unwrap();
        assert_eq!(
            object,
            ResourceObject::new("articles", 1)
                .attribute("title", json!("Hi"))
                .relationship("author", Some(ResourceIdentifier::new("people", 9)))
        );

        let object = assembler
            .resource(articles, &row(json!({"id": 2, "title": "Null", "author_id": null})))
            .unwrap();
        assert_eq!(object.relationships["author"], Linkage::one(None));

        assert!(assembler.resource(articles, &row(json!({"title": "no id"}))).is_none());
    }

    #[test]
    fn test_resource_object_fieldset() {
        let schema = schema();
        let articles = schema.collection(schema.collection_id("articles").unwrap());
        let spec = QuerySpec::new().fields("articles", ["title"]);
        let assembler = DocumentAssembler::new(&schema, &spec);

        // author_id is projected for an include but not requested.
        let object = assembler
            .resource(articles, &row(json!({"id": 1, "title": "Hi", "author_id": 9})))
            .unwrap();
        assert_eq!(object, ResourceObject::new("articles", 1).attribute("title", json!("Hi")));
    }
}
