//! Response documents.
//!
//! These are plain values with `serde::Serialize` derives that mirror the
//! JSON:API compound document layout. Encoding them is left to the caller.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::id::ResourceId;

/// A `{type, id}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentifier {
    /// Resource type (collection name).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Primary key.
    pub id: ResourceId,
}

impl ResourceIdentifier {
    /// Create an identifier.
    pub fn new(resource_type: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Linkage of one relationship inside a resource object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Linkage {
    /// The related identifier or identifiers.
    pub data: LinkageData,
}

impl Linkage {
    /// To-one linkage.
    pub fn one(data: Option<ResourceIdentifier>) -> Self {
        Self {
            data: LinkageData::One(data),
        }
    }

    /// To-many linkage.
    pub fn many(data: Vec<ResourceIdentifier>) -> Self {
        Self {
            data: LinkageData::Many(data),
        }
    }
}

/// Resource linkage: null, one identifier, or a list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LinkageData {
    /// A related identifier, or null.
    One(Option<ResourceIdentifier>),
    /// Related identifiers.
    Many(Vec<ResourceIdentifier>),
}

/// A rendered resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceObject {
    /// Resource type (collection name).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Primary key.
    pub id: ResourceId,
    /// Attribute values by column.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, JsonValue>,
    /// Linkage by relationship name.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, Linkage>,
}

impl ResourceObject {
    /// Create an object with no attributes or relationships.
    pub fn new(resource_type: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            attributes: IndexMap::new(),
            relationships: IndexMap::new(),
        }
    }

    /// Add an attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Add a to-one linkage.
    pub fn relationship(
        mut self,
        name: impl Into<String>,
        data: Option<ResourceIdentifier>,
    ) -> Self {
        self.relationships.insert(name.into(), Linkage::one(data));
        self
    }

    /// Add a to-many linkage.
    pub fn relationship_many(
        mut self,
        name: impl Into<String>,
        data: Vec<ResourceIdentifier>,
    ) -> Self {
        self.relationships.insert(name.into(), Linkage::many(data));
        self
    }

    /// The `{type, id}` of this object.
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(&self.resource_type, self.id.clone())
    }
}

/// Primary data of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    /// A single resource or null.
    One(Option<ResourceObject>),
    /// A list of resources.
    Many(Vec<ResourceObject>),
    /// A single identifier or null.
    Identifier(Option<ResourceIdentifier>),
    /// A list of identifiers.
    Identifiers(Vec<ResourceIdentifier>),
}

impl PrimaryData {
    /// Identifiers of every object or identifier in the data.
    pub fn identifiers(&self) -> Vec<ResourceIdentifier> {
        match self {
            Self::One(obj) => obj.iter().map(ResourceObject::identifier).collect(),
            Self::Many(objs) => objs.iter().map(ResourceObject::identifier).collect(),
            Self::Identifier(id) => id.iter().cloned().collect(),
            Self::Identifiers(ids) => ids.clone(),
        }
    }

    /// Whether the data is null or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(obj) => obj.is_none(),
            Self::Many(objs) => objs.is_empty(),
            Self::Identifier(id) => id.is_none(),
            Self::Identifiers(ids) => ids.is_empty(),
        }
    }
}

/// A compound document: primary data plus included resources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Primary data.
    pub data: PrimaryData,
    /// Included resources, deduplicated by type and id.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
}

impl Document {
    /// Find an included resource.
    pub fn find_included(&self, resource_type: &str, id: &ResourceId) -> Option<&ResourceObject> {
        self.included
            .iter()
            .find(|obj| obj.resource_type == resource_type && obj.id == *id)
    }
}

/// Request-scoped included resources keyed by `(type, id)`.
///
/// Append-only; the first object inserted for a key wins. Keys reserved
/// for primary data are never admitted.
#[derive(Debug, Default)]
pub struct IncludedSet {
    reserved: HashSet<ResourceIdentifier>,
    objects: IndexMap<ResourceIdentifier, ResourceObject>,
}

impl IncludedSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `key` out of the set.
    pub fn reserve(&mut self, key: ResourceIdentifier) {
        self.reserved.insert(key);
    }

    /// Insert an object; returns whether it was added.
    pub fn insert(&mut self, object: ResourceObject) -> bool {
        let key = object.identifier();
        if self.reserved.contains(&key) || self.objects.contains_key(&key) {
            return false;
        }
        self.objects.insert(key, object);
        true
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no object was inserted.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The objects in insertion order.
    pub fn into_vec(self) -> Vec<ResourceObject> {
        self.objects.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_serialize_document() {
        let doc = Document {
            data: PrimaryData::One(Some(
                ResourceObject::new("articles", 42)
                    .attribute("title", json!("JSON:API paints my bikeshed!"))
                    .relationship("author", Some(ResourceIdentifier::new("people", 9))),
            )),
            included: vec![ResourceObject::new("people", 9).attribute("name", json!("Dan"))],
        };

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({
                "data": {
                    "type": "articles",
                    "id": "42",
                    "attributes": {"title": "JSON:API paints my bikeshed!"},
                    "relationships": {"author": {"data": {"type": "people", "id": "9"}}}
                },
                "included": [
                    {"type": "people", "id": "9", "attributes": {"name": "Dan"}}
                ]
            })
        );
    }

    #[test]
    fn test_serialize_linkage() {
        let object = ResourceObject::new("people", 9)
            .relationship("profile", None)
            .relationship_many(
                "articles",
                vec![
                    ResourceIdentifier::new("articles", 1),
                    ResourceIdentifier::new("articles", 2),
                ],
            )
            .relationship_many("tags", Vec::new());

        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({
                "type": "people",
                "id": "9",
                "relationships": {
                    "profile": {"data": null},
                    "articles": {"data": [
                        {"type": "articles", "id": "1"},
                        {"type": "articles", "id": "2"}
                    ]},
                    "tags": {"data": []}
                }
            })
        );
    }

    #[test]
    fn test_serialize_empty_parts() {
        let doc = Document {
            data: PrimaryData::One(None),
            included: Vec::new(),
        };
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({"data": null}));

        let doc = Document {
            data: PrimaryData::Identifiers(vec![ResourceIdentifier::new("tags", "rust")]),
            included: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"data": [{"type": "tags", "id": "rust"}]})
        );
    }

    #[test]
    fn test_included_set_dedup() {
        let mut set = IncludedSet::new();
        set.reserve(ResourceIdentifier::new("articles", 1));

        assert!(set.insert(ResourceObject::new("people", 9).attribute("name", json!("first"))));
        assert!(!set.insert(ResourceObject::new("people", 9).attribute("name", json!("second"))));
        assert!(!set.insert(ResourceObject::new("articles", 1)));
        assert!(set.insert(ResourceObject::new("articles", 2)));

        let objects = set.into_vec();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].attributes["name"], json!("first"));
    }
}
