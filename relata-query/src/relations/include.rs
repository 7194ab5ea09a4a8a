//! Include trees built from client include paths.

use indexmap::IndexMap;

use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::schema::{CollectionId, RelationshipId, SchemaRegistry};

/// Relationships to embed beneath one resource type, recursively.
///
/// Built once per request from dotted include paths and never mutated
/// afterwards. Overlapping paths (`comments`, `comments.author`) share
/// one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: IndexMap<RelationshipId, IncludeTree>,
}

impl IncludeTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `paths` relative to collection `root`.
    ///
    /// Fails on the first empty segment, over-deep path, or relationship
    /// name unknown at its position; nothing is returned on failure.
    pub fn parse<S: AsRef<str>>(
        schema: &SchemaRegistry,
        root: CollectionId,
        paths: &[S],
        max_depth: usize,
    ) -> QueryResult<Self> {
        let mut tree = Self::new();
        for path in paths {
            tree.insert_path(schema, root, path.as_ref(), max_depth)?;
        }
        Ok(tree)
    }

    fn insert_path(
        &mut self,
        schema: &SchemaRegistry,
        root: CollectionId,
        path: &str,
        max_depth: usize,
    ) -> QueryResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(QueryError::invalid_include(path, "empty path segment"));
        }
        if segments.len() > max_depth {
            return Err(QueryError::invalid_include(
                path,
                format!("nesting exceeds the limit of {}", max_depth),
            ));
        }

        let mut node = self;
        let mut collection = root;
        for segment in segments {
            let rel_id = schema.relationship_id(collection, segment.trim()).map_err(|e| {
                if e.code == ErrorCode::UnknownRelationship {
                    e.with_field(path)
                } else {
                    e
                }
            })?;
            collection = schema.relationship(rel_id).related;
            node = node.children.entry(rel_id).or_default();
        }
        Ok(())
    }

    /// Whether nothing is included.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Direct children in first-mentioned order.
    pub fn iter(&self) -> impl Iterator<Item = (RelationshipId, &IncludeTree)> {
        self.children.iter().map(|(id, tree)| (*id, tree))
    }

    /// Subtree beneath one relationship.
    pub fn get(&self, relationship: RelationshipId) -> Option<&IncludeTree> {
        self.children.get(&relationship)
    }

    /// Longest path length in the tree.
    pub fn depth(&self) -> usize {
        self.children
            .values()
            .map(|child| 1 + child.depth())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, RelationshipDef};
    use pretty_assertions::assert_eq;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::builder()
            .collection(CollectionDef::new("people").columns(["id", "name"]))
            .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
            .collection(
                CollectionDef::new("comments").columns(["id", "body", "article_id", "author_id"]),
            )
            .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
            .relationship(RelationshipDef::one_to_many(
                "articles",
                "comments",
                "comments",
                "article_id",
            ))
            .relationship(RelationshipDef::many_to_one("comments", "author", "people", "author_id"))
            .relationship(RelationshipDef::one_to_many(
                "people",
                "articles",
                "articles",
                "author_id",
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_merges_overlapping_paths() {
        let schema = schema();
        let articles = schema.collection_id("articles").unwrap();
        let tree = IncludeTree::parse(
            &schema,
            articles,
            &["author", "comments", "comments.author", "author"],
            4,
        )
        .unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.depth(), 2);

        let comments = schema.relationship_id(articles, "comments").unwrap();
        let comments_coll = schema.collection_id("comments").unwrap();
        let comment_author = schema.relationship_id(comments_coll, "author").unwrap();
        let sub = tree.get(comments).unwrap();
        assert_eq!(sub.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![comment_author]);
    }

    #[test]
    fn test_parse_unknown_relationship() {
        let schema = schema();
        let articles = schema.collection_id("articles").unwrap();
        let err =
            IncludeTree::parse(&schema, articles, &["author", "comments.editor"], 4).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownRelationship);
        assert_eq!(err.context.field.as_deref(), Some("comments.editor"));
    }

    #[test]
    fn test_parse_rejects_empty_segments_and_depth() {
        let schema = schema();
        let articles = schema.collection_id("articles").unwrap();

        let err = IncludeTree::parse(&schema, articles, &["comments..author"], 4).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInclude);

        let deep = ["author.articles.comments.author"];
        let err = IncludeTree::parse(&schema, articles, &deep, 3).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInclude);

        let tree = IncludeTree::parse(&schema, articles, &deep, 4).unwrap();
        assert_eq!(tree.depth(), 4);
    }

    #[test]
    fn test_empty_paths() {
        let schema = schema();
        let people = schema.collection_id("people").unwrap();
        let tree = IncludeTree::parse::<&str>(&schema, people, &[], 3).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
    }
}
