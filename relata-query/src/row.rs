//! Rows returned by a connection.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::id::ResourceId;

/// One result row: column name to JSON value, in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: IndexMap<String, JsonValue>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column.
    pub fn insert(&mut self, column: impl Into<String>, value: JsonValue) {
        self.columns.insert(column.into(), value);
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.columns.get(column)
    }

    /// Read a column as a resource id; `None` when absent or null.
    pub fn id(&self, column: &str) -> Option<ResourceId> {
        self.get(column).and_then(ResourceId::from_json)
    }

    /// Iterate columns in select-list order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, JsonValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, JsonValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl From<serde_json::Map<String, JsonValue>> for Row {
    fn from(map: serde_json::Map<String, JsonValue>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_access() {
        let row: Row = [("id", json!(3)), ("title", json!("Hi")), ("author_id", json!(null))]
            .into_iter()
            .collect();

        assert_eq!(row.len(), 3);
        assert_eq!(row.id("id"), Some(ResourceId::Int(3)));
        assert_eq!(row.id("author_id"), None);
        assert_eq!(row.id("missing"), None);
        assert_eq!(
            row.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["id", "title", "author_id"]
        );
    }
}
