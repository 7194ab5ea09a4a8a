//! Resource identifiers.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;

/// The primary-key value of a resource.
///
/// Integer keys stay integers so they bind with the right affinity; every
/// other key is carried as text. Serializes as a string, as JSON:API
/// requires for `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    /// Integer key.
    Int(i64),
    /// Textual key (UUIDs, slugs).
    Str(String),
}

impl ResourceId {
    /// Read an id out of a column value; `None` for null and non-scalar values.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().map(Self::Int),
            JsonValue::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// The parameter value used to bind this id.
    pub fn to_filter_value(&self) -> FilterValue {
        match self {
            Self::Int(i) => FilterValue::Int(*i),
            Self::Str(s) => FilterValue::String(s.clone()),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<i64> for ResourceId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ResourceId {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for ResourceId {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&ResourceId> for FilterValue {
    fn from(id: &ResourceId) -> Self {
        id.to_filter_value()
    }
}

impl From<ResourceId> for FilterValue {
    fn from(id: ResourceId) -> Self {
        match id {
            ResourceId::Int(i) => FilterValue::Int(i),
            ResourceId::Str(s) => FilterValue::String(s),
        }
    }
}

/// Format request identifiers must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdFormat {
    /// Signed 64-bit integers.
    #[default]
    Integer,
    /// RFC 4122 UUIDs, normalised to lowercase hyphenated form.
    Uuid,
    /// Any non-empty string.
    Text,
}

impl IdFormat {
    /// Parse a format name as used in configuration.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "integer" | "int" => Some(Self::Integer),
            "uuid" => Some(Self::Uuid),
            "text" | "string" => Some(Self::Text),
            _ => None,
        }
    }

    /// Name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Uuid => "uuid",
            Self::Text => "text",
        }
    }

    /// Validate and normalise a raw request id.
    pub fn parse(&self, raw: &str) -> QueryResult<ResourceId> {
        match self {
            Self::Integer => raw
                .parse::<i64>()
                .map(ResourceId::Int)
                .map_err(|e| QueryError::malformed_identifier(raw, self.name()).with_source(e)),
            Self::Uuid => uuid::Uuid::parse_str(raw)
                .map(|u| ResourceId::Str(u.hyphenated().to_string()))
                .map_err(|e| QueryError::malformed_identifier(raw, self.name()).with_source(e)),
            Self::Text if raw.is_empty() => Err(QueryError::malformed_identifier(raw, self.name())),
            Self::Text => Ok(ResourceId::Str(raw.to_string())),
        }
    }
}
