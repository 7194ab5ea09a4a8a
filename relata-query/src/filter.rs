//! Filter types for building WHERE clauses.

use serde::{Deserialize, Serialize};

use crate::sql::SqlBuilder;

/// A value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// JSON value.
    Json(serde_json::Value),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A row filter over columns of the collection being fetched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison.
    Equals(String, FilterValue),
    /// Not equals comparison.
    NotEquals(String, FilterValue),

    /// Less than comparison.
    Lt(String, FilterValue),
    /// Less than or equal comparison.
    Lte(String, FilterValue),
    /// Greater than comparison.
    Gt(String, FilterValue),
    /// Greater than or equal comparison.
    Gte(String, FilterValue),

    /// In a list of values.
    In(String, Vec<FilterValue>),
    /// Not in a list of values.
    NotIn(String, Vec<FilterValue>),

    /// Contains (LIKE %value%).
    Contains(String, String),
    /// Starts with (LIKE value%).
    StartsWith(String, String),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.swap_remove(0),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.swap_remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Every column this filter references, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        let column = match self {
            Self::None => return,
            Self::Equals(col, _)
            | Self::NotEquals(col, _)
            | Self::Lt(col, _)
            | Self::Lte(col, _)
            | Self::Gt(col, _)
            | Self::Gte(col, _)
            | Self::In(col, _)
            | Self::NotIn(col, _)
            | Self::Contains(col, _)
            | Self::StartsWith(col, _)
            | Self::IsNull(col)
            | Self::IsNotNull(col) => col.as_str(),
            Self::And(filters) | Self::Or(filters) => {
                for filter in filters {
                    filter.collect_columns(out);
                }
                return;
            }
            Self::Not(inner) => {
                inner.collect_columns(out);
                return;
            }
        };
        if !out.contains(&column) {
            out.push(column);
        }
    }

    /// Render this filter into `builder`, binding every value as a parameter.
    pub fn write_sql(&self, builder: &mut SqlBuilder) {
        match self {
            Self::None => {
                builder.push("1 = 1");
            }

            Self::Equals(col, val) | Self::NotEquals(col, val) if val.is_null() => {
                let test = if matches!(self, Self::Equals(..)) {
                    " IS NULL"
                } else {
                    " IS NOT NULL"
                };
                builder.push_identifier(col).push(test);
            }
            Self::Equals(col, val) => comparison(builder, col, " = ", val),
            Self::NotEquals(col, val) => comparison(builder, col, " <> ", val),
            Self::Lt(col, val) => comparison(builder, col, " < ", val),
            Self::Lte(col, val) => comparison(builder, col, " <= ", val),
            Self::Gt(col, val) => comparison(builder, col, " > ", val),
            Self::Gte(col, val) => comparison(builder, col, " >= ", val),

            Self::In(_, values) if values.is_empty() => {
                builder.push("1 = 0");
            }
            Self::NotIn(_, values) if values.is_empty() => {
                builder.push("1 = 1");
            }
            Self::In(col, values) => {
                builder.push_identifier(col).push(" IN ").push_param_list(values.iter().cloned());
            }
            Self::NotIn(col, values) => {
                builder
                    .push_identifier(col)
                    .push(" NOT IN ")
                    .push_param_list(values.iter().cloned());
            }

            Self::Contains(col, needle) => {
                builder.push_identifier(col).push(" LIKE ").push_param(format!("%{}%", needle));
            }
            Self::StartsWith(col, prefix) => {
                builder.push_identifier(col).push(" LIKE ").push_param(format!("{}%", prefix));
            }

            Self::IsNull(col) => {
                builder.push_identifier(col).push(" IS NULL");
            }
            Self::IsNotNull(col) => {
                builder.push_identifier(col).push(" IS NOT NULL");
            }

            Self::And(filters) => joined(builder, filters, " AND ", "1 = 1"),
            Self::Or(filters) => joined(builder, filters, " OR ", "1 = 0"),
            Self::Not(inner) => {
                builder.push("NOT (");
                inner.write_sql(builder);
                builder.push(")");
            }
        }
    }
}

fn comparison(builder: &mut SqlBuilder, column: &str, op: &str, value: &FilterValue) {
    builder.push_identifier(column).push(op).push_param(value.clone());
}

fn joined(builder: &mut SqlBuilder, filters: &[Filter], sep: &str, empty: &str) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(sep);
        }
        filter.write_sql(builder);
    }
    builder.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::DatabaseType;

    fn render(filter: &Filter) -> (String, Vec<FilterValue>) {
        let mut builder = SqlBuilder::new(DatabaseType::PostgreSQL);
        filter.write_sql(&mut builder);
        builder.build()
    }

    #[test]
    fn test_filter_value_from() {
        assert_eq!(FilterValue::from(42i32), FilterValue::Int(42));
        assert_eq!(FilterValue::from("hello"), FilterValue::String("hello".to_string()));
        assert_eq!(FilterValue::from(None::<i64>), FilterValue::Null);
    }

    #[test]
    fn test_filter_and() {
        let filter = Filter::and([
            Filter::Equals("title".into(), "Hello".into()),
            Filter::None,
            Filter::Gt("votes".into(), FilterValue::Int(3)),
        ]);

        let (sql, params) = render(&filter);
        assert_eq!(sql, "(title = $1 AND votes > $2)");
        assert_eq!(params, vec![FilterValue::from("Hello"), FilterValue::Int(3)]);
    }

    #[test]
    fn test_filter_single_collapses() {
        let filter = Filter::or([Filter::IsNull("deleted_at".into())]);
        assert_eq!(filter, Filter::IsNull("deleted_at".into()));
    }

    #[test]
    fn test_filter_equals_null() {
        let (sql, params) = render(&Filter::Equals("author_id".into(), FilterValue::Null));
        assert_eq!(sql, "author_id IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_in_and_not() {
        let filter =
            Filter::not(Filter::In("status".into(), vec!["draft".into(), "hidden".into()]));
        let (sql, params) = render(&filter);
        assert_eq!(sql, "NOT (status IN ($1, $2))");
        assert_eq!(params.len(), 2);

        let (sql, _) = render(&Filter::In("status".into(), vec![]));
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn test_filter_contains() {
        let (sql, params) = render(&Filter::Contains("body".into(), "rust".into()));
        assert_eq!(sql, "body LIKE $1");
        assert_eq!(params, vec![FilterValue::String("%rust%".into())]);
    }

    #[test]
    fn test_filter_columns() {
        let filter = Filter::and([
            Filter::Equals("title".into(), "a".into()),
            Filter::or([
                Filter::IsNull("title".into()),
                Filter::Lt("votes".into(), FilterValue::Int(1)),
            ]),
        ]);
        assert_eq!(filter.columns(), vec!["title", "votes"]);
    }
}
