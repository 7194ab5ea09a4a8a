//! Sort specifications.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sql::quote_identifier;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Order by specification for a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByField {
    /// The column name to order by.
    pub column: String,
    /// The sort order.
    pub order: SortOrder,
}

impl OrderByField {
    /// Create a new order by field.
    pub fn new(column: impl Into<String>, order: SortOrder) -> Self {
        Self {
            column: column.into(),
            order,
        }
    }

    /// Create an ascending order.
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortOrder::Asc)
    }

    /// Create a descending order.
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortOrder::Desc)
    }

    /// Parse a JSON:API sort key: `-created` sorts descending, `created` ascending.
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix('-') {
            Some(column) => Self::desc(column),
            None => Self::asc(key),
        }
    }

    /// Write the SQL directly to a buffer.
    #[inline]
    pub fn write_sql(&self, buffer: &mut String) {
        buffer.push_str(&quote_identifier(&self.column));
        buffer.push(' ');
        buffer.push_str(self.order.as_sql());
    }
}

/// Order by specification that can be a single field or multiple fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBy {
    /// Order by a single field.
    Field(OrderByField),
    /// Order by multiple fields.
    Fields(Box<[OrderByField]>),
}

impl OrderBy {
    /// Create an empty order by (no ordering).
    pub fn none() -> Self {
        Self::Fields(Box::new([]))
    }

    /// Check if the order by is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Field(_) => false,
            Self::Fields(fields) => fields.is_empty(),
        }
    }

    /// Parse a comma separated JSON:API sort parameter such as `-created,title`.
    pub fn parse(param: &str) -> Self {
        Self::from_fields(
            param
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(OrderByField::parse),
        )
    }

    /// Create an OrderBy from multiple fields.
    pub fn from_fields(fields: impl IntoIterator<Item = OrderByField>) -> Self {
        let mut fields: Vec<_> = fields.into_iter().collect();
        match fields.len() {
            1 => Self::Field(fields.swap_remove(0)),
            _ => Self::Fields(fields.into_boxed_slice()),
        }
    }

    /// The fields in this ordering.
    pub fn fields(&self) -> &[OrderByField] {
        match self {
            Self::Field(field) => std::slice::from_ref(field),
            Self::Fields(fields) => fields,
        }
    }

    /// Write the ORDER BY list (without the keyword) directly to a buffer.
    #[inline]
    pub fn write_sql(&self, buffer: &mut String) {
        for (i, field) in self.fields().iter().enumerate() {
            if i > 0 {
                buffer.push_str(", ");
            }
            field.write_sql(buffer);
        }
    }

    /// Generate the ORDER BY list (without the keyword).
    pub fn to_sql(&self) -> String {
        let mut sql = String::with_capacity(self.fields().len() * 16);
        self.write_sql(&mut sql);
        sql
    }
}

impl From<OrderByField> for OrderBy {
    fn from(field: OrderByField) -> Self {
        Self::Field(field)
    }
}

impl From<Vec<OrderByField>> for OrderBy {
    fn from(fields: Vec<OrderByField>) -> Self {
        Self::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order() {
        assert_eq!(SortOrder::Asc.as_sql(), "ASC");
        assert_eq!(SortOrder::Desc.to_string(), "DESC");
        assert_eq!(SortOrder::default(), SortOrder::Asc);
    }

    #[test]
    fn test_parse_sort_param() {
        let order = OrderBy::parse("-created, title,");
        assert_eq!(
            order.fields().to_vec(),
            vec![OrderByField::desc("created"), OrderByField::asc("title")]
        );
        assert_eq!(order.to_sql(), "created DESC, title ASC");
    }

    #[test]
    fn test_order_by_quotes_reserved() {
        let order = OrderBy::from(OrderByField::asc("order"));
        assert_eq!(order.to_sql(), "\"order\" ASC");
    }

    #[test]
    fn test_empty_order_by() {
        assert!(OrderBy::none().is_empty());
        assert!(OrderBy::parse("").is_empty());
        assert!(!OrderBy::from(OrderByField::asc("id")).is_empty());
    }
}
