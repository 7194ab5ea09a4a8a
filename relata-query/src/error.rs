//! Error types for relationship resolution.
//!
//! Every failure surfaced by the resolver is a [`QueryError`] carrying an
//! [`ErrorCode`] for programmatic handling and an [`ErrorContext`] naming
//! the collection, relationship, field or SQL involved.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: R{category}{number}
//! - 1xxx: Request errors (unknown names, malformed ids, bad includes)
//! - 2xxx: Resolution errors (missing resources, cancellation)
//! - 3xxx: Store errors (connection, execution, timeout)
//! - 7xxx: Configuration and schema errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use relata_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::resource_not_found("articles", "42");
//! assert_eq!(err.code, ErrorCode::ResourceNotFound);
//! assert_eq!(err.code.code(), "R2001");
//! assert_eq!(err.http_status(), 404);
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for resolution operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Request errors (1xxx)
    /// Collection name not present in the schema (R1001).
    UnknownCollection = 1001,
    /// Relationship name not present in the schema (R1002).
    UnknownRelationship = 1002,
    /// Request identifier failed format validation (R1003).
    MalformedIdentifier = 1003,
    /// Include path is malformed or too deep (R1004).
    InvalidInclude = 1004,
    /// Field, filter or sort column unknown for the type (R1005).
    InvalidField = 1005,

    // Resolution errors (2xxx)
    /// A resource needed by the request does not exist (R2001).
    ResourceNotFound = 2001,
    /// Resolution was abandoned because another task failed (R2002).
    Cancelled = 2002,

    // Store errors (3xxx)
    /// Statement execution failed (R3001).
    StoreError = 3001,
    /// Connection could not be acquired or was lost (R3002).
    ConnectionFailed = 3002,
    /// Request deadline elapsed (R3003).
    Timeout = 3003,

    // Configuration errors (7xxx)
    /// Schema definition is inconsistent (R7001).
    InvalidSchema = 7001,
    /// Configuration value is malformed (R7002).
    InvalidConfiguration = 7002,

    // Internal errors (9xxx)
    /// Internal error (R9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "R2001").
    pub fn code(&self) -> String {
        format!("R{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnknownCollection => "Unknown collection",
            Self::UnknownRelationship => "Unknown relationship",
            Self::MalformedIdentifier => "Malformed identifier",
            Self::InvalidInclude => "Invalid include path",
            Self::InvalidField => "Invalid field",
            Self::ResourceNotFound => "Resource not found",
            Self::Cancelled => "Resolution cancelled",
            Self::StoreError => "Store error",
            Self::ConnectionFailed => "Connection failed",
            Self::Timeout => "Request timed out",
            Self::InvalidSchema => "Invalid schema",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The collection involved.
    pub collection: Option<String>,
    /// The relationship involved.
    pub relationship: Option<String>,
    /// The field, include path or column involved.
    pub field: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while resolving a request.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl Clone for QueryError {
    /// Clones drop the boxed source; its message survives in `message`.
    fn clone(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            context: self.context.clone(),
            source: None,
        }
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Set the collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.context.collection = Some(collection.into());
        self
    }

    /// Set the relationship.
    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.context.relationship = Some(relationship.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an unknown collection error.
    pub fn unknown_collection(collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self::new(
            ErrorCode::UnknownCollection,
            format!("Collection '{}' does not exist", collection),
        )
        .with_collection(collection)
    }

    /// Create an unknown relationship error.
    pub fn unknown_relationship(
        collection: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        let collection = collection.into();
        let relationship = relationship.into();
        Self::new(
            ErrorCode::UnknownRelationship,
            format!("Collection '{}' has no relationship '{}'", collection, relationship),
        )
        .with_collection(collection)
        .with_relationship(relationship)
    }

    /// Create a malformed identifier error.
    pub fn malformed_identifier(id: impl Into<String>, expected: &str) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::MalformedIdentifier,
            format!("Identifier '{}' is not a valid {}", id, expected),
        )
        .with_field(id)
    }

    /// Create an invalid include error.
    pub fn invalid_include(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::InvalidInclude,
            format!("Invalid include path '{}': {}", path, message.into()),
        )
        .with_field(path)
    }

    /// Create an invalid field error.
    pub fn invalid_field(collection: impl Into<String>, field: impl Into<String>) -> Self {
        let collection = collection.into();
        let field = field.into();
        Self::new(
            ErrorCode::InvalidField,
            format!("Collection '{}' has no field '{}'", collection, field),
        )
        .with_collection(collection)
        .with_field(field)
    }

    /// Create a resource not found error.
    pub fn resource_not_found(collection: impl Into<String>, id: impl fmt::Display) -> Self {
        let collection = collection.into();
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("Resource '{}' with id '{}' does not exist", collection, id),
        )
        .with_collection(collection)
    }

    /// Create a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Resolution cancelled")
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreError, message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ConnectionFailed,
            format!("Connection error: {}", message.into()),
        )
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Request timed out after {}ms", duration_ms),
        )
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSchema, format!("Invalid schema: {}", message.into()))
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid value for {}: {}", name, message.into()),
        )
        .with_field(name)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message.into()))
    }

    // ============== Error Checks ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::ResourceNotFound
    }

    /// Check if this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// Check if this error is detected before any I/O.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UnknownCollection
                | ErrorCode::UnknownRelationship
                | ErrorCode::MalformedIdentifier
                | ErrorCode::InvalidInclude
                | ErrorCode::InvalidField
        )
    }

    /// Check if this error came from the store.
    pub fn is_store_error(&self) -> bool {
        matches!(self.code, ErrorCode::StoreError | ErrorCode::ConnectionFailed)
    }

    /// HTTP status class an HTTP layer should report for this error.
    pub fn http_status(&self) -> u16 {
        match self.code {
            ErrorCode::UnknownCollection
            | ErrorCode::UnknownRelationship
            | ErrorCode::MalformedIdentifier
            | ErrorCode::ResourceNotFound => 404,
            ErrorCode::InvalidInclude | ErrorCode::InvalidField => 400,
            ErrorCode::Timeout => 504,
            _ => 500,
        }
    }

    /// Display the full error with its context.
    pub fn display_full(&self) -> String {
        let mut output = format!("Error [{}]: {}\n", self.code.code(), self.message);

        if let Some(ref collection) = self.context.collection {
            output.push_str(&format!("  -> Collection: {}\n", collection));
        }
        if let Some(ref relationship) = self.context.relationship {
            output.push_str(&format!("  -> Relationship: {}\n", relationship));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  -> Field: {}\n", field));
        }
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.chars().count() > 200 {
                format!("{}...", sql.chars().take(200).collect::<String>())
            } else {
                sql.clone()
            };
            output.push_str(&format!("  -> SQL: {}\n", sql_display));
        }
        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}
