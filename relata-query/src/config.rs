//! Resolver configuration.
//!
//! Settings come from code or from the environment:
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `RELATA_ID_FORMAT` | `integer`, `uuid`, `text` | `integer` |
//! | `RELATA_REQUEST_TIMEOUT_MS` | milliseconds, `0` disables | none |
//! | `RELATA_MAX_INCLUDE_DEPTH` | positive integer | `5` |
//! | `RELATA_DIALECT` | `sqlite`, `postgres`, `mysql` | the pool's |

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{QueryError, QueryResult};
use crate::id::IdFormat;
use crate::sql::DatabaseType;

/// Default limit on include path length.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 5;

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;

    /// Check if a variable exists.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Default environment source using std::env.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create a new map-based environment source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Settings shared by every request a resolver serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Format request ids must have.
    pub id_format: IdFormat,
    /// Deadline for a whole request.
    pub request_timeout: Option<Duration>,
    /// Longest accepted include path.
    pub max_include_depth: usize,
    /// Placeholder style override; the pool's dialect when `None`.
    pub dialect: Option<DatabaseType>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            id_format: IdFormat::default(),
            request_timeout: None,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            dialect: None,
        }
    }
}

impl ResolverConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from the process environment.
    pub fn from_env() -> QueryResult<Self> {
        Self::from_source(&StdEnvSource)
    }

    /// Read settings from `source`; unset variables keep their defaults.
    pub fn from_source(source: &impl EnvSource) -> QueryResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = source.get("RELATA_ID_FORMAT") {
            config.id_format = IdFormat::from_name(&raw).ok_or_else(|| {
                QueryError::invalid_configuration(
                    "RELATA_ID_FORMAT",
                    format!("unknown id format '{}'", raw),
                )
                .with_help("Use one of: integer, uuid, text")
            })?;
        }
        if let Some(ms) = parse_var::<u64>(source, "RELATA_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(depth) = parse_var::<usize>(source, "RELATA_MAX_INCLUDE_DEPTH")? {
            if depth == 0 {
                return Err(QueryError::invalid_configuration(
                    "RELATA_MAX_INCLUDE_DEPTH",
                    "must be at least 1",
                ));
            }
            config.max_include_depth = depth;
        }
        if let Some(raw) = source.get("RELATA_DIALECT") {
            config.dialect = Some(DatabaseType::from_name(&raw).ok_or_else(|| {
                QueryError::invalid_configuration(
                    "RELATA_DIALECT",
                    format!("unknown dialect '{}'", raw),
                )
            })?);
        }

        Ok(config)
    }

    /// Set the id format.
    pub fn id_format(mut self, format: IdFormat) -> Self {
        self.id_format = format;
        self
    }

    /// Set the request deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the include depth limit.
    pub fn max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Override the placeholder style.
    pub fn dialect(mut self, dialect: DatabaseType) -> Self {
        self.dialect = Some(dialect);
        self
    }
}

fn parse_var<T: FromStr>(source: &impl EnvSource, name: &str) -> QueryResult<Option<T>> {
    match source.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| {
                QueryError::invalid_configuration(name, format!("'{}' is not a valid number", raw))
            }),
    }
}
