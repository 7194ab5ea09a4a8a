//! Scripted store for tests.
//!
//! [`ScriptedPool`] answers statements by the table they read from, records
//! every dispatched statement, and can delay or fail chosen tables. Enabled
//! for this crate's tests and, through the `test-util` feature, for
//! dependents.
//!
//! ```rust,ignore
//! let pool = ScriptedPool::new()
//!     .table("people", vec![row(json!({"id": 1, "name": "Ann"}))])
//!     .delay("people", Duration::from_millis(20));
//! let resolver = Resolver::new(schema, pool.clone());
//! // ...
//! assert_eq!(pool.dispatched_tables(), vec!["people"]);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::row::Row;
use crate::sql::DatabaseType;
use crate::traits::{Connection, ConnectionPool};

/// Build a [`Row`] from a JSON object literal. Non-objects yield an empty row.
pub fn row(value: JsonValue) -> Row {
    match value {
        JsonValue::Object(map) => map.into(),
        _ => Row::new(),
    }
}

/// A statement as seen by the scripted store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    /// SQL text.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<FilterValue>,
    /// Table named by the first `FROM`.
    pub table: String,
}

impl RecordedQuery {
    fn new(sql: &str, params: &[FilterValue]) -> Self {
        Self {
            sql: sql.to_string(),
            params: params.to_vec(),
            table: table_of(sql),
        }
    }

    /// Integer parameters, in order.
    pub fn int_params(&self) -> Vec<i64> {
        self.params
            .iter()
            .filter_map(|p| match p {
                FilterValue::Int(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

fn table_of(sql: &str) -> String {
    sql.split_once(" FROM ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(|t| t.trim_matches(|c| c == '"' || c == '`').to_string())
        .unwrap_or_default()
}

type Handler = dyn Fn(&RecordedQuery) -> Option<QueryResult<Vec<Row>>> + Send + Sync;

#[derive(Clone, Default)]
struct Script {
    tables: HashMap<String, Vec<Row>>,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, QueryError>,
    handler: Option<Arc<Handler>>,
    dialect: DatabaseType,
}

impl Script {
    fn respond(&self, query: &RecordedQuery) -> QueryResult<Vec<Row>> {
        if let Some(err) = self.failures.get(&query.table) {
            return Err(err.clone());
        }
        if let Some(result) = self.handler.as_ref().and_then(|h| h(query)) {
            return result;
        }
        Ok(self.tables.get(&query.table).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct Log {
    queries: Mutex<Vec<RecordedQuery>>,
    transactions: Mutex<Vec<&'static str>>,
    acquired: AtomicUsize,
}

/// Connection pool answering from a script.
#[derive(Clone, Default)]
pub struct ScriptedPool {
    script: Arc<Script>,
    log: Arc<Log>,
}

impl ScriptedPool {
    /// An empty script: every statement returns no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned for statements reading `table`.
    pub fn table(mut self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        Arc::make_mut(&mut self.script).tables.insert(table.into(), rows);
        self
    }

    /// Delay every statement reading `table`.
    pub fn delay(mut self, table: impl Into<String>, delay: Duration) -> Self {
        Arc::make_mut(&mut self.script).delays.insert(table.into(), delay);
        self
    }

    /// Fail every statement reading `table`.
    pub fn fail(mut self, table: impl Into<String>, error: QueryError) -> Self {
        Arc::make_mut(&mut self.script).failures.insert(table.into(), error);
        self
    }

    /// Answer statements with `handler`; `None` falls back to the table rows.
    pub fn on_query<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RecordedQuery) -> Option<QueryResult<Vec<Row>>> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.script).handler = Some(Arc::new(handler));
        self
    }

    /// Report a different dialect.
    pub fn dialect(mut self, dialect: DatabaseType) -> Self {
        Arc::make_mut(&mut self.script).dialect = dialect;
        self
    }

    /// Every statement dispatched so far, in dispatch order.
    pub fn dispatched(&self) -> Vec<RecordedQuery> {
        self.log.queries.lock().clone()
    }

    /// Tables read by dispatched statements, in dispatch order.
    pub fn dispatched_tables(&self) -> Vec<String> {
        self.log.queries.lock().iter().map(|q| q.table.clone()).collect()
    }

    /// Number of dispatched statements.
    pub fn dispatch_count(&self) -> usize {
        self.log.queries.lock().len()
    }

    /// `BEGIN`/`COMMIT`/`ROLLBACK` events, in order.
    pub fn transactions(&self) -> Vec<&'static str> {
        self.log.transactions.lock().clone()
    }

    /// Number of connections handed out.
    pub fn acquired(&self) -> usize {
        self.log.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for ScriptedPool {
    type Connection = ScriptedConnection;

    async fn acquire(&self) -> QueryResult<ScriptedConnection> {
        self.log.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedConnection {
            script: Arc::clone(&self.script),
            log: Arc::clone(&self.log),
        })
    }

    fn dialect(&self) -> DatabaseType {
        self.script.dialect
    }
}

/// Connection handed out by [`ScriptedPool`].
pub struct ScriptedConnection {
    script: Arc<Script>,
    log: Arc<Log>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn query(&mut self, sql: &str, params: &[FilterValue]) -> QueryResult<Vec<Row>> {
        let query = RecordedQuery::new(sql, params);
        self.log.queries.lock().push(query.clone());
        if let Some(delay) = self.script.delays.get(&query.table) {
            tokio::time::sleep(*delay).await;
        }
        self.script.respond(&query)
    }

    async fn begin(&mut self) -> QueryResult<()> {
        self.log.transactions.lock().push("BEGIN");
        Ok(())
    }

    async fn commit(&mut self) -> QueryResult<()> {
        self.log.transactions.lock().push("COMMIT");
        Ok(())
    }

    async fn rollback(&mut self) -> QueryResult<()> {
        self.log.transactions.lock().push("ROLLBACK");
        Ok(())
    }
}
