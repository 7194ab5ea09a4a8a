//! Concurrent execution of an environment tree.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{QueryError, QueryResult};
use crate::relations::{FetchKeys, FetchOptions, PrimaryFetcher, ResourceFetcher};
use crate::row::Row;
use crate::schema::{RelationshipId, SchemaRegistry};
use crate::sql::DatabaseType;
use crate::traits::Connection;

use super::env::{EnvState, EnvTarget, ResolutionEnvironment, SharedConnection};

type Env<C> = ResolutionEnvironment<C>;

/// Runs every fetch of one request on its shared connection.
///
/// Fetches are scheduled as a tree of futures joined with
/// `try_join_all`; each takes the connection lock for exactly one fetch.
/// Linkage fetches run next to them, each waiting for its environment to
/// complete before reading the environment's keys. The first failing fetch
/// records its error and cancels the request before it releases the lock,
/// so no statement is dispatched after a failure has been observed.
pub struct TaskOrchestrator<'a, C> {
    schema: &'a SchemaRegistry,
    shared: Arc<SharedConnection<C>>,
    dialect: DatabaseType,
    timeout: Option<Duration>,
    first_error: Mutex<Option<QueryError>>,
}

impl<'a, C> TaskOrchestrator<'a, C>
where
    C: Connection + 'static,
{
    /// Create an orchestrator for one request.
    pub fn new(
        schema: &'a SchemaRegistry,
        shared: Arc<SharedConnection<C>>,
        dialect: DatabaseType,
    ) -> Self {
        Self {
            schema,
            shared,
            dialect,
            timeout: None,
            first_error: Mutex::new(None),
        }
    }

    /// Cancel the whole request after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the tree rooted at `root`, keyed on `keys`, inside one
    /// transaction.
    ///
    /// Returns the first error observed; environments left unfinished are
    /// marked cancelled.
    #[instrument(level = "debug", skip_all)]
    pub async fn run(&self, root: &Arc<Env<C>>, keys: FetchKeys) -> QueryResult<()> {
        self.shared.lock_uncancellable().await.begin().await?;

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.drive_all(root, keys)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    let err = QueryError::timeout(millis);
                    self.record_failure(&err);
                    Err(err)
                }
            },
            None => self.drive_all(root, keys).await,
        };

        match outcome {
            Ok(()) => {
                self.shared.lock_uncancellable().await.commit().await?;
                debug!(environments = count(root), "Resolution finished");
                Ok(())
            }
            Err(err) => {
                root.cancel_pending();
                let first = self.first_error.lock().take().unwrap_or(err);
                if let Err(rollback) = self.shared.lock_uncancellable().await.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(first)
            }
        }
    }

    async fn drive_all(&self, root: &Arc<Env<C>>, keys: FetchKeys) -> QueryResult<()> {
        let mut linkage = Vec::new();
        root.walk(&mut |env| {
            for &relationship in env.linked() {
                linkage.push(self.link_env(Arc::clone(env), relationship));
            }
        });
        futures::try_join!(self.drive(root, keys), try_join_all(linkage))?;
        Ok(())
    }

    async fn drive(&self, root: &Arc<Env<C>>, keys: FetchKeys) -> QueryResult<()> {
        let id = match (&keys, root.target()) {
            (FetchKeys::Request(id), EnvTarget::Primary) => id.clone(),
            _ => return self.run_env(Arc::clone(root), keys).await,
        };

        // Remote and many-to-many children only need the request id, so
        // they start alongside the root fetch. Local children need the
        // foreign keys stored on the root row.
        let (eager, late): (Vec<_>, Vec<_>) = root
            .children()
            .iter()
            .cloned()
            .partition(|child| self.keyed_on_owner(child));
        let owners = FetchKeys::Owners(vec![id]);

        let root_branch = async {
            self.fetch_env(root, &keys).await?;
            self.run_children(root, &late).await
        };
        let eager_branch = try_join_all(
            eager
                .into_iter()
                .map(|child| self.run_env(child, owners.clone())),
        );
        futures::try_join!(root_branch, eager_branch)?;
        Ok(())
    }

    fn run_env(&self, env: Arc<Env<C>>, keys: FetchKeys) -> BoxFuture<'_, QueryResult<()>> {
        async move {
            self.fetch_env(&env, &keys).await?;
            self.run_children(&env, env.children()).await
        }
        .boxed()
    }

    async fn run_children(&self, parent: &Env<C>, children: &[Arc<Env<C>>]) -> QueryResult<()> {
        if children.is_empty() {
            return Ok(());
        }
        let rows = parent.rows();
        try_join_all(children.iter().map(|child| {
            let keys = self.child_keys(child, &rows);
            self.run_env(Arc::clone(child), keys)
        }))
        .await?;
        Ok(())
    }

    async fn fetch_env(&self, env: &Env<C>, keys: &FetchKeys) -> QueryResult<()> {
        env.transition(EnvState::Running);
        let primary_key = &self.schema.collection(env.collection()).primary_key;
        if keys.is_empty() {
            env.complete(Vec::new(), primary_key);
            return Ok(());
        }

        let mut conn = match self.shared.lock().await {
            Ok(conn) => conn,
            Err(err) => {
                env.transition(EnvState::Cancelled);
                return Err(err);
            }
        };

        let result = match (env.target(), keys) {
            (EnvTarget::Primary, FetchKeys::Request(id)) => {
                PrimaryFetcher::new(self.schema, env.collection(), self.dialect)
                    .fetch(&mut *conn, id, env.projection())
                    .await
            }
            (EnvTarget::Primary, _) => {
                Err(QueryError::internal("primary fetch requires the request id"))
            }
            (EnvTarget::Related(relationship), keys) => {
                let options = FetchOptions::new(env.projection())
                    .filter(env.filter())
                    .sort(env.sort());
                ResourceFetcher::new(self.schema, relationship, self.dialect)
                    .fetch(&mut *conn, keys, &options)
                    .await
            }
        };

        match result {
            Ok(rows) => {
                drop(conn);
                env.complete(rows, primary_key);
                Ok(())
            }
            Err(err) => {
                // Cancel while still holding the lock.
                self.record_failure(&err);
                drop(conn);
                env.transition(EnvState::Failed);
                Err(err)
            }
        }
    }

    /// Fetch the linkage of `relationship` for every row of `env`.
    async fn link_env(&self, env: Arc<Env<C>>, relationship: RelationshipId) -> QueryResult<()> {
        // A failed or cancelled environment is reported by its own fetch.
        if env.completed().await != EnvState::Completed {
            return Ok(());
        }
        let owners = env.ids(&self.schema.collection(env.collection()).primary_key);
        if owners.is_empty() {
            env.set_linkage(relationship, Default::default());
            return Ok(());
        }

        let mut conn = self.shared.lock().await?;
        let result = ResourceFetcher::new(self.schema, relationship, self.dialect)
            .fetch_linkage(&mut *conn, &owners)
            .await;
        match result {
            Ok(linkage) => {
                drop(conn);
                env.set_linkage(relationship, linkage);
                Ok(())
            }
            Err(err) => {
                self.record_failure(&err);
                drop(conn);
                Err(err)
            }
        }
    }

    fn keyed_on_owner(&self, env: &Env<C>) -> bool {
        match env.target() {
            EnvTarget::Related(relationship) => {
                self.schema.relationship(relationship).kind.local_key().is_none()
            }
            EnvTarget::Primary => false,
        }
    }

    fn child_keys(&self, child: &Env<C>, owner_rows: &[Row]) -> FetchKeys {
        match child.target() {
            EnvTarget::Related(relationship) => {
                ResourceFetcher::new(self.schema, relationship, self.dialect).keys_for(owner_rows)
            }
            EnvTarget::Primary => FetchKeys::Owners(Vec::new()),
        }
    }

    fn record_failure(&self, err: &QueryError) {
        {
            let mut first = self.first_error.lock();
            if first.is_none() {
                warn!(code = %err.code, error = %err, "Fetch failed");
                *first = Some(err.clone());
            }
        }
        self.shared.cancel();
    }
}

fn count<C>(root: &Arc<Env<C>>) -> usize {
    let mut n = 0;
    root.walk(&mut |_| n += 1);
    n
}
