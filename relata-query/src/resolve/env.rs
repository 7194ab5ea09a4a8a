//! Resolution environments.
//!
//! One environment exists per node of the include tree, plus the root. All
//! environments of a request share a [`SharedConnection`]: the request's
//! single connection behind an async mutex, and a cancellation token.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{MutexGuard, watch};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::id::ResourceId;
use crate::query_spec::QuerySpec;
use crate::relations::{Cardinality, IncludeTree, LinkageMap, Projection};
use crate::row::Row;
use crate::schema::{CollectionId, RelationshipId, SchemaRegistry};
use crate::types::OrderBy;

/// The request's connection and cancellation token.
pub struct SharedConnection<C> {
    conn: tokio::sync::Mutex<C>,
    cancel: CancellationToken,
}

impl<C> SharedConnection<C> {
    /// Wrap a freshly acquired connection.
    pub fn new(conn: C) -> Self {
        Self {
            conn: tokio::sync::Mutex::new(conn),
            cancel: CancellationToken::new(),
        }
    }

    /// Take the connection lock.
    ///
    /// Returns `Cancelled` instead of the guard once the request has been
    /// cancelled, including when cancellation happens while waiting.
    pub async fn lock(&self) -> QueryResult<MutexGuard<'_, C>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueryError::cancelled()),
            guard = self.conn.lock() => {
                if self.cancel.is_cancelled() {
                    Err(QueryError::cancelled())
                } else {
                    Ok(guard)
                }
            }
        }
    }

    /// Take the connection lock regardless of cancellation.
    pub async fn lock_uncancellable(&self) -> MutexGuard<'_, C> {
        self.conn.lock().await
    }

    /// Cancel every pending fetch of the request.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            warn!("Cancelling request");
            self.cancel.cancel();
        }
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<C> fmt::Debug for SharedConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnection")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Lifecycle of an environment. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvState {
    /// Allocated, nothing issued.
    Created,
    /// Fetch started.
    Running,
    /// Data stored.
    Completed,
    /// The fetch itself failed.
    Failed,
    /// Aborted because another fetch failed.
    Cancelled,
}

impl EnvState {
    /// Whether the state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal transition from this state.
    pub fn can_transition_to(&self, next: EnvState) -> bool {
        match self {
            Self::Created => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// What an environment fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvTarget {
    /// A resource of a collection by primary key.
    Primary,
    /// The related rows of a relationship.
    Related(RelationshipId),
}

/// Fetched rows.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvData {
    /// At most one row.
    ToOne(Option<Row>),
    /// Rows keyed by primary key, in arrival order.
    ToMany(IndexMap<ResourceId, Row>),
}

impl EnvData {
    fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::ToOne => Self::ToOne(None),
            Cardinality::ToMany => Self::ToMany(IndexMap::new()),
        }
    }

    /// Stored rows in order.
    pub fn rows(&self) -> Vec<&Row> {
        match self {
            Self::ToOne(row) => row.iter().collect(),
            Self::ToMany(rows) => rows.values().collect(),
        }
    }
}

/// Per-node execution context of one request.
pub struct ResolutionEnvironment<C> {
    target: EnvTarget,
    collection: CollectionId,
    projection: Projection,
    filter: Filter,
    sort: Option<OrderBy>,
    shared: Arc<SharedConnection<C>>,
    state: watch::Sender<EnvState>,
    data: Mutex<EnvData>,
    linked: Vec<RelationshipId>,
    linkage: Mutex<IndexMap<RelationshipId, LinkageMap>>,
    children: Vec<Arc<ResolutionEnvironment<C>>>,
}

/// How the root of a tree is built.
#[derive(Debug, Clone, Copy)]
pub struct RootPlan {
    /// What the root fetches.
    pub target: EnvTarget,
    /// Collection of the root's rows.
    pub collection: CollectionId,
    /// Cardinality of the root's data.
    pub cardinality: Cardinality,
    /// Select only primary keys.
    pub key_only: bool,
    /// Apply the query filter and sort to the root fetch.
    pub filtered: bool,
}

impl<C> ResolutionEnvironment<C> {
    /// Build the environment tree for a request.
    pub fn tree(
        schema: &SchemaRegistry,
        spec: &QuerySpec,
        root: RootPlan,
        include: &IncludeTree,
        shared: &Arc<SharedConnection<C>>,
    ) -> Arc<Self> {
        let children = Self::build_children(schema, spec, root.collection, include, shared);
        let coll = schema.collection(root.collection);
        let projection = if root.key_only {
            Projection::key_only(coll)
        } else {
            Projection::new(
                schema,
                root.collection,
                spec.fieldset(&coll.name),
                &child_local_keys(schema, include),
            )
        };
        let (filter, sort) = if root.filtered && root.cardinality.is_many() {
            (spec.filter.clone(), spec.sort.clone())
        } else {
            (Filter::None, None)
        };
        let linked = if root.key_only {
            Vec::new()
        } else {
            linked_relationships(schema, spec, root.collection)
        };
        Arc::new(Self::new(
            root.target,
            root.collection,
            root.cardinality,
            projection,
            filter,
            sort,
            shared,
            linked,
            children,
        ))
    }

    fn build_children(
        schema: &SchemaRegistry,
        spec: &QuerySpec,
        collection: CollectionId,
        include: &IncludeTree,
        shared: &Arc<SharedConnection<C>>,
    ) -> Vec<Arc<Self>> {
        debug_assert!(include.iter().all(|(id, _)| schema.relationship(id).owner == collection));
        include
            .iter()
            .map(|(rel_id, subtree)| {
                let related = schema.relationship(rel_id).related;
                let projection = Projection::new(
                    schema,
                    related,
                    spec.fieldset(&schema.collection(related).name),
                    &child_local_keys(schema, subtree),
                );
                let children = Self::build_children(schema, spec, related, subtree, shared);
                // Included data always spans many owners.
                Arc::new(Self::new(
                    EnvTarget::Related(rel_id),
                    related,
                    Cardinality::ToMany,
                    projection,
                    Filter::None,
                    None,
                    shared,
                    linked_relationships(schema, spec, related),
                    children,
                ))
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        target: EnvTarget,
        collection: CollectionId,
        cardinality: Cardinality,
        projection: Projection,
        filter: Filter,
        sort: Option<OrderBy>,
        shared: &Arc<SharedConnection<C>>,
        linked: Vec<RelationshipId>,
        children: Vec<Arc<Self>>,
    ) -> Self {
        let (state, _) = watch::channel(EnvState::Created);
        Self {
            target,
            collection,
            projection,
            filter,
            sort,
            shared: Arc::clone(shared),
            state,
            data: Mutex::new(EnvData::empty(cardinality)),
            linked,
            linkage: Mutex::new(IndexMap::new()),
            children,
        }
    }

    /// What this environment fetches.
    pub fn target(&self) -> EnvTarget {
        self.target
    }

    /// Collection of the fetched rows.
    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    /// Columns to select.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Row filter for the fetch.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Ordering for the fetch.
    pub fn sort(&self) -> Option<&OrderBy> {
        self.sort.as_ref()
    }

    /// The request's shared connection.
    pub fn shared(&self) -> &Arc<SharedConnection<C>> {
        &self.shared
    }

    /// Relationships keyed on the related side whose linkage is rendered
    /// on this environment's resources.
    pub fn linked(&self) -> &[RelationshipId] {
        &self.linked
    }

    /// Store the linkage of `relationship`.
    pub fn set_linkage(&self, relationship: RelationshipId, linkage: LinkageMap) {
        self.linkage.lock().insert(relationship, linkage);
    }

    /// Related ids of `relationship` for the row keyed `owner`.
    ///
    /// `None` until the linkage has been stored.
    pub fn linkage(
        &self,
        relationship: RelationshipId,
        owner: &ResourceId,
    ) -> Option<Vec<ResourceId>> {
        self.linkage
            .lock()
            .get(&relationship)
            .map(|by_owner| by_owner.get(owner).cloned().unwrap_or_default())
    }

    /// Environments for nested includes.
    pub fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    /// Current state.
    pub fn state(&self) -> EnvState {
        *self.state.borrow()
    }

    /// Move to `next`; returns whether the transition happened.
    pub fn transition(&self, next: EnvState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            trace!(target_env = ?self.target, state = ?next, "Environment transition");
        }
        changed
    }

    /// Store fetched rows and complete.
    ///
    /// To-many data keeps the first row seen for each id.
    pub fn complete(&self, rows: Vec<Row>, primary_key: &str) {
        {
            let mut data = self.data.lock();
            match &mut *data {
                EnvData::ToOne(slot) => *slot = rows.into_iter().next(),
                EnvData::ToMany(map) => {
                    for row in rows {
                        if let Some(id) = row.id(primary_key) {
                            map.entry(id).or_insert(row);
                        }
                    }
                }
            }
        }
        self.transition(EnvState::Completed);
    }

    /// Wait until the environment reaches a terminal state.
    pub async fn completed(&self) -> EnvState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(EnvState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Run `f` on the stored data.
    pub fn with_data<R>(&self, f: impl FnOnce(&EnvData) -> R) -> R {
        f(&self.data.lock())
    }

    /// Primary keys of the stored rows, in order.
    pub fn ids(&self, primary_key: &str) -> Vec<ResourceId> {
        self.with_data(|data| {
            data.rows()
                .into_iter()
                .filter_map(|row| row.id(primary_key))
                .collect()
        })
    }

    /// A copy of the stored rows in order.
    pub fn rows(&self) -> Vec<Row> {
        self.with_data(|data| data.rows().into_iter().cloned().collect())
    }

    /// Cancel this environment and every descendant that is not yet final.
    pub fn cancel_pending(&self) {
        self.transition(EnvState::Cancelled);
        for child in &self.children {
            child.cancel_pending();
        }
    }

    /// Visit this environment and all descendants, depth-first.
    pub fn walk<'a>(self: &'a Arc<Self>, visit: &mut impl FnMut(&'a Arc<Self>)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

impl<C> fmt::Debug for ResolutionEnvironment<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionEnvironment")
            .field("target", &self.target)
            .field("collection", &self.collection)
            .field("state", &self.state())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Remote, one-to-many and many-to-many relationships of `collection`
/// that the fieldset shows.
fn linked_relationships(
    schema: &SchemaRegistry,
    spec: &QuerySpec,
    collection: CollectionId,
) -> Vec<RelationshipId> {
    let coll = schema.collection(collection);
    let fieldset = spec.fieldset(&coll.name);
    coll.relationships()
        .filter(|(name, _)| fieldset.is_none_or(|fields| fields.iter().any(|f| f == *name)))
        .filter(|(_, id)| schema.relationship(*id).kind.local_key().is_none())
        .map(|(_, id)| id)
        .collect()
}

fn child_local_keys<'s>(schema: &'s SchemaRegistry, include: &IncludeTree) -> Vec<&'s str> {
    include
        .iter()
        .filter_map(|(rel_id, _)| schema.relationship(rel_id).kind.local_key())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDef, RelationshipDef};
    use crate::testing::row;
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::builder()
            .collection(CollectionDef::new("people").columns(["id", "name"]))
            .collection(CollectionDef::new("articles").columns(["id", "title", "author_id"]))
            .relationship(RelationshipDef::many_to_one("articles", "author", "people", "author_id"))
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
    fn test_state_transitions_are_one_way() {
        assert!(EnvState::Created.can_transition_to(EnvState::Running));
        assert!(EnvState::Created.can_transition_to(EnvState::Cancelled));
        assert!(!EnvState::Created.can_transition_to(EnvState::Completed));
        assert!(EnvState::Running.can_transition_to(EnvState::Failed));
        assert!(!EnvState::Running.can_transition_to(EnvState::Created));
        assert!(!EnvState::Completed.can_transition_to(EnvState::Running));
        assert!(!EnvState::Cancelled.can_transition_to(EnvState::Completed));
    }

    #[tokio::test]
    async fn test_tree_and_completion() {
        let schema = schema();
        let people = schema.collection_id("people").unwrap();
        let include = IncludeTree::parse(&schema, people, &["articles.author"], 3).unwrap();
        let shared = Arc::new(SharedConnection::new(()));
        let spec = QuerySpec::new().fields("people", ["name"]);

        let root = ResolutionEnvironment::tree(
            &schema,
            &spec,
            RootPlan {
                target: EnvTarget::Primary,
                collection: people,
                cardinality: Cardinality::ToOne,
                key_only: false,
                filtered: false,
            },
            &include,
            &shared,
        );
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.projection().columns(), ["id", "name"]);

        let articles = &root.children()[0];
        assert_eq!(articles.projection().columns(), ["id", "title", "author_id"]);
        assert_eq!(articles.children().len(), 1);

        assert!(articles.transition(EnvState::Running));
        articles.complete(
            vec![
                row(json!({"id": 1, "author_id": 4})),
                row(json!({"id": 2, "author_id": 4})),
                row(json!({"id": 1, "author_id": 5})),
            ],
            "id",
        );
        assert_eq!(articles.completed().await, EnvState::Completed);
        assert_eq!(articles.rows().len(), 2);
        assert_eq!(articles.rows()[0].get("author_id"), Some(&json!(4)));

        root.cancel_pending();
        assert_eq!(root.state(), EnvState::Cancelled);
        assert_eq!(articles.state(), EnvState::Completed);
        assert_eq!(articles.children()[0].state(), EnvState::Cancelled);
    }

    #[test]
    fn test_linked_relationships_follow_fieldsets() {
        let schema = schema();
        let people = schema.collection_id("people").unwrap();
        let articles = schema.relationship_id(people, "articles").unwrap();
        let shared = Arc::new(SharedConnection::new(()));
        let plan = |key_only| RootPlan {
            target: EnvTarget::Primary,
            collection: people,
            cardinality: Cardinality::ToOne,
            key_only,
            filtered: false,
        };
        let tree = |spec: &QuerySpec, key_only| {
            ResolutionEnvironment::tree(&schema, spec, plan(key_only), &IncludeTree::new(), &shared)
        };

        assert_eq!(tree(&QuerySpec::new(), false).linked(), [articles]);
        let spec = QuerySpec::new().fields("people", ["articles"]);
        assert_eq!(tree(&spec, false).linked(), [articles]);
        assert!(tree(&QuerySpec::new().fields("people", ["name"]), false).linked().is_empty());
        assert!(tree(&QuerySpec::new(), true).linked().is_empty());

        let root = tree(&QuerySpec::new(), false);
        assert_eq!(root.linkage(articles, &ResourceId::Int(1)), None);
        let stored = [(ResourceId::Int(1), vec![ResourceId::Int(7)])];
        root.set_linkage(articles, stored.into_iter().collect());
        assert_eq!(root.linkage(articles, &ResourceId::Int(1)), Some(vec![ResourceId::Int(7)]));
        assert_eq!(root.linkage(articles, &ResourceId::Int(2)), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_lock_after_cancel() {
        let shared = SharedConnection::new(0u8);
        assert!(shared.lock().await.is_ok());
        shared.cancel();
        assert!(shared.lock().await.unwrap_err().is_cancelled());
        assert_eq!(*shared.lock_uncancellable().await, 0);
    }
}
