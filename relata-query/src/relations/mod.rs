//! Relationship descriptors, include trees and fetch strategies.

mod fetch;
mod include;
mod spec;

pub use fetch::{
    FetchKeys, FetchOptions, LinkageMap, PrimaryFetcher, Projection, ResourceFetcher, Statement,
};
pub use include::IncludeTree;
pub use spec::{Cardinality, JoinTableSpec, Relationship, RelationshipKind};
