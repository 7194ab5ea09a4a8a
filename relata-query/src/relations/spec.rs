//! Relationship descriptors.

use crate::schema::CollectionId;

/// Whether a relationship yields at most one or many related resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// A single related resource or null.
    ToOne,
    /// A collection of related resources.
    ToMany,
}

impl Cardinality {
    /// Check if this relationship returns multiple records.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::ToMany)
    }
}

/// Association table of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableSpec {
    /// Name of the association table.
    pub table_name: String,
    /// Column referencing the owning collection's primary key.
    pub source_column: String,
    /// Column referencing the related collection's primary key.
    pub target_column: String,
}

impl JoinTableSpec {
    /// Create a new join table spec.
    pub fn new(
        table_name: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }

    /// The same association seen from the related side.
    pub fn reversed(&self) -> Self {
        Self::new(&self.table_name, &self.target_column, &self.source_column)
    }
}

/// The five relationship variants and the keys each one carries.
///
/// Local keys live on the owning collection's table, remote keys on the
/// related collection's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One-to-one, foreign key on the owner.
    OneToOneLocal {
        /// Owner column holding the related primary key.
        local_key: String,
    },
    /// One-to-one, foreign key on the related table.
    OneToOneRemote {
        /// Related column holding the owner primary key.
        remote_key: String,
    },
    /// Many-to-one, foreign key on the owner.
    ManyToOne {
        /// Owner column holding the related primary key.
        local_key: String,
    },
    /// One-to-many, foreign key on the related table.
    OneToMany {
        /// Related column holding the owner primary key.
        remote_key: String,
    },
    /// Many-to-many through an association table.
    ManyToMany {
        /// The association table and its two keys.
        association: JoinTableSpec,
    },
}

impl RelationshipKind {
    /// Cardinality fixed by the variant.
    pub fn cardinality(&self) -> Cardinality {
        match self {
            Self::OneToOneLocal { .. } | Self::OneToOneRemote { .. } | Self::ManyToOne { .. } => {
                Cardinality::ToOne
            }
            Self::OneToMany { .. } | Self::ManyToMany { .. } => Cardinality::ToMany,
        }
    }

    /// The owner column carrying the foreign key, for local variants.
    pub fn local_key(&self) -> Option<&str> {
        match self {
            Self::OneToOneLocal { local_key } | Self::ManyToOne { local_key } => Some(local_key),
            _ => None,
        }
    }

    /// The related column carrying the foreign key, for remote variants.
    pub fn remote_key(&self) -> Option<&str> {
        match self {
            Self::OneToOneRemote { remote_key } | Self::OneToMany { remote_key } => {
                Some(remote_key)
            }
            _ => None,
        }
    }

    /// Variant name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OneToOneLocal { .. } => "one_to_one_local",
            Self::OneToOneRemote { .. } => "one_to_one_remote",
            Self::ManyToOne { .. } => "many_to_one",
            Self::OneToMany { .. } => "one_to_many",
            Self::ManyToMany { .. } => "many_to_many",
        }
    }
}

/// Static metadata for one named relationship of a collection.
///
/// Collections are referenced by registry handle, never by pointer, so a
/// pair of inverse relationships forms no reference cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Name of the relationship on its owning collection.
    pub name: String,
    /// Owning collection.
    pub owner: CollectionId,
    /// Related collection.
    pub related: CollectionId,
    /// Variant and keys.
    pub kind: RelationshipKind,
}

impl Relationship {
    /// Cardinality of the relationship.
    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }

    /// Whether this relationship is to-many.
    pub fn is_to_many(&self) -> bool {
        self.cardinality().is_many()
    }
}
