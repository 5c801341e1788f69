//! Entity descriptors.
//!
//! An [`EntityDescriptor`] is the typed model of one declaration: its table,
//! scalar columns, identifier and (once resolved) associations. Descriptors
//! are built once and are read-only inputs to every downstream generator.

use crate::declaration::AssociationKind;
use crate::field::ColumnDescriptor;
use crate::relationship::AssociationDescriptor;
use serde::Serialize;

/// Position of an entity in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(pub usize);

/// How an entity is identified.
#[derive(Debug, Clone)]
pub enum IdentifierDescriptor {
    /// Surrogate assigned by the database; omitted from INSERT.
    Generated(ColumnDescriptor),
    Natural(ColumnDescriptor),
    /// Two or more components, in key order.
    Composite(Vec<ColumnDescriptor>),
    /// Single column whose domain value passes through a converter.
    Converted(ColumnDescriptor),
    /// Pure association container keyed by its many-to-one foreign keys,
    /// named by field in declaration order.
    AssociationKey(Vec<String>),
}

impl IdentifierDescriptor {
    pub fn is_generated(&self) -> bool {
        matches!(self, IdentifierDescriptor::Generated(_))
    }

    /// Columns the identifier declares itself (none for association keys).
    pub fn own_columns(&self) -> &[ColumnDescriptor] {
        match self {
            IdentifierDescriptor::Generated(c)
            | IdentifierDescriptor::Natural(c)
            | IdentifierDescriptor::Converted(c) => std::slice::from_ref(c),
            IdentifierDescriptor::Composite(cs) => cs,
            IdentifierDescriptor::AssociationKey(_) => &[],
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            IdentifierDescriptor::Generated(_) => "generated",
            IdentifierDescriptor::Natural(_) => "natural",
            IdentifierDescriptor::Composite(_) => "composite",
            IdentifierDescriptor::Converted(_) => "converted",
            IdentifierDescriptor::AssociationKey(_) => "association key",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub id: EntityId,
    /// Logical name.
    pub name: String,
    pub table: String,
    pub identifier: IdentifierDescriptor,
    /// Non-identifier, non-association columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    /// Filled in by the association resolver.
    pub associations: Vec<AssociationDescriptor>,
}

impl EntityDescriptor {
    pub fn association(&self, field: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.field == field)
    }

    pub fn column(&self, field: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Many-to-one associations in declaration order.
    pub fn many_to_ones(&self) -> impl Iterator<Item = &AssociationDescriptor> {
        self.associations
            .iter()
            .filter(|a| a.kind == AssociationKind::ManyToOne)
    }

    /// Whether a many-to-one field is part of the identifier.
    pub fn is_key_association(&self, field: &str) -> bool {
        match &self.identifier {
            IdentifierDescriptor::AssociationKey(fields) => fields.iter().any(|f| f == field),
            _ => false,
        }
    }

    /// Identifier columns in key order.
    pub fn key_columns(&self) -> Vec<&ColumnDescriptor> {
        match &self.identifier {
            IdentifierDescriptor::AssociationKey(fields) => fields
                .iter()
                .filter_map(|f| self.association(f))
                .filter_map(|a| a.foreign_key())
                .flat_map(|fk| fk.columns.iter().map(|c| &c.column))
                .collect(),
            other => other.own_columns().iter().collect(),
        }
    }

    /// Foreign-key columns of non-key many-to-one associations.
    pub fn reference_columns(&self) -> Vec<&ColumnDescriptor> {
        self.many_to_ones()
            .filter(|a| !self.is_key_association(&a.field))
            .filter_map(|a| a.foreign_key())
            .flat_map(|fk| fk.columns.iter().map(|c| &c.column))
            .collect()
    }

    /// Every physical column of the entity table: identifier, scalar
    /// columns, then remaining foreign-key columns.
    pub fn table_columns(&self) -> Vec<&ColumnDescriptor> {
        let mut all = self.key_columns();
        all.extend(self.columns.iter());
        all.extend(self.reference_columns());
        all
    }
}
