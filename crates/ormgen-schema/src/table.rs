//! Table descriptors.
//!
//! One [`TableDescriptor`] per entity and one per many-to-many join table.
//! Columns carry physical SQL types only; converted domain types never reach
//! this layer.

use ormgen_core::{
    AssociationKind, ColumnDescriptor, EntityDescriptor, EntityId, ForeignKeyDescriptor,
    JoinTableDescriptor, SqlType,
};
use serde::Serialize;

/// Where a table came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TableSource {
    Entity(EntityId),
    /// Synthesized for a many-to-many association.
    JoinTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub name: String,
    pub sql_type: SqlType,
    /// Explicit DDL type text, used verbatim.
    pub type_override: Option<String>,
    pub nullable: bool,
    pub default: Option<String>,
    pub unique: bool,
    /// Value assigned by the database on insert.
    pub generated: bool,
}

impl TableColumn {
    fn from_descriptor(col: &ColumnDescriptor) -> Self {
        Self {
            name: col.column.clone(),
            sql_type: col.sql_type().clone(),
            type_override: col.type_override.clone(),
            nullable: col.is_nullable(),
            default: col.default.clone(),
            unique: col.unique,
            generated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyConstraint {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub nullable: bool,
    /// The referenced table is created later; the constraint must be added
    /// after both tables exist.
    pub deferred: bool,
}

impl ForeignKeyConstraint {
    fn from_descriptor(fk: &ForeignKeyDescriptor) -> Self {
        Self {
            columns: fk.column_names().map(str::to_string).collect(),
            referenced_table: fk.referenced_table.clone(),
            referenced_columns: fk.referenced_columns().map(str::to_string).collect(),
            nullable: fk.nullable,
            deferred: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<TableColumn>,
    /// Primary key columns in key order; never empty.
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    pub source: TableSource,
}

impl TableDescriptor {
    /// Table for an entity: identifier, scalar columns, foreign keys.
    pub fn for_entity(entity: &EntityDescriptor) -> Self {
        let generated = entity.identifier.is_generated();
        let key = entity.key_columns();
        let columns = entity
            .table_columns()
            .into_iter()
            .map(|col| {
                let mut column = TableColumn::from_descriptor(col);
                column.generated = generated && key.iter().any(|k| k.column == col.column);
                column
            })
            .collect();
        let foreign_keys = entity
            .associations
            .iter()
            .filter(|a| a.kind == AssociationKind::ManyToOne)
            .filter_map(|a| a.foreign_key())
            .map(|fk| ForeignKeyConstraint::from_descriptor(fk))
            .collect();

        Self {
            name: entity.table.clone(),
            columns,
            primary_key: key.iter().map(|c| c.column.clone()).collect(),
            foreign_keys,
            source: TableSource::Entity(entity.id),
        }
    }

    /// Join table: both keys, which together form the primary key.
    pub fn for_join_table(join: &JoinTableDescriptor) -> Self {
        let sides = [&join.owner, &join.target];
        let columns = sides
            .iter()
            .flat_map(|fk| fk.columns.iter())
            .map(|c| TableColumn::from_descriptor(&c.column))
            .collect();
        let primary_key = sides
            .iter()
            .flat_map(|fk| fk.column_names())
            .map(str::to_string)
            .collect();
        Self {
            name: join.name.clone(),
            columns,
            primary_key,
            foreign_keys: sides
                .iter()
                .map(|fk| ForeignKeyConstraint::from_descriptor(fk))
                .collect(),
            source: TableSource::JoinTable,
        }
    }

    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}
