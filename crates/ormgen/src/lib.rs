//! ormgen - entity metamodel and association-aware row mapping generator.
//!
//! Declare entities once, then get:
//!
//! - a resolved metamodel with foreign keys, join tables and inverses
//! - table descriptors and DDL in dependency order
//! - per-entity modules mapping rows to entities (including eager joins
//!   coalesced into nested collections) and entities to INSERT/UPDATE
//!
//! # Quick Start
//!
//! ```ignore
//! use ormgen::prelude::*;
//!
//! let decls = vec![
//!     EntityDecl::new("Customer")
//!         .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
//!         .field(FieldDecl::new("name", SqlType::Text))
//!         .association(AssociationDecl::one_to_many("phones", "Phone").mapped_by("customer")),
//!     EntityDecl::new("Phone")
//!         .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
//!         .field(FieldDecl::new("number", SqlType::Text))
//!         .association(AssociationDecl::many_to_one("customer", "Customer")),
//! ];
//! let generated = generate(&decls, &ConverterRegistry::with_builtins(), &GeneratorConfig::default())?;
//!
//! async fn load(cx: &Cx, conn: &impl Connection, generated: &Generated) {
//!     generated.create_all(cx, conn).await;
//!     let customers = generated.module("Customer").unwrap();
//!     let loaded = customers
//!         .fetch_eager(cx, conn, &EagerLoader::new().include("phones"))
//!         .await;
//! }
//! ```

pub mod config;
pub mod module;

pub use config::GeneratorConfig;
pub use module::EntityModule;

pub use ormgen_core::{
    AssociationDecl, AssociationDescriptor, AssociationKind, ColumnDescriptor, Connection,
    ConversionErrorKind, ConverterDef, ConverterRegistry, Cx, Dialect, Entity, EntityDecl,
    EntityDescriptor, EntityId, Error, FetchMode, FieldDecl, IdentifierDecl, IdentityKey,
    Metamodel, NamingOptions, Outcome, PreconditionErrorKind, Related, Result, Row,
    SchemaErrorKind, SqlType, Value, declarations_from_json,
};
pub use ormgen_query::{EagerLoader, EagerQuery, Entities, FetchPlan, Predicate};
pub use ormgen_schema::{CreationOrder, SchemaBuilder, TableDescriptor, TableSource};

use ormgen_schema::{creation_order, generate_tables};
use tracing::debug;

/// Everything generated from one declaration set.
#[derive(Debug, Clone)]
pub struct Generated {
    metamodel: Metamodel,
    order: CreationOrder,
    tables: Vec<TableDescriptor>,
    config: GeneratorConfig,
}

/// Analyze `decls` and generate tables and entity modules.
///
/// Nothing is produced if any declaration is invalid: the first error is
/// returned, scoped to the entity (and field) it concerns.
#[tracing::instrument(level = "debug", skip_all, fields(entities = decls.len(), dialect = ?config.dialect))]
#[allow(clippy::result_large_err)]
pub fn generate(
    decls: &[EntityDecl],
    registry: &ConverterRegistry,
    config: &GeneratorConfig,
) -> Result<Generated> {
    let metamodel = Metamodel::analyze(decls, registry, &config.naming)?;
    let order = creation_order(&metamodel)?;
    let tables = generate_tables(&metamodel, &order);
    debug!(
        tables = tables.len(),
        deferred = order.deferred.len(),
        "Generation complete"
    );
    Ok(Generated {
        metamodel,
        order,
        tables,
        config: config.clone(),
    })
}

impl Generated {
    pub fn metamodel(&self) -> &Metamodel {
        &self.metamodel
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn creation_order(&self) -> &CreationOrder {
        &self.order
    }

    /// Tables in creation order; join tables last.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Table generated for an entity.
    pub fn table(&self, entity: &str) -> Option<&TableDescriptor> {
        let id = self.metamodel.entity_by_name(entity)?.id;
        self.entity_table(id)
    }

    fn entity_table(&self, id: EntityId) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.source == TableSource::Entity(id))
    }

    /// Module for the entity named `entity`.
    pub fn module(&self, entity: &str) -> Option<EntityModule<'_>> {
        let id = self.metamodel.entity_by_name(entity)?.id;
        self.module_for(id)
    }

    pub fn module_for(&self, id: EntityId) -> Option<EntityModule<'_>> {
        let table = self.entity_table(id)?;
        Some(EntityModule::new(
            &self.metamodel,
            id,
            table,
            self.config.dialect,
        ))
    }

    /// Modules for every entity, in declaration order.
    pub fn modules(&self) -> impl Iterator<Item = EntityModule<'_>> + '_ {
        self.metamodel
            .entities()
            .iter()
            .filter_map(|e| self.module_for(e.id))
    }

    /// CREATE TABLE statements (then deferred constraints) in the configured dialect.
    pub fn create_statements(&self) -> Vec<String> {
        SchemaBuilder::new(self.config.dialect)
            .if_not_exists(self.config.if_not_exists)
            .create_statements(&self.tables)
    }

    pub fn drop_statements(&self) -> Vec<String> {
        SchemaBuilder::new(self.config.dialect).drop_statements(&self.tables)
    }

    /// Create every table through `conn`, in `conn`'s dialect.
    pub async fn create_all<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        ormgen_schema::create_all(cx, conn, &self.tables, self.config.if_not_exists).await
    }

    pub async fn drop_all<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        ormgen_schema::drop_all(cx, conn, &self.tables).await
    }
}

/// Common imports.
pub mod prelude {
    pub use crate::{
        AssociationDecl, Connection, ConverterDef, ConverterRegistry, Cx, Dialect, EagerLoader,
        Entity, EntityDecl, EntityModule, Error, FieldDecl, Generated, GeneratorConfig,
        IdentifierDecl, Outcome, Predicate, Related, Result, Row, SqlType, Value, generate,
    };
}
