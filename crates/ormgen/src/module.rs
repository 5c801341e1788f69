//! Generated per-entity modules.
//!
//! An [`EntityModule`] bundles everything generated for one entity: its
//! table, the row mapper and the INSERT/UPDATE/eager SELECT routines. It
//! borrows the [`Generated`](crate::Generated) output it came from.

use asupersync::{Cx, Outcome};
use ormgen_core::{
    Connection, Dialect, Entity, EntityDescriptor, EntityId, Error, IdentityKey, Metamodel,
    Result, Row, SchemaError, SchemaErrorKind, Value,
};
use ormgen_query::{
    EagerLoader, EagerQuery, Entities, EntityMapper, FetchPlan, InsertBuilder, Predicate,
    UpdateBuilder, group_rows,
};
use ormgen_schema::TableDescriptor;
use std::borrow::Borrow;
use tracing::debug;

/// Row mapping and CRUD routines for one entity.
#[derive(Debug, Clone, Copy)]
pub struct EntityModule<'g> {
    model: &'g Metamodel,
    id: EntityId,
    table: &'g TableDescriptor,
    dialect: Dialect,
}

impl<'g> EntityModule<'g> {
    pub(crate) fn new(
        model: &'g Metamodel,
        id: EntityId,
        table: &'g TableDescriptor,
        dialect: Dialect,
    ) -> Self {
        Self {
            model,
            id,
            table,
            dialect,
        }
    }

    pub fn descriptor(&self) -> &'g EntityDescriptor {
        self.model.entity(self.id)
    }

    pub fn table(&self) -> &'g TableDescriptor {
        self.table
    }

    fn mapper(&self) -> EntityMapper<'g> {
        EntityMapper::new(self.model, self.id)
    }

    /// Insert `entity` and return a copy carrying any generated identifier.
    pub async fn insert<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        entity: &Entity,
    ) -> Outcome<Entity, Error> {
        InsertBuilder::new(self.model, self.id)
            .execute(cx, conn, entity)
            .await
    }

    /// Update the rows matched by `predicate` with `entity`'s non-key columns.
    pub async fn update<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        predicate: &Predicate,
        entity: &Entity,
    ) -> Outcome<u64, Error> {
        UpdateBuilder::new(self.model, self.id)
            .execute(cx, conn, predicate, entity)
            .await
    }

    /// Update the row whose identifier matches `entity`'s.
    pub async fn update_by_identity<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        entity: &Entity,
    ) -> Outcome<u64, Error> {
        let builder = UpdateBuilder::new(self.model, self.id);
        let predicate = match builder.identity_predicate(entity) {
            Ok(p) => p,
            Err(e) => return Outcome::Err(e),
        };
        builder.execute(cx, conn, &predicate, entity).await
    }

    /// Map one plain row (unaliased column names).
    #[allow(clippy::result_large_err)]
    pub fn from_row(&self, row: &Row) -> Result<Entity> {
        self.mapper().from_row(row)
    }

    /// Map plain rows, coalescing rows that share an identifier.
    #[allow(clippy::result_large_err)]
    pub fn from_rows<I>(&self, rows: I) -> Result<Entities>
    where
        I: IntoIterator,
        I::Item: Borrow<Row>,
    {
        group_rows(self.model, &FetchPlan::flat(self.id), rows)
    }

    /// Group rows produced by an eager query built from this module.
    #[allow(clippy::result_large_err)]
    pub fn from_eager_rows<I>(&self, query: &EagerQuery, rows: I) -> Result<Entities>
    where
        I: IntoIterator,
        I::Item: Borrow<Row>,
    {
        let root = query.plan.root().entity;
        if root != self.id {
            let other = &self.model.entity(root).name;
            return Err(Error::Schema(
                SchemaError::new(
                    SchemaErrorKind::InvalidIncludePath,
                    format!("eager query is rooted at {other}"),
                )
                .entity(&self.descriptor().name),
            ));
        }
        group_rows(self.model, &query.plan, rows)
    }

    #[allow(clippy::result_large_err)]
    pub fn to_column_assignments(&self, entity: &Entity) -> Result<Vec<(String, Value)>> {
        self.mapper().to_column_assignments(entity)
    }

    pub fn identity_of(&self, entity: &Entity) -> IdentityKey {
        self.mapper().identity_of(entity)
    }

    /// Compile `loader` into a joined SELECT in the configured dialect.
    #[allow(clippy::result_large_err)]
    pub fn select_eager(&self, loader: &EagerLoader) -> Result<EagerQuery> {
        loader.build(self.model, self.id, self.dialect)
    }

    /// Run `loader`'s SELECT through `conn` and group the result.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = %self.descriptor().name))]
    pub async fn fetch_eager<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        loader: &EagerLoader,
    ) -> Outcome<Vec<Entity>, Error> {
        let query = match loader.build(self.model, self.id, conn.dialect()) {
            Ok(q) => q,
            Err(e) => return Outcome::Err(e),
        };
        let rows = match conn.query(cx, &query.sql, &query.params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        debug!(rows = rows.len(), "Grouping eager rows");
        match group_rows(self.model, &query.plan, &rows) {
            Ok(entities) => Outcome::Ok(entities.collect()),
            Err(e) => Outcome::Err(e),
        }
    }
}
