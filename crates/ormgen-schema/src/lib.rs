//! Table schema generation for ormgen.
//!
//! This crate provides:
//! - `TableDescriptor`s for entity and join tables
//! - foreign-key dependency ordering with required-cycle detection
//! - CREATE TABLE / DROP TABLE rendering for PostgreSQL, SQLite and MySQL
//! - execution of the ordered DDL through a `Connection`

pub mod create;
pub mod order;
pub mod table;

pub use create::{CreateTable, SchemaBuilder, drop_table_sql};
pub use order::{CreationOrder, creation_order, generate_tables};
pub use table::{ForeignKeyConstraint, TableColumn, TableDescriptor, TableSource};

use asupersync::{Cx, Outcome};
use ormgen_core::{Connection, Error};

/// Create every table, in order, through `conn`.
///
/// `tables` must already be in creation order (see [`generate_tables`]).
/// Deferred foreign keys are added once all tables exist.
#[tracing::instrument(level = "debug", skip_all, fields(tables = tables.len()))]
pub async fn create_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    tables: &[TableDescriptor],
    if_not_exists: bool,
) -> Outcome<(), Error> {
    let statements = SchemaBuilder::new(conn.dialect())
        .if_not_exists(if_not_exists)
        .create_statements(tables);
    execute_all(cx, conn, &statements).await
}

/// Drop every table in reverse creation order.
#[tracing::instrument(level = "debug", skip_all, fields(tables = tables.len()))]
pub async fn drop_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    tables: &[TableDescriptor],
) -> Outcome<(), Error> {
    let statements = SchemaBuilder::new(conn.dialect()).drop_statements(tables);
    execute_all(cx, conn, &statements).await
}

/// Drop a table.
pub async fn drop_table<C: Connection>(
    cx: &Cx,
    conn: &C,
    table_name: &str,
    if_exists: bool,
) -> Outcome<(), Error> {
    let sql = drop_table_sql(conn.dialect(), table_name, if_exists);
    conn.execute(cx, &sql, &[]).await.map(|_| ())
}

async fn execute_all<C: Connection>(cx: &Cx, conn: &C, statements: &[String]) -> Outcome<(), Error> {
    for sql in statements {
        tracing::trace!(sql = %sql, "Executing DDL");
        match conn.execute(cx, sql, &[]).await {
            Outcome::Ok(_) => continue,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }
    Outcome::Ok(())
}
