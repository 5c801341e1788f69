//! CREATE TABLE / DROP TABLE rendering.

use crate::table::{ForeignKeyConstraint, TableColumn, TableDescriptor};
use ormgen_core::Dialect;
use tracing::{debug, trace};

/// Builder for one CREATE TABLE statement.
#[derive(Debug, Clone)]
pub struct CreateTable<'a> {
    table: &'a TableDescriptor,
    dialect: Dialect,
    if_not_exists: bool,
}

impl<'a> CreateTable<'a> {
    pub fn new(table: &'a TableDescriptor, dialect: Dialect) -> Self {
        Self {
            table,
            dialect,
            if_not_exists: false,
        }
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn set_if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// Whether a foreign key is rendered inline.
    ///
    /// SQLite accepts forward references in CREATE TABLE and cannot add
    /// constraints afterwards, so it keeps deferred keys inline.
    fn inline_fk(&self, fk: &ForeignKeyConstraint) -> bool {
        !fk.deferred || self.dialect == Dialect::Sqlite
    }

    /// Sqlite's rowid alias must be declared on the column itself.
    fn inline_primary_key(&self) -> bool {
        self.dialect == Dialect::Sqlite
            && self.table.primary_key.len() == 1
            && self.table.columns.iter().any(|c| c.generated)
    }

    /// Build the CREATE TABLE SQL.
    pub fn build(&self) -> String {
        let d = self.dialect;
        let inline_pk = self.inline_primary_key();
        let mut sql = String::from("CREATE TABLE ");
        if self.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&d.quote(&self.table.name));
        sql.push_str(" (\n");

        let mut parts: Vec<String> = self
            .table
            .columns
            .iter()
            .map(|col| format!("  {}", format_column_def(col, d, inline_pk)))
            .collect();

        if !inline_pk {
            parts.push(format!("  PRIMARY KEY ({})", quote_list(&self.table.primary_key, d)));
        }

        let single_pk = |name: &str| self.table.primary_key.len() == 1 && self.table.primary_key[0] == name;
        for col in self.table.columns.iter().filter(|c| c.unique && !single_pk(&c.name)) {
            parts.push(format!(
                "  CONSTRAINT {} UNIQUE ({})",
                d.quote(&format!("uk_{}_{}", self.table.name, col.name)),
                d.quote(&col.name)
            ));
        }

        for fk in self.table.foreign_keys.iter().filter(|fk| self.inline_fk(fk)) {
            parts.push(format!("  {}", format_fk_constraint(&self.table.name, fk, d)));
        }

        sql.push_str(&parts.join(",\n"));
        sql.push_str("\n)");
        trace!(table = %self.table.name, sql = %sql, "Rendered CREATE TABLE");
        sql
    }

    /// ALTER TABLE statements for the foreign keys not rendered inline.
    pub fn deferred_constraints(&self) -> Vec<String> {
        self.table
            .foreign_keys
            .iter()
            .filter(|fk| !self.inline_fk(fk))
            .map(|fk| {
                format!(
                    "ALTER TABLE {} ADD {}",
                    self.dialect.quote(&self.table.name),
                    format_fk_constraint(&self.table.name, fk, self.dialect)
                )
            })
            .collect()
    }
}

fn quote_list(names: &[String], dialect: Dialect) -> String {
    names
        .iter()
        .map(|n| dialect.quote(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_type(col: &TableColumn, dialect: Dialect) -> String {
    if let Some(ty) = &col.type_override {
        return ty.clone();
    }
    if col.generated && dialect == Dialect::Sqlite {
        return "INTEGER".to_string();
    }
    col.sql_type.ddl_name(dialect)
}

/// Format a column definition.
fn format_column_def(col: &TableColumn, dialect: Dialect, inline_pk: bool) -> String {
    let mut parts = vec![dialect.quote(&col.name), column_type(col, dialect)];

    if col.generated {
        match dialect {
            Dialect::Postgres => parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string()),
            Dialect::Sqlite if inline_pk => parts.push("PRIMARY KEY AUTOINCREMENT".to_string()),
            Dialect::Sqlite => parts.push("NOT NULL".to_string()),
            Dialect::Mysql => {
                parts.push("NOT NULL".to_string());
                parts.push("AUTO_INCREMENT".to_string());
            }
        }
        return parts.join(" ");
    }

    if !col.nullable {
        parts.push("NOT NULL".to_string());
    }
    if let Some(default) = &col.default {
        parts.push(format!("DEFAULT {default}"));
    }
    parts.join(" ")
}

/// Format a named foreign key constraint.
fn format_fk_constraint(table: &str, fk: &ForeignKeyConstraint, dialect: Dialect) -> String {
    let name = format!("fk_{}_{}", table, fk.columns.join("_"));
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
        dialect.quote(&name),
        quote_list(&fk.columns, dialect),
        dialect.quote(&fk.referenced_table),
        quote_list(&fk.referenced_columns, dialect)
    )
}

/// Generate a DROP TABLE statement.
pub fn drop_table_sql(dialect: Dialect, table_name: &str, if_exists: bool) -> String {
    if if_exists {
        format!("DROP TABLE IF EXISTS {}", dialect.quote(table_name))
    } else {
        format!("DROP TABLE {}", dialect.quote(table_name))
    }
}

/// Builds the full DDL script for a set of ordered tables.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    dialect: Dialect,
    if_not_exists: bool,
}

impl SchemaBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            if_not_exists: false,
        }
    }

    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// CREATE TABLE statements in the given order, followed by any
    /// deferred foreign key constraints.
    pub fn create_statements(&self, tables: &[TableDescriptor]) -> Vec<String> {
        let mut creates = Vec::with_capacity(tables.len());
        let mut alters = Vec::new();
        for table in tables {
            let stmt = CreateTable::new(table, self.dialect).set_if_not_exists(self.if_not_exists);
            creates.push(stmt.build());
            alters.extend(stmt.deferred_constraints());
        }
        debug!(
            dialect = ?self.dialect,
            tables = creates.len(),
            constraints = alters.len(),
            "Generated schema DDL"
        );
        creates.extend(alters);
        creates
    }

    /// DROP TABLE statements in reverse creation order.
    pub fn drop_statements(&self, tables: &[TableDescriptor]) -> Vec<String> {
        tables
            .iter()
            .rev()
            .map(|t| drop_table_sql(self.dialect, &t.name, true))
            .collect()
    }
}
