//! INSERT and UPDATE statements for described entities.

use crate::mapping::EntityMapper;
use asupersync::{Cx, Outcome};
use ormgen_core::{
    ColumnDescriptor, Connection, Dialect, Entity, EntityDescriptor, EntityId, Error,
    IdentifierDescriptor, IdentityKey, Metamodel, PreconditionError, PreconditionErrorKind,
    Result, SqlType, TypeError, Value,
};
use tracing::{debug, trace};

/// A conjunction of column equalities used as a WHERE clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    terms: Vec<(String, Value)>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `column = value` (`column IS NULL` for NULL).
    pub fn column_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((column.into(), value.into()));
        self
    }

    /// Match an entity by its decoded identifier.
    ///
    /// # Errors
    ///
    /// `MissingIdentifier` when `key` has the wrong arity or a NULL component.
    #[allow(clippy::result_large_err)]
    pub fn by_identifier(entity: &EntityDescriptor, key: &IdentityKey) -> Result<Self> {
        let columns = entity.key_columns();
        if key.values().len() != columns.len() || key.has_null() {
            return Err(missing_identifier(&entity.name, "identifier value is absent"));
        }
        let mut predicate = Self::new();
        for (col, value) in columns.into_iter().zip(key.values()) {
            let encoded = col
                .encode(value)
                .map_err(|e| e.scoped(&entity.name, Some(&col.field)))?;
            predicate.terms.push((col.column.clone(), encoded));
        }
        Ok(predicate)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[(String, Value)] {
        &self.terms
    }

    /// Render the conjunction, appending bound values to `params` and
    /// numbering placeholders after the ones already there.
    pub fn render(&self, dialect: Dialect, alias: Option<&str>, params: &mut Vec<Value>) -> String {
        let qualify = |column: &str| match alias {
            Some(a) => format!("{}.{}", dialect.quote(a), dialect.quote(column)),
            None => dialect.quote(column),
        };
        self.terms
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", qualify(column))
                } else {
                    params.push(value.clone());
                    format!("{} = {}", qualify(column), dialect.placeholder(params.len()))
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn missing_identifier(entity: &str, message: &str) -> Error {
    Error::Precondition(PreconditionError {
        kind: PreconditionErrorKind::MissingIdentifier,
        entity: entity.to_string(),
        field: None,
        message: message.to_string(),
    })
}

/// Every set many-to-one must point at a complete, persisted identity.
///
/// Only an unset slot may be written as NULL, and only when its foreign key
/// is nullable.
#[allow(clippy::result_large_err)]
fn check_references(mapper: &EntityMapper<'_>, entity: &Entity) -> Result<()> {
    let desc = mapper.descriptor();
    for assoc in desc.many_to_ones() {
        let Some(fk) = assoc.foreign_key() else {
            continue;
        };
        let target = &mapper.model().entity(assoc.target).name;
        let message = match mapper.referenced_key(assoc, entity) {
            None if fk.nullable => continue,
            None => format!("required reference to {target} is not set"),
            Some(key) if key.len() != fk.columns.len() => format!(
                "reference to {target} has {} key values, expected {}",
                key.len(),
                fk.columns.len()
            ),
            Some(key) if key.iter().any(Value::is_null) => {
                format!("reference to {target} has no persisted identifier")
            }
            Some(_) => continue,
        };
        return Err(Error::Precondition(PreconditionError {
            kind: PreconditionErrorKind::UnpersistedReference,
            entity: desc.name.clone(),
            field: Some(assoc.field.clone()),
            message,
        }));
    }
    Ok(())
}

fn quoted_columns(dialect: Dialect, assignments: &[(String, Value)]) -> String {
    assignments
        .iter()
        .map(|(column, _)| dialect.quote(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// INSERT statement generator for one entity.
#[derive(Debug, Clone, Copy)]
pub struct InsertBuilder<'m> {
    mapper: EntityMapper<'m>,
}

impl<'m> InsertBuilder<'m> {
    pub fn new(model: &'m Metamodel, id: EntityId) -> Self {
        Self {
            mapper: EntityMapper::new(model, id),
        }
    }

    fn generated_column(&self) -> Option<&'m ColumnDescriptor> {
        match &self.mapper.descriptor().identifier {
            IdentifierDescriptor::Generated(col) => Some(col),
            _ => None,
        }
    }

    /// Build the INSERT SQL and parameters.
    ///
    /// A generated identifier column is omitted; every other identifier must
    /// be supplied.
    ///
    /// # Errors
    ///
    /// `UnpersistedReference` for a required reference left unset or any
    /// reference with no identity, `MissingIdentifier` for an absent natural
    /// identifier, converter failures.
    #[allow(clippy::result_large_err)]
    pub fn build(&self, entity: &Entity, dialect: Dialect) -> Result<(String, Vec<Value>)> {
        let desc = self.mapper.descriptor();
        check_references(&self.mapper, entity)?;
        let mut assignments = self.mapper.to_column_assignments(entity)?;

        let generated = self.generated_column();
        match generated {
            Some(col) => assignments.retain(|(column, _)| *column != col.column),
            None => {
                if self.mapper.identity_of(entity).has_null() {
                    return Err(missing_identifier(&desc.name, "identifier must be supplied on insert"));
                }
            }
        }

        let table = dialect.quote(&desc.table);
        let mut sql = if assignments.is_empty() {
            match dialect {
                Dialect::Mysql => format!("INSERT INTO {table} () VALUES ()"),
                Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {table} DEFAULT VALUES"),
            }
        } else {
            let placeholders: Vec<_> = (1..=assignments.len())
                .map(|i| dialect.placeholder(i))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                quoted_columns(dialect, &assignments),
                placeholders.join(", ")
            )
        };
        if let Some(col) = generated {
            if dialect.returns_generated_keys() {
                sql.push_str(&format!(" RETURNING {}", dialect.quote(&col.column)));
            }
        }

        let params = assignments.into_iter().map(|(_, value)| value).collect();
        Ok((sql, params))
    }

    /// Execute the INSERT and return a copy of `entity` carrying any
    /// generated identifier. `entity` itself is never modified.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = %self.mapper.descriptor().name))]
    pub async fn execute<C: Connection>(&self, cx: &Cx, conn: &C, entity: &Entity) -> Outcome<Entity, Error> {
        let (sql, params) = match self.build(entity, conn.dialect()) {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        trace!(sql = %sql, params = params.len(), "Executing INSERT");

        let Some(col) = self.generated_column() else {
            return conn.execute(cx, &sql, &params).await.map(|_| entity.clone());
        };
        match conn.insert(cx, &sql, &params).await {
            Outcome::Ok(id) => match generated_value(col, id) {
                Ok(value) => {
                    debug!(id, "Inserted entity with generated identifier");
                    let mut inserted = entity.clone();
                    inserted.set(&col.field, value);
                    Outcome::Ok(inserted)
                }
                Err(e) => Outcome::Err(e),
            },
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

/// Narrow a driver-assigned key to the identifier column's integer width.
#[allow(clippy::result_large_err)]
fn generated_value(col: &ColumnDescriptor, id: i64) -> Result<Value> {
    let overflow = || {
        Error::Type(TypeError {
            expected: col.sql_type().kind_name(),
            actual: format!("out-of-range key {id}"),
            column: Some(col.column.clone()),
        })
    };
    match col.sql_type() {
        SqlType::SmallInt => i16::try_from(id).map(Value::SmallInt).map_err(|_| overflow()),
        SqlType::Integer => i32::try_from(id).map(Value::Int).map_err(|_| overflow()),
        _ => Ok(Value::BigInt(id)),
    }
}

/// UPDATE statement generator for one entity.
#[derive(Debug, Clone, Copy)]
pub struct UpdateBuilder<'m> {
    mapper: EntityMapper<'m>,
}

impl<'m> UpdateBuilder<'m> {
    pub fn new(model: &'m Metamodel, id: EntityId) -> Self {
        Self {
            mapper: EntityMapper::new(model, id),
        }
    }

    /// Build the UPDATE SQL and parameters, or `None` when the entity has no
    /// non-identifier column to write.
    ///
    /// Every non-identifier column is written, owning foreign keys included.
    /// Collections and join tables are never touched.
    ///
    /// # Errors
    ///
    /// `MissingIdentifier` for an empty predicate, `UnpersistedReference`
    /// for an unset required reference or a reference with no identity,
    /// converter failures.
    #[allow(clippy::result_large_err)]
    pub fn build(
        &self,
        predicate: &Predicate,
        entity: &Entity,
        dialect: Dialect,
    ) -> Result<Option<(String, Vec<Value>)>> {
        let desc = self.mapper.descriptor();
        if predicate.is_empty() {
            return Err(missing_identifier(&desc.name, "update requires an identifying predicate"));
        }
        check_references(&self.mapper, entity)?;
        let assignments = self.mapper.to_column_assignments(entity)?;

        let key: Vec<String> = desc.key_columns().iter().map(|c| c.column.clone()).collect();
        let sets: Vec<(String, Value)> = assignments
            .into_iter()
            .filter(|(column, _)| !key.contains(column))
            .collect();
        if sets.is_empty() {
            return Ok(None);
        }

        let mut params = Vec::with_capacity(sets.len() + predicate.terms().len());
        let mut clauses = Vec::with_capacity(sets.len());
        for (column, value) in sets {
            params.push(value);
            clauses.push(format!("{} = {}", dialect.quote(&column), dialect.placeholder(params.len())));
        }
        let where_sql = predicate.render(dialect, None, &mut params);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            dialect.quote(&desc.table),
            clauses.join(", "),
            where_sql
        );
        Ok(Some((sql, params)))
    }

    /// Predicate matching `entity`'s own identifier.
    ///
    /// # Errors
    ///
    /// `MissingIdentifier` when the entity has no identity yet.
    #[allow(clippy::result_large_err)]
    pub fn identity_predicate(&self, entity: &Entity) -> Result<Predicate> {
        Predicate::by_identifier(self.mapper.descriptor(), &self.mapper.identity_of(entity))
    }

    /// Execute the UPDATE and return the number of rows affected.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = %self.mapper.descriptor().name))]
    pub async fn execute<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        predicate: &Predicate,
        entity: &Entity,
    ) -> Outcome<u64, Error> {
        match self.build(predicate, entity, conn.dialect()) {
            Ok(Some((sql, params))) => {
                trace!(sql = %sql, params = params.len(), "Executing UPDATE");
                conn.execute(cx, &sql, &params).await
            }
            Ok(None) => {
                debug!("Nothing to update");
                Outcome::Ok(0)
            }
            Err(e) => Outcome::Err(e),
        }
    }
}
