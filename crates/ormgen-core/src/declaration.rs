//! Declaration input contract.
//!
//! A front end (derive macro, annotation scanner, JSON file) describes each
//! entity with an [`EntityDecl`]. Declarations are plain data: every option
//! is an explicit field, and the whole set is `serde`-serializable so it can
//! be handed over as JSON.
//!
//! ```
//! use ormgen_core::declaration::{AssociationDecl, EntityDecl, FieldDecl, IdentifierDecl};
//! use ormgen_core::SqlType;
//!
//! let phone = EntityDecl::new("Phone")
//!     .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
//!     .field(FieldDecl::new("number", SqlType::Text))
//!     .association(AssociationDecl::many_to_one("customer", "Customer").inverse("phones"));
//! assert_eq!(phone.associations.len(), 1);
//! ```

use crate::error::{Error, Result};
use crate::types::SqlType;
use serde::{Deserialize, Serialize};

/// One declared entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    /// Logical entity name (`Customer`).
    pub name: String,
    /// Table name override; defaults to the snake_case plural of `name`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub identifier: Option<IdentifierDecl>,
    /// Pure association container: keyed by its many-to-one foreign keys.
    #[serde(default)]
    pub association_container: bool,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub associations: Vec<AssociationDecl>,
}

impl EntityDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            identifier: None,
            association_container: false,
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Override the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn identifier(mut self, identifier: IdentifierDecl) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Mark as a pure association container (no identifier of its own).
    pub fn association_container(mut self) -> Self {
        self.association_container = true;
        self
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn association(mut self, association: AssociationDecl) -> Self {
        self.associations.push(association);
        self
    }
}

/// A persistent scalar field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// Column name override; defaults to the field name.
    #[serde(default)]
    pub column: Option<String>,
    /// Declared type. For converted fields this is the domain type.
    pub sql_type: SqlType,
    #[serde(default)]
    pub nullable: bool,
    /// Name of a registered converter.
    #[serde(default)]
    pub converter: Option<String>,
    /// SQL default expression.
    #[serde(default)]
    pub default: Option<String>,
    /// Explicit SQL type text, rendered verbatim in DDL.
    #[serde(default)]
    pub type_override: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            column: None,
            sql_type,
            nullable: false,
            converter: None,
            default: None,
            type_override: None,
            unique: false,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn converter(mut self, converter: impl Into<String>) -> Self {
        self.converter = Some(converter.into());
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn type_override(mut self, sql: impl Into<String>) -> Self {
        self.type_override = Some(sql.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Physical column name.
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// The identifier of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierDecl {
    /// Surrogate key assigned by the database on insert.
    Generated(FieldDecl),
    /// Simple key supplied by the application.
    Natural(FieldDecl),
    /// Ordered multi-column key; each component is mapped independently.
    Composite(Vec<FieldDecl>),
    /// Key whose domain value is mapped through a converter.
    Converted(FieldDecl),
}

impl IdentifierDecl {
    pub fn generated(name: impl Into<String>, sql_type: SqlType) -> Self {
        IdentifierDecl::Generated(FieldDecl::new(name, sql_type))
    }

    pub fn natural(name: impl Into<String>, sql_type: SqlType) -> Self {
        IdentifierDecl::Natural(FieldDecl::new(name, sql_type))
    }

    pub fn composite(components: Vec<FieldDecl>) -> Self {
        IdentifierDecl::Composite(components)
    }

    pub fn converted(
        name: impl Into<String>,
        domain_type: SqlType,
        converter: impl Into<String>,
    ) -> Self {
        IdentifierDecl::Converted(FieldDecl::new(name, domain_type).converter(converter))
    }

    /// Identifier component fields in key order.
    pub fn components(&self) -> &[FieldDecl] {
        match self {
            IdentifierDecl::Generated(f) | IdentifierDecl::Natural(f) | IdentifierDecl::Converted(f) => {
                std::slice::from_ref(f)
            }
            IdentifierDecl::Composite(fields) => fields,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// How an association is loaded. Only eager fetching is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Eager,
    Lazy,
}

/// A declared association field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDecl {
    pub field: String,
    pub kind: AssociationKind,
    /// Target entity's logical name.
    pub target: String,
    /// Many-to-one only: the foreign key is nullable.
    #[serde(default)]
    pub optional: bool,
    /// Inverse side: names the owning association on the target.
    #[serde(default)]
    pub mapped_by: Option<String>,
    /// Owning side: names the collection on the target that mirrors it.
    #[serde(default)]
    pub inverse: Option<String>,
    /// Many-to-many join table override.
    #[serde(default)]
    pub join_table: Option<String>,
    /// Foreign-key column overrides, one per target identifier component.
    /// For many-to-many these are the owner's columns in the join table.
    #[serde(default)]
    pub join_columns: Vec<String>,
    /// Many-to-many only: the target's columns in the join table.
    #[serde(default)]
    pub inverse_join_columns: Vec<String>,
    #[serde(default)]
    pub fetch: FetchMode,
}

impl AssociationDecl {
    fn new(field: impl Into<String>, kind: AssociationKind, target: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            target: target.into(),
            optional: false,
            mapped_by: None,
            inverse: None,
            join_table: None,
            join_columns: Vec::new(),
            inverse_join_columns: Vec::new(),
            fetch: FetchMode::Eager,
        }
    }

    pub fn many_to_one(field: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(field, AssociationKind::ManyToOne, target)
    }

    pub fn one_to_many(field: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(field, AssociationKind::OneToMany, target)
    }

    pub fn many_to_many(field: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(field, AssociationKind::ManyToMany, target)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.mapped_by = Some(field.into());
        self
    }

    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = Some(field.into());
        self
    }

    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    pub fn join_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.join_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn inverse_join_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inverse_join_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn fetch(mut self, fetch: FetchMode) -> Self {
        self.fetch = fetch;
        self
    }
}

/// Parse an ordered declaration set from JSON.
#[allow(clippy::result_large_err)]
pub fn declarations_from_json(json: &str) -> Result<Vec<EntityDecl>> {
    serde_json::from_str(json).map_err(|e| Error::Custom(format!("invalid declarations: {e}")))
}
