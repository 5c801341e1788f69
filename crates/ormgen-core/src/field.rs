//! Column descriptors.

use crate::Result;
use crate::converter::Converter;
use crate::identifiers::Dialect;
use crate::types::SqlType;
use crate::value::Value;

/// What a column holds, as seen by mapping code.
#[derive(Debug, Clone)]
pub enum SemanticType {
    /// Stored as-is.
    Primitive(SqlType),
    /// May be NULL.
    Nullable(Box<SemanticType>),
    /// Domain value mapped through a converter; the schema only ever sees
    /// the converter's physical type.
    Converted(Converter),
}

impl SemanticType {
    /// Physical SQL type of the column.
    pub fn sql_type(&self) -> &SqlType {
        match self {
            SemanticType::Primitive(t) => t,
            SemanticType::Nullable(inner) => inner.sql_type(),
            SemanticType::Converted(conv) => conv.physical_type(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, SemanticType::Nullable(_))
    }

    pub fn converter(&self) -> Option<&Converter> {
        match self {
            SemanticType::Primitive(_) => None,
            SemanticType::Nullable(inner) => inner.converter(),
            SemanticType::Converted(conv) => Some(conv),
        }
    }

    /// Same type with nullability forced on or off.
    #[must_use]
    pub fn with_nullable(self, nullable: bool) -> Self {
        let base = match self {
            SemanticType::Nullable(inner) => *inner,
            other => other,
        };
        if nullable {
            SemanticType::Nullable(Box::new(base))
        } else {
            base
        }
    }
}

/// One physical column of an entity table.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    /// Field name on the entity.
    pub field: String,
    /// Physical column name.
    pub column: String,
    pub semantic: SemanticType,
    /// SQL default expression.
    pub default: Option<String>,
    /// Explicit SQL type text; takes precedence over the semantic type in DDL.
    pub type_override: Option<String>,
    pub unique: bool,
}

impl ColumnDescriptor {
    pub fn new(field: impl Into<String>, column: impl Into<String>, semantic: SemanticType) -> Self {
        Self {
            field: field.into(),
            column: column.into(),
            semantic,
            default: None,
            type_override: None,
            unique: false,
        }
    }

    pub fn sql_type(&self) -> &SqlType {
        self.semantic.sql_type()
    }

    pub fn is_nullable(&self) -> bool {
        self.semantic.is_nullable()
    }

    pub fn converter(&self) -> Option<&Converter> {
        self.semantic.converter()
    }

    /// Type text as rendered in DDL.
    pub fn ddl_type(&self, dialect: Dialect) -> String {
        match &self.type_override {
            Some(sql) => sql.clone(),
            None => self.sql_type().ddl_name(dialect),
        }
    }

    /// Domain value to column value.
    #[allow(clippy::result_large_err)]
    pub fn encode(&self, value: &Value) -> Result<Value> {
        match self.converter() {
            Some(conv) => conv.encode(value),
            None => Ok(value.clone()),
        }
    }

    /// Column value to domain value.
    #[allow(clippy::result_large_err)]
    pub fn decode(&self, value: &Value) -> Result<Value> {
        match self.converter() {
            Some(conv) => conv.decode(value),
            None => Ok(value.clone()),
        }
    }
}
