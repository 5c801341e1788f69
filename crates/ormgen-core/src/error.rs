//! Error types for ormgen analysis, mapping and write operations.
//!
//! Every analysis failure carries the entity (and, where relevant, the field)
//! it was raised for, so front ends can surface it as a scoped diagnostic.

use std::fmt;

/// The primary error type for all ormgen operations.
#[derive(Debug)]
pub enum Error {
    /// Metamodel / association / ordering errors found during generation.
    Schema(SchemaError),
    /// Converter declaration errors and row decoding failures.
    Conversion(ConversionError),
    /// Value type mismatch while decoding a row.
    Type(TypeError),
    /// Write-time precondition failures (insert/update).
    Precondition(PreconditionError),
    /// Errors reported by the execution layer.
    Query(QueryError),
    /// Operation was cancelled by the execution layer.
    Cancelled,
    /// Custom error with message
    Custom(String),
}

/// A schema-level diagnostic, scoped to an entity and optionally a field.
#[derive(Debug, Clone)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub entity: Option<String>,
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Declaration names no identifier and is not an association container.
    MissingIdentifier,
    /// Declaration has no persistent fields at all.
    NoPersistentFields,
    /// Two declarations share a logical name.
    DuplicateEntity,
    /// Two fields of one declaration share a name or column.
    DuplicateField,
    /// A table or column name is not a valid SQL identifier.
    InvalidIdentifier,
    /// Composite identifier with fewer than two components.
    InvalidComposite,
    /// Association targets an entity that was not declared.
    UnknownEntity,
    /// Field references a converter that is not registered.
    UnknownConverter,
    /// One-to-many has no matching many-to-one on its target.
    UnresolvedInverse,
    /// More than one many-to-one claims the same back-reference.
    AmbiguousInverse,
    /// Cycle through non-nullable foreign keys; no creation order exists.
    RequiredForeignKeyCycle,
    /// Lazy fetching was requested; only eager fetching is supported.
    UnsupportedFetch,
    /// Eager include path does not name a valid association chain.
    InvalidIncludePath,
}

/// A converter declaration error or a row decoding failure.
#[derive(Debug, Clone)]
pub struct ConversionError {
    pub kind: ConversionErrorKind,
    pub entity: Option<String>,
    pub field: Option<String>,
    pub column: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionErrorKind {
    /// Converter lacks one direction or its two directions disagree on types.
    AsymmetricConverter,
    /// A non-nullable column is absent (or NULL) in a decoded row.
    MissingColumn,
    /// Converter failed to encode a domain value.
    EncodeFailed,
    /// Converter failed to decode a column value.
    DecodeFailed,
}

#[derive(Debug, Clone)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// A write-time precondition failure reported to the caller.
#[derive(Debug, Clone)]
pub struct PreconditionError {
    pub kind: PreconditionErrorKind,
    pub entity: String,
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionErrorKind {
    /// A required many-to-one references an entity with no persisted identifier.
    UnpersistedReference,
    /// An identifier value needed for the statement is absent.
    MissingIdentifier,
}

#[derive(Debug)]
pub struct QueryError {
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl SchemaError {
    /// Create a diagnostic of the given kind.
    pub fn new(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            entity: None,
            field: None,
            message: message.into(),
        }
    }

    /// Scope the diagnostic to an entity.
    #[must_use]
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Scope the diagnostic to a field.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl ConversionError {
    /// Create a conversion error of the given kind.
    pub fn new(kind: ConversionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            entity: None,
            field: None,
            column: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sql: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the statement that failed.
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        Error::Schema(e)
    }
}

impl From<ConversionError> for Error {
    fn from(e: ConversionError) -> Self {
        Error::Conversion(e)
    }
}

impl From<PreconditionError> for Error {
    fn from(e: PreconditionError) -> Self {
        Error::Precondition(e)
    }
}

impl Error {
    /// Is this an analysis-time error (blocks generation entirely)?
    pub fn is_generation_error(&self) -> bool {
        match self {
            Error::Schema(_) => true,
            Error::Conversion(c) => c.kind == ConversionErrorKind::AsymmetricConverter,
            _ => false,
        }
    }

    /// The schema error kind, if this is a schema error.
    pub fn schema_kind(&self) -> Option<SchemaErrorKind> {
        match self {
            Error::Schema(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The conversion error kind, if this is a conversion error.
    pub fn conversion_kind(&self) -> Option<ConversionErrorKind> {
        match self {
            Error::Conversion(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The precondition error kind, if this is a precondition error.
    pub fn precondition_kind(&self) -> Option<PreconditionErrorKind> {
        match self {
            Error::Precondition(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Entity the error is scoped to, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Error::Schema(e) => e.entity.as_deref(),
            Error::Conversion(e) => e.entity.as_deref(),
            Error::Precondition(e) => Some(&e.entity),
            _ => None,
        }
    }

    /// Field the error is scoped to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Schema(e) => e.field.as_deref(),
            Error::Conversion(e) => e.field.as_deref(),
            Error::Precondition(e) => e.field.as_deref(),
            _ => None,
        }
    }

    /// Attach entity/field scope to a schema or conversion error that has none.
    #[must_use]
    pub fn scoped(self, entity: &str, field: Option<&str>) -> Self {
        match self {
            Error::Schema(mut e) => {
                e.entity.get_or_insert_with(|| entity.to_string());
                if e.field.is_none() {
                    e.field = field.map(str::to_string);
                }
                Error::Schema(e)
            }
            Error::Conversion(mut e) => {
                e.entity.get_or_insert_with(|| entity.to_string());
                if e.field.is_none() {
                    e.field = field.map(str::to_string);
                }
                Error::Conversion(e)
            }
            other => other,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

/// Writes `Entity.field` / `Entity` / nothing depending on available scope.
fn write_scope(
    f: &mut fmt::Formatter<'_>,
    entity: Option<&str>,
    field: Option<&str>,
) -> fmt::Result {
    match (entity, field) {
        (Some(entity), Some(field)) => write!(f, " in {}.{}", entity, field),
        (Some(entity), None) => write!(f, " in {}", entity),
        (None, Some(field)) => write!(f, " in field '{}'", field),
        (None, None) => Ok(()),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(e) => write!(f, "Schema error: {}", e),
            Error::Conversion(e) => write!(f, "Conversion error: {}", e),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Precondition(e) => write!(f, "Precondition failed: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        write_scope(f, self.entity.as_deref(), self.field.as_deref())?;
        write!(f, ": {}", self.message)
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        write_scope(f, self.entity.as_deref(), self.field.as_deref())?;
        if let Some(column) = &self.column {
            write!(f, " (column '{}')", column)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        write_scope(f, Some(&self.entity), self.field.as_deref())?;
        write!(f, ": {}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SchemaError {}
impl std::error::Error for ConversionError {}
