//! Core types and analysis for ormgen.
//!
//! This crate provides the foundation every generator builds on:
//!
//! - `Value`, `Row` and `Entity` for data flowing between rows and instances
//! - declarations (`EntityDecl`) and converters (`ConverterRegistry`) as input
//! - the metamodel builder and association resolver producing a `Metamodel`
//! - the `Connection` trait the execution layer implements
//! - `Outcome` / `Cx` re-exported from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod converter;
pub mod declaration;
pub mod entity;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod metamodel;
pub mod model;
pub mod relationship;
pub mod resolve;
pub mod row;
pub mod types;
pub mod value;

pub use connection::Connection;
pub use converter::{Converter, ConverterDef, ConverterRegistry};
pub use declaration::{
    AssociationDecl, AssociationKind, EntityDecl, FetchMode, FieldDecl, IdentifierDecl,
    declarations_from_json,
};
pub use entity::{Entity, Related};
pub use error::{
    ConversionError, ConversionErrorKind, Error, PreconditionError, PreconditionErrorKind,
    QueryError, Result, SchemaError, SchemaErrorKind, TypeError,
};
pub use field::{ColumnDescriptor, SemanticType};
pub use identifiers::{Dialect, quote_ident, quote_ident_mysql};
pub use metamodel::{Metamodel, NamingOptions, build_all, build_entity};
pub use model::{EntityDescriptor, EntityId, IdentifierDescriptor};
pub use relationship::{
    AssociationDescriptor, AssociationId, ForeignKeyColumn, ForeignKeyDescriptor,
    JoinTableDescriptor, Physical, RelationshipGraph,
};
pub use resolve::resolve;
pub use row::{ColumnInfo, Row, RowView};
pub use types::SqlType;
pub use value::{IdentityKey, Value};
