//! Metamodel builder.
//!
//! Turns each [`EntityDecl`] into an [`EntityDescriptor`]. Building one
//! entity never looks at another; cross-entity work (targets, inverses,
//! foreign keys, join tables) happens afterwards in [`crate::resolve`].

use crate::converter::ConverterRegistry;
use crate::declaration::{AssociationKind, EntityDecl, FetchMode, FieldDecl, IdentifierDecl};
use crate::error::{ConversionError, ConversionErrorKind, Error, Result, SchemaError, SchemaErrorKind};
use crate::field::{ColumnDescriptor, SemanticType};
use crate::identifiers::{default_table_name, is_valid_identifier};
use crate::model::{EntityDescriptor, EntityId, IdentifierDescriptor};
use crate::relationship::{AssociationDescriptor, AssociationId, JoinTableDescriptor, RelationshipGraph};
use crate::resolve;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Naming rules for generated tables and columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingOptions {
    /// Pluralise default table names (`Customer` → `customers`).
    pub pluralise_tables: bool,
    /// Separator in generated foreign-key column names (`customer_id`).
    pub fk_separator: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            pluralise_tables: true,
            fk_separator: "_".to_string(),
        }
    }
}

/// The resolved entity model: descriptors, join tables and relationship graph.
#[derive(Debug, Clone)]
pub struct Metamodel {
    entities: Vec<EntityDescriptor>,
    by_name: HashMap<String, EntityId>,
    join_tables: Vec<Arc<JoinTableDescriptor>>,
    graph: RelationshipGraph,
}

impl Metamodel {
    pub(crate) fn new(
        entities: Vec<EntityDescriptor>,
        join_tables: Vec<Arc<JoinTableDescriptor>>,
        graph: RelationshipGraph,
    ) -> Self {
        let by_name = entities.iter().map(|e| (e.name.clone(), e.id)).collect();
        Self {
            entities,
            by_name,
            join_tables,
            graph,
        }
    }

    /// Build and resolve a declaration set in one call.
    #[allow(clippy::result_large_err)]
    pub fn analyze(
        decls: &[EntityDecl],
        registry: &ConverterRegistry,
        naming: &NamingOptions,
    ) -> Result<Self> {
        let entities = build_all(decls, registry, naming)?;
        resolve::resolve(entities, decls, naming)
    }

    /// Entities in declaration order.
    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> &EntityDescriptor {
        &self.entities[id.0]
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&EntityDescriptor> {
        self.by_name.get(name).map(|id| &self.entities[id.0])
    }

    pub fn association(&self, id: AssociationId) -> &AssociationDescriptor {
        &self.entities[id.entity.0].associations[id.index]
    }

    /// The association mirroring `assoc`, if it is bidirectional.
    pub fn inverse_of(&self, assoc: &AssociationDescriptor) -> Option<&AssociationDescriptor> {
        assoc.inverse.map(|id| self.association(id))
    }

    /// Join tables in the order their owning associations were declared.
    pub fn join_tables(&self) -> &[Arc<JoinTableDescriptor>] {
        &self.join_tables
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }
}

/// Build descriptors for a whole declaration set (associations unresolved).
#[tracing::instrument(level = "debug", skip_all, fields(entities = decls.len()))]
#[allow(clippy::result_large_err)]
pub fn build_all(
    decls: &[EntityDecl],
    registry: &ConverterRegistry,
    naming: &NamingOptions,
) -> Result<Vec<EntityDescriptor>> {
    let mut seen = HashSet::new();
    for decl in decls {
        if !seen.insert(decl.name.as_str()) {
            return Err(SchemaError::new(
                SchemaErrorKind::DuplicateEntity,
                format!("entity '{}' is declared more than once", decl.name),
            )
            .entity(&decl.name)
            .into());
        }
    }

    let entities = decls
        .iter()
        .enumerate()
        .map(|(i, decl)| build_entity(decl, EntityId(i), registry, naming))
        .collect::<Result<Vec<_>>>()?;
    debug!(count = entities.len(), "Built entity descriptors");
    Ok(entities)
}

/// Build one entity descriptor.
#[allow(clippy::result_large_err)]
pub fn build_entity(
    decl: &EntityDecl,
    id: EntityId,
    registry: &ConverterRegistry,
    naming: &NamingOptions,
) -> Result<EntityDescriptor> {
    let fail = |kind: SchemaErrorKind, field: Option<&str>, message: String| -> Error {
        let mut err = SchemaError::new(kind, message).entity(&decl.name);
        if let Some(field) = field {
            err = err.field(field);
        }
        err.into()
    };

    let table = decl
        .table
        .clone()
        .unwrap_or_else(|| default_table_name(&decl.name, naming.pluralise_tables));
    if !is_valid_identifier(&table) {
        return Err(fail(
            SchemaErrorKind::InvalidIdentifier,
            None,
            format!("'{table}' is not a valid table name"),
        ));
    }

    for assoc in &decl.associations {
        if assoc.fetch == FetchMode::Lazy {
            return Err(fail(
                SchemaErrorKind::UnsupportedFetch,
                Some(assoc.field.as_str()),
                "lazy fetching is not supported; declare the association eager".to_string(),
            ));
        }
    }

    let many_to_ones: Vec<&str> = decl
        .associations
        .iter()
        .filter(|a| a.kind == AssociationKind::ManyToOne)
        .map(|a| a.field.as_str())
        .collect();

    if decl.identifier.is_none() && decl.fields.is_empty() && many_to_ones.is_empty() {
        return Err(fail(
            SchemaErrorKind::NoPersistentFields,
            None,
            "declaration has no persistent fields".to_string(),
        ));
    }

    let identifier = match &decl.identifier {
        Some(IdentifierDecl::Generated(f)) => {
            if !f.sql_type.is_integer() || f.converter.is_some() {
                return Err(fail(
                    SchemaErrorKind::InvalidIdentifier,
                    Some(f.name.as_str()),
                    "generated identifiers must be plain integer columns".to_string(),
                ));
            }
            IdentifierDescriptor::Generated(key_column(decl, f, registry)?)
        }
        Some(IdentifierDecl::Natural(f)) => IdentifierDescriptor::Natural(key_column(decl, f, registry)?),
        Some(IdentifierDecl::Converted(f)) => {
            if f.converter.is_none() {
                return Err(fail(
                    SchemaErrorKind::UnknownConverter,
                    Some(f.name.as_str()),
                    "converted identifier names no converter".to_string(),
                ));
            }
            IdentifierDescriptor::Converted(key_column(decl, f, registry)?)
        }
        Some(IdentifierDecl::Composite(components)) => {
            if components.len() < 2 {
                return Err(fail(
                    SchemaErrorKind::InvalidComposite,
                    components.first().map(|c| c.name.as_str()),
                    format!(
                        "composite identifier needs at least 2 components, found {}",
                        components.len()
                    ),
                ));
            }
            IdentifierDescriptor::Composite(
                components
                    .iter()
                    .map(|c| key_column(decl, c, registry))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        None if decl.association_container && !many_to_ones.is_empty() => {
            IdentifierDescriptor::AssociationKey(many_to_ones.iter().map(|f| (*f).to_string()).collect())
        }
        None => {
            let message = if decl.association_container {
                "association container declares no many-to-one association to key on"
            } else {
                "declaration names no identifier"
            };
            return Err(fail(SchemaErrorKind::MissingIdentifier, None, message.to_string()));
        }
    };

    let columns = decl
        .fields
        .iter()
        .map(|f| column(decl, f, registry))
        .collect::<Result<Vec<_>>>()?;

    let mut field_names = HashSet::new();
    let mut column_names = HashSet::new();
    let id_names = identifier.own_columns().iter().map(|c| (&c.field, &c.column));
    for (field, col) in id_names.chain(columns.iter().map(|c| (&c.field, &c.column))) {
        if !field_names.insert(field.as_str()) {
            return Err(fail(
                SchemaErrorKind::DuplicateField,
                Some(field.as_str()),
                format!("field '{field}' is declared more than once"),
            ));
        }
        if !column_names.insert(col.as_str()) {
            return Err(fail(
                SchemaErrorKind::DuplicateField,
                Some(field.as_str()),
                format!("column '{col}' is mapped more than once"),
            ));
        }
    }
    for assoc in &decl.associations {
        if !field_names.insert(assoc.field.as_str()) {
            return Err(fail(
                SchemaErrorKind::DuplicateField,
                Some(assoc.field.as_str()),
                format!("field '{}' is declared more than once", assoc.field),
            ));
        }
    }

    trace!(
        entity = %decl.name,
        table = %table,
        identifier = identifier.kind_name(),
        columns = columns.len(),
        "Built entity descriptor"
    );

    Ok(EntityDescriptor {
        id,
        name: decl.name.clone(),
        table,
        identifier,
        columns,
        associations: Vec::new(),
    })
}

/// Identifier components are never nullable.
#[allow(clippy::result_large_err)]
fn key_column(decl: &EntityDecl, field: &FieldDecl, registry: &ConverterRegistry) -> Result<ColumnDescriptor> {
    let mut col = column(decl, field, registry)?;
    col.semantic = col.semantic.with_nullable(false);
    Ok(col)
}

#[allow(clippy::result_large_err)]
fn column(decl: &EntityDecl, field: &FieldDecl, registry: &ConverterRegistry) -> Result<ColumnDescriptor> {
    let name = field.column_name();
    if !is_valid_identifier(name) {
        return Err(SchemaError::new(
            SchemaErrorKind::InvalidIdentifier,
            format!("'{name}' is not a valid column name"),
        )
        .entity(&decl.name)
        .field(&field.name)
        .into());
    }

    let semantic = match &field.converter {
        Some(conv_name) => {
            let conv = registry
                .resolve(conv_name)
                .map_err(|e| e.scoped(&decl.name, Some(field.name.as_str())))?;
            if conv.domain_type() != &field.sql_type {
                return Err(ConversionError::new(
                    ConversionErrorKind::AsymmetricConverter,
                    format!(
                        "converter '{}' maps {} but the field is declared {}",
                        conv_name,
                        conv.domain_type().sql_name(),
                        field.sql_type.sql_name()
                    ),
                )
                .entity(&decl.name)
                .field(&field.name)
                .into());
            }
            SemanticType::Converted(conv)
        }
        None => SemanticType::Primitive(field.sql_type.clone()),
    };

    Ok(ColumnDescriptor {
        field: field.name.clone(),
        column: name.to_string(),
        semantic: semantic.with_nullable(field.nullable),
        default: field.default.clone(),
        type_override: field.type_override.clone(),
        unique: field.unique,
    })
}
