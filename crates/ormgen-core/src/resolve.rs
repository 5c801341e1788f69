//! Association resolver.
//!
//! Runs once every entity descriptor exists. Resolves association targets,
//! many-to-one foreign keys, one-to-many inverses and many-to-many join
//! tables, then records the relationship graph.
//!
//! Rules:
//! - a many-to-one owns its foreign key; the key mirrors every identifier
//!   component of the target and is nullable only when declared optional;
//! - a one-to-many never has columns of its own. It is the inverse of exactly
//!   one many-to-one on its target, found through `mapped_by` and/or the
//!   many-to-one's `inverse`, and shares that many-to-one's key;
//! - a many-to-many pair shares one join table, owned by whichever side was
//!   declared first.

use crate::declaration::{AssociationDecl, AssociationKind, EntityDecl};
use crate::error::{Error, Result, SchemaError, SchemaErrorKind};
use crate::field::ColumnDescriptor;
use crate::identifiers::{is_valid_identifier, to_snake_case};
use crate::metamodel::{Metamodel, NamingOptions};
use crate::model::{EntityDescriptor, EntityId, IdentifierDescriptor};
use crate::relationship::{
    AssociationDescriptor, AssociationId, ForeignKeyColumn, ForeignKeyDescriptor,
    JoinTableDescriptor, Physical, RelationshipGraph,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolve all associations of a built declaration set.
///
/// `entities` must come from [`crate::metamodel::build_all`] over the same
/// `decls`, in the same order.
#[tracing::instrument(level = "debug", skip_all, fields(entities = entities.len()))]
#[allow(clippy::result_large_err)]
pub fn resolve(
    mut entities: Vec<EntityDescriptor>,
    decls: &[EntityDecl],
    naming: &NamingOptions,
) -> Result<Metamodel> {
    let (associations, join_tables) = {
        let mut resolver = Resolver::new(&entities, decls, naming);
        resolver.check_targets()?;
        resolver.resolve_many_to_ones()?;
        resolver.resolve_one_to_manys()?;
        resolver.check_declared_inverses()?;
        resolver.resolve_many_to_manys()?;
        resolver.assemble()?
    };

    for (entity, assocs) in entities.iter_mut().zip(associations) {
        entity.associations = assocs;
    }
    check_tables(&entities, &join_tables)?;

    let all: Vec<&AssociationDescriptor> = entities.iter().flat_map(|e| &e.associations).collect();
    let graph = RelationshipGraph::new(&all, entities.len());
    debug!(
        associations = all.len(),
        bidirectional = graph.pairs().len(),
        join_tables = join_tables.len(),
        cycles = graph.cycles().len(),
        "Resolved associations"
    );
    Ok(Metamodel::new(entities, join_tables, graph))
}

/// Resolution of one many-to-many side.
#[derive(Clone)]
struct ManyToManySide {
    owning: bool,
    partner: Option<AssociationId>,
    table: Arc<JoinTableDescriptor>,
}

struct Resolver<'a> {
    entities: &'a [EntityDescriptor],
    decls: &'a [EntityDecl],
    naming: &'a NamingOptions,
    by_name: HashMap<&'a str, EntityId>,
    /// Many-to-one keys, by owning association.
    foreign_keys: HashMap<AssociationId, Arc<ForeignKeyDescriptor>>,
    /// Many-to-one → the one-to-many that claimed it as inverse.
    claimed: HashMap<AssociationId, AssociationId>,
    /// One-to-many → its many-to-one.
    one_to_many: HashMap<AssociationId, AssociationId>,
    many_to_many: HashMap<AssociationId, ManyToManySide>,
    join_tables: Vec<Arc<JoinTableDescriptor>>,
}

impl<'a> Resolver<'a> {
    fn new(entities: &'a [EntityDescriptor], decls: &'a [EntityDecl], naming: &'a NamingOptions) -> Self {
        Self {
            entities,
            decls,
            naming,
            by_name: entities.iter().map(|e| (e.name.as_str(), e.id)).collect(),
            foreign_keys: HashMap::new(),
            claimed: HashMap::new(),
            one_to_many: HashMap::new(),
            many_to_many: HashMap::new(),
            join_tables: Vec::new(),
        }
    }

    fn decl(&self, id: AssociationId) -> &'a AssociationDecl {
        let decls = self.decls;
        &decls[id.entity.0].associations[id.index]
    }

    fn entity(&self, id: EntityId) -> &'a EntityDescriptor {
        let entities = self.entities;
        &entities[id.0]
    }

    /// Association ids of one kind, in declaration order.
    fn ids_of(&self, kind: AssociationKind) -> Vec<AssociationId> {
        self.decls
            .iter()
            .enumerate()
            .flat_map(|(e, decl)| {
                decl.associations
                    .iter()
                    .enumerate()
                    .filter(move |(_, a)| a.kind == kind)
                    .map(move |(index, _)| AssociationId {
                        entity: EntityId(e),
                        index,
                    })
            })
            .collect()
    }

    fn error(&self, kind: SchemaErrorKind, id: AssociationId, message: String) -> Error {
        SchemaError::new(kind, message)
            .entity(&self.entity(id.entity).name)
            .field(&self.decl(id).field)
            .into()
    }

    fn target(&self, id: AssociationId) -> Result<EntityId> {
        let decl = self.decl(id);
        self.by_name.get(decl.target.as_str()).copied().ok_or_else(|| {
            self.error(
                SchemaErrorKind::UnknownEntity,
                id,
                format!("association targets undeclared entity '{}'", decl.target),
            )
        })
    }

    fn check_targets(&self) -> Result<()> {
        for kind in [
            AssociationKind::ManyToOne,
            AssociationKind::OneToMany,
            AssociationKind::ManyToMany,
        ] {
            for id in self.ids_of(kind) {
                self.target(id)?;
            }
        }
        Ok(())
    }

    fn resolve_many_to_ones(&mut self) -> Result<()> {
        for id in self.ids_of(AssociationKind::ManyToOne) {
            let mut visiting = Vec::new();
            self.many_to_one_key(id, &mut visiting)?;
        }
        Ok(())
    }

    /// Identifier columns of an entity, resolving association keys through
    /// their many-to-ones.
    fn key_columns(&mut self, entity: EntityId, visiting: &mut Vec<EntityId>) -> Result<Vec<ColumnDescriptor>> {
        let descriptor = self.entity(entity);
        match &descriptor.identifier {
            IdentifierDescriptor::AssociationKey(fields) => {
                if visiting.contains(&entity) {
                    return Err(SchemaError::new(
                        SchemaErrorKind::RequiredForeignKeyCycle,
                        "association container keys reference each other",
                    )
                    .entity(&descriptor.name)
                    .into());
                }
                visiting.push(entity);
                let decls = self.decls;
                let decl = &decls[entity.0];
                let mut columns = Vec::new();
                for field in fields {
                    if let Some(index) = decl.associations.iter().position(|a| &a.field == field) {
                        let fk = self.many_to_one_key(AssociationId { entity, index }, visiting)?;
                        columns.extend(fk.columns.iter().map(|c| c.column.clone()));
                    }
                }
                visiting.pop();
                Ok(columns)
            }
            other => Ok(other.own_columns().to_vec()),
        }
    }

    fn many_to_one_key(&mut self, id: AssociationId, visiting: &mut Vec<EntityId>) -> Result<Arc<ForeignKeyDescriptor>> {
        if let Some(fk) = self.foreign_keys.get(&id) {
            return Ok(Arc::clone(fk));
        }
        let owner = self.entity(id.entity);
        let decl = self.decl(id);
        let target = self.target(id)?;
        let key = self.key_columns(target, visiting)?;

        if !decl.join_columns.is_empty() && decl.join_columns.len() != key.len() {
            return Err(self.error(
                SchemaErrorKind::InvalidComposite,
                id,
                format!(
                    "{} join columns given but '{}' has {} identifier columns",
                    decl.join_columns.len(),
                    decl.target,
                    key.len()
                ),
            ));
        }

        let nullable = decl.optional && !owner.is_key_association(&decl.field);
        let mut columns = Vec::with_capacity(key.len());
        for (j, key_col) in key.iter().enumerate() {
            let name = decl.join_columns.get(j).cloned().unwrap_or_else(|| {
                format!("{}{}{}", decl.field, self.naming.fk_separator, key_col.column)
            });
            self.check_name(id, &name)?;
            columns.push(ForeignKeyColumn {
                column: ColumnDescriptor {
                    field: decl.field.clone(),
                    column: name,
                    semantic: key_col.semantic.clone().with_nullable(nullable),
                    default: None,
                    type_override: key_col.type_override.clone(),
                    unique: false,
                },
                references: key_col.column.clone(),
            });
        }

        let fk = Arc::new(ForeignKeyDescriptor {
            table: owner.table.clone(),
            referenced_table: self.entity(target).table.clone(),
            referenced_entity: target,
            columns,
            nullable,
        });
        trace!(
            entity = %owner.name,
            field = %decl.field,
            target = %decl.target,
            nullable,
            "Resolved many-to-one key"
        );
        self.foreign_keys.insert(id, Arc::clone(&fk));
        Ok(fk)
    }

    fn check_name(&self, id: AssociationId, name: &str) -> Result<()> {
        if is_valid_identifier(name) {
            Ok(())
        } else {
            Err(self.error(
                SchemaErrorKind::InvalidIdentifier,
                id,
                format!("'{name}' is not a valid column or table name"),
            ))
        }
    }

    fn resolve_one_to_manys(&mut self) -> Result<()> {
        for id in self.ids_of(AssociationKind::OneToMany) {
            let owner = self.entity(id.entity);
            let decl = self.decl(id);
            let target = self.target(id)?;
            let decls = self.decls;
            let target_decl = &decls[target.0];

            let points_back =
                |m: &AssociationDecl| m.kind == AssociationKind::ManyToOne && m.target == owner.name;
            let mut candidates: Vec<usize> = target_decl
                .associations
                .iter()
                .enumerate()
                .filter(|(_, m)| {
                    points_back(*m)
                        && (decl.mapped_by.as_deref() == Some(m.field.as_str())
                            || m.inverse.as_deref() == Some(decl.field.as_str()))
                })
                .map(|(j, _)| j)
                .collect();
            if candidates.is_empty() && decl.mapped_by.is_none() {
                candidates = target_decl
                    .associations
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| points_back(*m) && m.inverse.is_none())
                    .map(|(j, _)| j)
                    .collect();
            }

            let index = match candidates.as_slice() {
                [] => {
                    return Err(self.error(
                        SchemaErrorKind::UnresolvedInverse,
                        id,
                        format!(
                            "no many-to-one on '{}' refers back to '{}'{}",
                            decl.target,
                            owner.name,
                            decl.mapped_by
                                .as_ref()
                                .map(|m| format!(" through '{m}'"))
                                .unwrap_or_default()
                        ),
                    ));
                }
                [only] => *only,
                many => {
                    let names: Vec<&str> = many
                        .iter()
                        .map(|j| target_decl.associations[*j].field.as_str())
                        .collect();
                    return Err(self.error(
                        SchemaErrorKind::AmbiguousInverse,
                        id,
                        format!(
                            "several many-to-ones on '{}' could be the inverse: {}",
                            decl.target,
                            names.join(", ")
                        ),
                    ));
                }
            };

            let inverse = AssociationId {
                entity: target,
                index,
            };
            if let Some(previous) = self.claimed.insert(inverse, id) {
                let other = self.entity(previous.entity);
                return Err(self.error(
                    SchemaErrorKind::AmbiguousInverse,
                    id,
                    format!(
                        "'{}.{}' is already the inverse of '{}.{}'",
                        decl.target,
                        target_decl.associations[index].field,
                        other.name,
                        self.decl(previous).field
                    ),
                ));
            }
            self.one_to_many.insert(id, inverse);
            trace!(
                entity = %owner.name,
                field = %decl.field,
                inverse = %target_decl.associations[index].field,
                "Resolved one-to-many inverse"
            );
        }
        Ok(())
    }

    /// A many-to-one naming an `inverse` must have been claimed by exactly
    /// that one-to-many.
    fn check_declared_inverses(&self) -> Result<()> {
        for id in self.ids_of(AssociationKind::ManyToOne) {
            let decl = self.decl(id);
            let Some(inverse_name) = &decl.inverse else {
                continue;
            };
            let claimed_by = self
                .claimed
                .get(&id)
                .map(|o2m| self.decl(*o2m).field.as_str());
            if claimed_by != Some(inverse_name.as_str()) {
                return Err(self.error(
                    SchemaErrorKind::UnresolvedInverse,
                    id,
                    format!(
                        "declares inverse '{}.{}' but no such one-to-many maps to it",
                        decl.target, inverse_name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn resolve_many_to_manys(&mut self) -> Result<()> {
        let ids = self.ids_of(AssociationKind::ManyToMany);

        let mut partners: HashMap<AssociationId, AssociationId> = HashMap::new();
        for &id in &ids {
            let decl = self.decl(id);
            let Some(name) = decl.mapped_by.as_ref().or(decl.inverse.as_ref()) else {
                continue;
            };
            let owner = self.entity(id.entity);
            let target = self.target(id)?;
            let decls = self.decls;
            let partner = decls[target.0]
                .associations
                .iter()
                .position(|m| {
                    &m.field == name
                        && m.kind == AssociationKind::ManyToMany
                        && m.target == owner.name
                })
                .map(|index| AssociationId {
                    entity: target,
                    index,
                })
                .filter(|p| *p != id)
                .ok_or_else(|| {
                    self.error(
                        SchemaErrorKind::UnresolvedInverse,
                        id,
                        format!("no many-to-many '{}.{}' refers back", decl.target, name),
                    )
                })?;
            for (a, b) in [(id, partner), (partner, id)] {
                match partners.get(&a) {
                    Some(existing) if *existing != b => {
                        return Err(self.error(
                            SchemaErrorKind::AmbiguousInverse,
                            a,
                            "many-to-many is paired with more than one association".to_string(),
                        ));
                    }
                    _ => {
                        partners.insert(a, b);
                    }
                }
            }
        }

        for &id in &ids {
            let partner = partners.get(&id).copied();
            if let Some(owner_id) = partner.filter(|p| *p < id) {
                let owner_side = self.many_to_many.get(&owner_id).cloned().ok_or_else(|| {
                    self.error(
                        SchemaErrorKind::UnresolvedInverse,
                        id,
                        "owning side of many-to-many was not resolved".to_string(),
                    )
                })?;
                self.many_to_many.insert(
                    id,
                    ManyToManySide {
                        owning: false,
                        partner: Some(owner_id),
                        table: owner_side.table,
                    },
                );
                continue;
            }

            let table = Arc::new(self.join_table(id, partner)?);
            self.join_tables.push(Arc::clone(&table));
            self.many_to_many.insert(
                id,
                ManyToManySide {
                    owning: true,
                    partner,
                    table,
                },
            );
        }
        Ok(())
    }

    fn join_table(&mut self, id: AssociationId, partner: Option<AssociationId>) -> Result<JoinTableDescriptor> {
        let decl = self.decl(id);
        let partner_decl = partner.map(|p| self.decl(p));
        let owner = self.entity(id.entity);
        let target_id = self.target(id)?;
        let target = self.entity(target_id);
        let sep = self.naming.fk_separator.clone();

        let name = decl
            .join_table
            .clone()
            .or_else(|| partner_decl.and_then(|p| p.join_table.clone()))
            .unwrap_or_else(|| format!("{}_{}", owner.table, target.table));
        self.check_name(id, &name)?;

        let owner_overrides = if decl.join_columns.is_empty() {
            partner_decl.map(|p| p.inverse_join_columns.clone()).unwrap_or_default()
        } else {
            decl.join_columns.clone()
        };
        let target_overrides = if decl.inverse_join_columns.is_empty() {
            partner_decl.map(|p| p.join_columns.clone()).unwrap_or_default()
        } else {
            decl.inverse_join_columns.clone()
        };

        let owner_prefix = to_snake_case(&owner.name);
        // both sides of a self-referencing join table would collide on the entity name
        let target_prefix = if target_id == id.entity {
            decl.field.clone()
        } else {
            to_snake_case(&target.name)
        };

        let mut visiting = Vec::new();
        let owner_key = self.key_columns(id.entity, &mut visiting)?;
        let target_key = self.key_columns(target_id, &mut visiting)?;

        let owner_fk = self.join_side(id, &name, owner, &owner_key, &owner_overrides, &owner_prefix, &sep)?;
        let target_fk = self.join_side(id, &name, target, &target_key, &target_overrides, &target_prefix, &sep)?;

        let mut seen = HashSet::new();
        for column in owner_fk.column_names().chain(target_fk.column_names()) {
            if !seen.insert(column.to_string()) {
                return Err(self.error(
                    SchemaErrorKind::DuplicateField,
                    id,
                    format!("join table '{name}' maps column '{column}' twice"),
                ));
            }
        }

        trace!(
            entity = %owner.name,
            field = %decl.field,
            join_table = %name,
            "Synthesized join table"
        );
        Ok(JoinTableDescriptor {
            name,
            owner: owner_fk,
            target: target_fk,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn join_side(
        &self,
        id: AssociationId,
        table: &str,
        referenced: &EntityDescriptor,
        key: &[ColumnDescriptor],
        overrides: &[String],
        prefix: &str,
        sep: &str,
    ) -> Result<ForeignKeyDescriptor> {
        if !overrides.is_empty() && overrides.len() != key.len() {
            return Err(self.error(
                SchemaErrorKind::InvalidComposite,
                id,
                format!(
                    "{} join columns given but '{}' has {} identifier columns",
                    overrides.len(),
                    referenced.name,
                    key.len()
                ),
            ));
        }
        let mut columns = Vec::with_capacity(key.len());
        for (j, key_col) in key.iter().enumerate() {
            let name = overrides
                .get(j)
                .cloned()
                .unwrap_or_else(|| format!("{prefix}{sep}{}", key_col.column));
            self.check_name(id, &name)?;
            columns.push(ForeignKeyColumn {
                column: ColumnDescriptor {
                    field: name.clone(),
                    column: name,
                    semantic: key_col.semantic.clone().with_nullable(false),
                    default: None,
                    type_override: key_col.type_override.clone(),
                    unique: false,
                },
                references: key_col.column.clone(),
            });
        }
        Ok(ForeignKeyDescriptor {
            table: table.to_string(),
            referenced_table: referenced.table.clone(),
            referenced_entity: referenced.id,
            columns,
            nullable: false,
        })
    }

    /// Association descriptors per entity, plus join tables.
    fn assemble(self) -> Result<(Vec<Vec<AssociationDescriptor>>, Vec<Arc<JoinTableDescriptor>>)> {
        let mut all = Vec::with_capacity(self.decls.len());
        for (e, decl) in self.decls.iter().enumerate() {
            let mut assocs = Vec::with_capacity(decl.associations.len());
            for (index, a) in decl.associations.iter().enumerate() {
                let id = AssociationId {
                    entity: EntityId(e),
                    index,
                };
                let target = self.target(id)?;
                let (owning_side, inverse, physical) = match a.kind {
                    AssociationKind::ManyToOne => {
                        let fk = self.foreign_keys.get(&id).cloned().ok_or_else(|| {
                            self.error(SchemaErrorKind::UnresolvedInverse, id, "unresolved key".into())
                        })?;
                        (true, self.claimed.get(&id).copied(), Physical::ForeignKey(fk))
                    }
                    AssociationKind::OneToMany => {
                        let inverse = self.one_to_many.get(&id).copied().ok_or_else(|| {
                            self.error(SchemaErrorKind::UnresolvedInverse, id, "unresolved inverse".into())
                        })?;
                        let fk = self.foreign_keys.get(&inverse).cloned().ok_or_else(|| {
                            self.error(SchemaErrorKind::UnresolvedInverse, id, "unresolved key".into())
                        })?;
                        (false, Some(inverse), Physical::ForeignKey(fk))
                    }
                    AssociationKind::ManyToMany => {
                        let side = self.many_to_many.get(&id).cloned().ok_or_else(|| {
                            self.error(SchemaErrorKind::UnresolvedInverse, id, "unresolved join table".into())
                        })?;
                        (side.owning, side.partner, Physical::JoinTable(side.table))
                    }
                };
                assocs.push(AssociationDescriptor {
                    id,
                    field: a.field.clone(),
                    kind: a.kind,
                    target,
                    owning_side,
                    optional: a.kind != AssociationKind::ManyToOne || a.optional,
                    inverse,
                    physical,
                });
            }
            all.push(assocs);
        }
        Ok((all, self.join_tables))
    }
}

/// Table names are unique across entities and join tables, and every entity
/// table maps each column once.
fn check_tables(entities: &[EntityDescriptor], join_tables: &[Arc<JoinTableDescriptor>]) -> Result<()> {
    let mut tables = HashSet::new();
    let names = entities
        .iter()
        .map(|e| (e.table.as_str(), e.name.as_str()))
        .chain(join_tables.iter().map(|j| (j.name.as_str(), j.name.as_str())));
    for (table, owner) in names {
        if !tables.insert(table) {
            return Err(SchemaError::new(
                SchemaErrorKind::DuplicateEntity,
                format!("table '{table}' is generated more than once"),
            )
            .entity(owner)
            .into());
        }
    }

    for entity in entities {
        let mut columns = HashSet::new();
        for col in entity.table_columns() {
            if !columns.insert(col.column.as_str()) {
                return Err(SchemaError::new(
                    SchemaErrorKind::DuplicateField,
                    format!("column '{}' is mapped more than once", col.column),
                )
                .entity(&entity.name)
                .field(&col.field)
                .into());
            }
        }
    }
    Ok(())
}
