//! Table creation order.
//!
//! Entities are ordered so every referenced table precedes the tables that
//! reference it. Required foreign keys must form a DAG; nullable ones may
//! close a cycle, which is broken at the lowest declaration index.

use crate::table::TableDescriptor;
use ormgen_core::{AssociationId, EntityId, Metamodel, Result, SchemaError, SchemaErrorKind};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, trace, warn};

/// A foreign key seen as an ordering constraint: `from` references `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dependency {
    from: EntityId,
    to: EntityId,
    required: bool,
    association: AssociationId,
}

/// Entity creation order plus the foreign keys that point forward in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationOrder {
    pub entities: Vec<EntityId>,
    /// Nullable many-to-ones whose target is created after their table.
    pub deferred: Vec<AssociationId>,
}

impl CreationOrder {
    pub fn position(&self, id: EntityId) -> Option<usize> {
        self.entities.iter().position(|e| *e == id)
    }
}

fn dependencies(model: &Metamodel) -> Vec<Dependency> {
    model
        .entities()
        .iter()
        .flat_map(|entity| entity.many_to_ones())
        .filter(|assoc| assoc.target != assoc.id.entity)
        .filter_map(|assoc| {
            assoc.foreign_key().map(|fk| Dependency {
                from: assoc.id.entity,
                to: assoc.target,
                required: !fk.nullable,
                association: assoc.id,
            })
        })
        .collect()
}

/// Compute the creation order for every entity table.
///
/// # Errors
///
/// `RequiredForeignKeyCycle` naming the entities on the first cycle found
/// through non-nullable foreign keys.
#[tracing::instrument(level = "debug", skip_all, fields(entities = model.entities().len()))]
#[allow(clippy::result_large_err)]
pub fn creation_order(model: &Metamodel) -> Result<CreationOrder> {
    let count = model.entities().len();
    let deps = dependencies(model);

    check_required_cycles(model, &deps, count)?;

    let mut placed = vec![false; count];
    let mut order = CreationOrder::default();

    while order.entities.len() < count {
        // lowest index whose outstanding dependencies are all placed
        let pending = |id: usize, required_only: bool| {
            deps.iter().any(|d| {
                d.from.0 == id && !placed[d.to.0] && (d.required || !required_only)
            })
        };
        let ready = (0..count).find(|&i| !placed[i] && !pending(i, false));
        let next = match ready {
            Some(i) => i,
            None => {
                // only nullable edges remain blocking; the required graph is
                // acyclic so some entity has none outstanding
                let Some(i) = (0..count).find(|&i| !placed[i] && !pending(i, true)) else {
                    break;
                };
                for dep in deps.iter().filter(|d| d.from.0 == i && !placed[d.to.0]) {
                    warn!(
                        entity = %model.entity(dep.from).name,
                        references = %model.entity(dep.to).name,
                        "Breaking nullable foreign key cycle; constraint will be added after both tables exist"
                    );
                    order.deferred.push(dep.association);
                }
                i
            }
        };
        trace!(entity = %model.entity(EntityId(next)).name, position = order.entities.len(), "Placed table");
        placed[next] = true;
        order.entities.push(EntityId(next));
    }

    debug!(
        tables = order.entities.len(),
        deferred = order.deferred.len(),
        "Computed table creation order"
    );
    Ok(order)
}

#[allow(clippy::result_large_err)]
fn check_required_cycles(model: &Metamodel, deps: &[Dependency], count: usize) -> Result<()> {
    let mut adjacency: Vec<Vec<EntityId>> = vec![Vec::new(); count];
    for dep in deps.iter().filter(|d| d.required) {
        if !adjacency[dep.from.0].contains(&dep.to) {
            adjacency[dep.from.0].push(dep.to);
        }
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for start in 0..count {
        let start = EntityId(start);
        if !visited.contains(&start)
            && detect_cycle_dfs(start, &adjacency, &mut visited, &mut rec_stack, &mut path)
        {
            // path ends with the entity closing the cycle
            let Some(&closing) = path.last() else {
                continue;
            };
            let begin = path.iter().position(|e| *e == closing).unwrap_or(0);
            let names: Vec<&str> = path[begin..]
                .iter()
                .map(|id| model.entity(*id).name.as_str())
                .collect();
            return Err(SchemaError::new(
                SchemaErrorKind::RequiredForeignKeyCycle,
                format!("required foreign keys form a cycle: {}", names.join(" -> ")),
            )
            .entity(names[0])
            .into());
        }
    }
    Ok(())
}

fn detect_cycle_dfs(
    node: EntityId,
    adjacency: &[Vec<EntityId>],
    visited: &mut HashSet<EntityId>,
    rec_stack: &mut HashSet<EntityId>,
    path: &mut Vec<EntityId>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &next in &adjacency[node.0] {
        if !visited.contains(&next) {
            if detect_cycle_dfs(next, adjacency, visited, rec_stack, path) {
                return true;
            }
        } else if rec_stack.contains(&next) {
            path.push(next);
            return true;
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

/// Every table of the model laid out by `order` (from [`creation_order`]):
/// entity tables first, then join tables in declaration order.
///
/// Foreign keys that point forward in the order are marked deferred.
pub fn generate_tables(model: &Metamodel, order: &CreationOrder) -> Vec<TableDescriptor> {
    let deferred_fks: BTreeSet<(String, Vec<String>)> = order
        .deferred
        .iter()
        .filter_map(|id| model.association(*id).foreign_key())
        .map(|fk| (fk.table.clone(), fk.column_names().map(str::to_string).collect()))
        .collect();

    let mut tables: Vec<TableDescriptor> = order
        .entities
        .iter()
        .map(|id| {
            let mut table = TableDescriptor::for_entity(model.entity(*id));
            for fk in &mut table.foreign_keys {
                fk.deferred = deferred_fks.contains(&(table.name.clone(), fk.columns.clone()));
            }
            table
        })
        .collect();
    tables.extend(
        model
            .join_tables()
            .iter()
            .map(|join| TableDescriptor::for_join_table(join)),
    );
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormgen_core::{
        AssociationDecl, ConverterRegistry, EntityDecl, FieldDecl, IdentifierDecl, NamingOptions,
        SqlType,
    };

    fn entity(name: &str) -> EntityDecl {
        EntityDecl::new(name)
            .identifier(IdentifierDecl::generated("id", SqlType::BigInt))
            .field(FieldDecl::new("label", SqlType::Text))
    }

    fn analyze(decls: &[EntityDecl]) -> Metamodel {
        Metamodel::analyze(decls, &ConverterRegistry::new(), &NamingOptions::default()).unwrap()
    }

    fn names(model: &Metamodel, order: &CreationOrder) -> Vec<String> {
        order
            .entities
            .iter()
            .map(|id| model.entity(*id).name.clone())
            .collect()
    }

    #[test]
    fn test_referenced_before_referencing() {
        let model = analyze(&[
            entity("Line").association(AssociationDecl::many_to_one("order", "Order")),
            entity("Order").association(AssociationDecl::many_to_one("customer", "Customer")),
            entity("Customer"),
        ]);
        let order = creation_order(&model).unwrap();
        assert_eq!(names(&model, &order), ["Customer", "Order", "Line"]);
        assert!(order.deferred.is_empty());
    }

    #[test]
    fn test_independent_tables_keep_declaration_order() {
        let model = analyze(&[entity("B"), entity("A"), entity("C")]);
        let order = creation_order(&model).unwrap();
        assert_eq!(names(&model, &order), ["B", "A", "C"]);
    }

    #[test]
    fn test_self_reference_does_not_constrain() {
        let model = analyze(&[entity("Employee")
            .association(AssociationDecl::many_to_one("manager", "Employee").optional())]);
        let order = creation_order(&model).unwrap();
        assert_eq!(names(&model, &order), ["Employee"]);
        assert!(order.deferred.is_empty());
    }

    #[test]
    fn test_required_cycle_rejected() {
        let model = analyze(&[
            entity("A").association(AssociationDecl::many_to_one("b", "B")),
            entity("B").association(AssociationDecl::many_to_one("a", "A")),
        ]);
        let err = creation_order(&model).unwrap_err();
        assert_eq!(err.schema_kind(), Some(SchemaErrorKind::RequiredForeignKeyCycle));
        assert!(err.to_string().contains("A -> B -> A"), "{err}");
        assert_eq!(err.entity(), Some("A"));
    }

    #[test]
    fn test_indirect_required_cycle_rejected() {
        let model = analyze(&[
            entity("A"),
            entity("B").association(AssociationDecl::many_to_one("c", "C")),
            entity("C").association(AssociationDecl::many_to_one("d", "D")),
            entity("D").association(AssociationDecl::many_to_one("b", "B")),
        ]);
        let err = creation_order(&model).unwrap_err();
        assert!(err.to_string().contains("B -> C -> D -> B"), "{err}");
    }

    #[test]
    fn test_nullable_cycle_broken_by_declaration_order() {
        let model = analyze(&[
            entity("Department")
                .association(AssociationDecl::many_to_one("head", "Employee").optional()),
            entity("Employee").association(AssociationDecl::many_to_one("department", "Department")),
        ]);
        let order = creation_order(&model).unwrap();
        assert_eq!(names(&model, &order), ["Department", "Employee"]);
        assert_eq!(order.deferred.len(), 1);
        assert_eq!(model.association(order.deferred[0]).field, "head");
    }

    #[test]
    fn test_generate_tables_marks_deferred_and_appends_join_tables() {
        let model = analyze(&[
            entity("Department")
                .association(AssociationDecl::many_to_one("head", "Employee").optional()),
            entity("Employee")
                .association(AssociationDecl::many_to_one("department", "Department"))
                .association(AssociationDecl::many_to_many("skills", "Skill")),
            entity("Skill"),
        ]);
        let order = creation_order(&model).unwrap();
        let tables = generate_tables(&model, &order);
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["departments", "employees", "skills", "employees_skills"]);
        assert!(tables[0].foreign_keys[0].deferred);
        assert!(!tables[1].foreign_keys[0].deferred);
    }
}
