//! Association descriptors and the relationship graph.
//!
//! Associations are resolved once, after every entity descriptor exists, and
//! are then read-only. Bidirectional associations are linked by
//! [`AssociationId`] rather than by live pointers: a one-to-many and the
//! many-to-one it mirrors name each other through `inverse`, and share one
//! physical [`ForeignKeyDescriptor`] through an `Arc`.

use crate::declaration::AssociationKind;
use crate::field::ColumnDescriptor;
use crate::model::EntityId;
use std::collections::HashSet;
use std::sync::Arc;

/// Index of an association: owning entity plus position in its association list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssociationId {
    pub entity: EntityId,
    pub index: usize,
}

/// One column of a foreign key.
#[derive(Debug, Clone)]
pub struct ForeignKeyColumn {
    /// The referencing column. Carries the referenced identifier's semantic
    /// type (including its converter) with this key's nullability.
    pub column: ColumnDescriptor,
    /// Referenced identifier column name.
    pub references: String,
}

/// A physical foreign key: referencing table to referenced table.
#[derive(Debug, Clone)]
pub struct ForeignKeyDescriptor {
    /// Table holding the key columns.
    pub table: String,
    pub referenced_table: String,
    /// Entity whose identifier is referenced.
    pub referenced_entity: EntityId,
    /// Columns in referenced-identifier order.
    pub columns: Vec<ForeignKeyColumn>,
    pub nullable: bool,
}

impl ForeignKeyDescriptor {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.column.column.as_str())
    }

    pub fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.references.as_str())
    }
}

/// A synthesized many-to-many join table.
///
/// Its identity is the pair of keys; it has no surrogate column.
#[derive(Debug, Clone)]
pub struct JoinTableDescriptor {
    pub name: String,
    /// Key referencing the write-owning side.
    pub owner: ForeignKeyDescriptor,
    /// Key referencing the other side.
    pub target: ForeignKeyDescriptor,
}

/// How an association is stored.
#[derive(Debug, Clone)]
pub enum Physical {
    /// Many-to-one, and the inverse one-to-many sharing its key.
    ForeignKey(Arc<ForeignKeyDescriptor>),
    JoinTable(Arc<JoinTableDescriptor>),
}

/// A resolved association.
#[derive(Debug, Clone)]
pub struct AssociationDescriptor {
    pub id: AssociationId,
    pub field: String,
    pub kind: AssociationKind,
    pub target: EntityId,
    /// Whether writes through this side maintain the physical representation.
    pub owning_side: bool,
    /// Many-to-one: the key may be NULL.
    pub optional: bool,
    /// The association on the target mirroring this one, if bidirectional.
    pub inverse: Option<AssociationId>,
    pub physical: Physical,
}

impl AssociationDescriptor {
    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            AssociationKind::OneToMany | AssociationKind::ManyToMany
        )
    }

    pub fn foreign_key(&self) -> Option<&Arc<ForeignKeyDescriptor>> {
        match &self.physical {
            Physical::ForeignKey(fk) => Some(fk),
            Physical::JoinTable(_) => None,
        }
    }

    pub fn join_table(&self) -> Option<&Arc<JoinTableDescriptor>> {
        match &self.physical {
            Physical::JoinTable(jt) => Some(jt),
            Physical::ForeignKey(_) => None,
        }
    }

    /// Join-table keys as (this side, other side).
    pub fn join_sides(&self) -> Option<(&ForeignKeyDescriptor, &ForeignKeyDescriptor)> {
        self.join_table().map(|jt| {
            if self.owning_side {
                (&jt.owner, &jt.target)
            } else {
                (&jt.target, &jt.owner)
            }
        })
    }
}

/// All resolved associations, their bidirectional pairings and the
/// reference cycles among entities.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    associations: Vec<AssociationId>,
    pairs: Vec<(AssociationId, AssociationId)>,
    cycles: Vec<Vec<EntityId>>,
}

impl RelationshipGraph {
    /// Build the graph from resolved associations.
    ///
    /// Each association contributes one reference edge from its entity to
    /// its target; cycles are found over these edges, self references included.
    pub fn new(associations: &[&AssociationDescriptor], entity_count: usize) -> Self {
        let mut pairs = Vec::new();
        for assoc in associations {
            if let Some(inverse) = assoc.inverse {
                // record each pair once, owning side first
                if assoc.owning_side {
                    pairs.push((assoc.id, inverse));
                }
            }
        }

        let mut adjacency: Vec<Vec<EntityId>> = vec![Vec::new(); entity_count];
        for assoc in associations {
            let from = assoc.id.entity;
            if !adjacency[from.0].contains(&assoc.target) {
                adjacency[from.0].push(assoc.target);
            }
        }

        Self {
            associations: associations.iter().map(|a| a.id).collect(),
            pairs,
            cycles: find_cycles(&adjacency),
        }
    }

    pub fn associations(&self) -> &[AssociationId] {
        &self.associations
    }

    /// Bidirectional pairs as (owning side, inverse side).
    pub fn pairs(&self) -> &[(AssociationId, AssociationId)] {
        &self.pairs
    }

    pub fn is_bidirectional(&self, id: AssociationId) -> bool {
        self.pairs.iter().any(|(a, b)| *a == id || *b == id)
    }

    /// Reference cycles, each listed from its first-visited entity.
    pub fn cycles(&self) -> &[Vec<EntityId>] {
        &self.cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// Every back edge found by a depth-first walk yields one cycle.
fn find_cycles(adjacency: &[Vec<EntityId>]) -> Vec<Vec<EntityId>> {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();
    let mut cycles = Vec::new();

    for start in 0..adjacency.len() {
        let start = EntityId(start);
        if !visited.contains(&start) {
            cycle_dfs(start, adjacency, &mut visited, &mut on_stack, &mut path, &mut cycles);
        }
    }
    cycles
}

fn cycle_dfs(
    node: EntityId,
    adjacency: &[Vec<EntityId>],
    visited: &mut HashSet<EntityId>,
    on_stack: &mut HashSet<EntityId>,
    path: &mut Vec<EntityId>,
    cycles: &mut Vec<Vec<EntityId>>,
) {
    visited.insert(node);
    on_stack.insert(node);
    path.push(node);

    for &next in &adjacency[node.0] {
        if !visited.contains(&next) {
            cycle_dfs(next, adjacency, visited, on_stack, path, cycles);
        } else if on_stack.contains(&next) {
            if let Some(pos) = path.iter().position(|n| *n == next) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(next);
                cycles.push(cycle);
            }
        }
    }

    on_stack.remove(&node);
    path.pop();
}
