//! Coalescing joined rows into nested entities.
//!
//! A join multiplies rows: one customer with two phones arrives as two rows
//! carrying the same customer columns. Grouping walks the rows once, in
//! arrival order, and for every fetch node keeps an index from
//! `(parent slot, identity)` to an arena slot. A row whose node identity was
//! already seen under the same parent reuses the slot; otherwise a new entity
//! is decoded and appended to its parent in first-seen order. Sibling paths
//! are independent dimensions, so a 2 x 3 cartesian product still yields two
//! children on one path and three on the other.

use crate::eager::FetchPlan;
use crate::mapping::EntityMapper;
use ormgen_core::{
    ConversionError, ConversionErrorKind, Entity, EntityDescriptor, Error, IdentityKey, Metamodel,
    Related, Result, Row,
};
use std::borrow::Borrow;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Entities produced by one grouping pass.
///
/// Finite and not restartable; the index structures used to build it are
/// already gone.
#[derive(Debug)]
pub struct Entities {
    inner: std::vec::IntoIter<Entity>,
}

impl Iterator for Entities {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Entities {}

impl Entities {
    pub(crate) fn new(entities: Vec<Entity>) -> Self {
        Self {
            inner: entities.into_iter(),
        }
    }
}

struct Slot {
    entity: Entity,
    /// Child slots per fetch node, in first-seen order.
    children: Vec<(usize, Vec<usize>)>,
}

impl Slot {
    fn push_child(&mut self, node: usize, slot: usize) {
        match self.children.iter_mut().find(|(n, _)| *n == node) {
            Some((_, slots)) => slots.push(slot),
            None => self.children.push((node, vec![slot])),
        }
    }
}

/// Group rows of an eager query into root entities with their included
/// associations attached.
///
/// Collections on the plan are filled in arrival order; a node whose
/// identity is NULL in a row (an outer join miss) contributes nothing, so
/// its collection stays empty. Many-to-one nodes attach the target as
/// [`Related::Loaded`]. A child never gets its back-pointer to the parent.
///
/// # Errors
///
/// `MissingColumn` when a root row has no identity, plus any decoding
/// failure from the entity mappers.
#[tracing::instrument(level = "debug", skip_all, fields(root = plan.root().alias.as_str()))]
#[allow(clippy::result_large_err)]
pub fn group_rows<I>(model: &Metamodel, plan: &FetchPlan, rows: I) -> Result<Entities>
where
    I: IntoIterator,
    I::Item: Borrow<Row>,
{
    let nodes = plan.nodes();
    let mappers: Vec<EntityMapper<'_>> = nodes
        .iter()
        .map(|node| EntityMapper::new(model, node.entity))
        .collect();
    let mut index: Vec<HashMap<(Option<usize>, IdentityKey), usize>> =
        vec![HashMap::new(); nodes.len()];
    let mut slots: Vec<Slot> = Vec::new();
    let mut roots: Vec<usize> = Vec::new();
    let mut current: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut row_count = 0usize;

    for row in rows {
        let row = row.borrow();
        row_count += 1;

        for (i, node) in nodes.iter().enumerate() {
            current[i] = None;
            let parent_slot = match node.parent {
                None => None,
                Some(p) => match current[p] {
                    Some(slot) => Some(slot),
                    None => continue,
                },
            };

            let view = if node.alias.is_empty() {
                row.plain()
            } else {
                row.aliased(&node.alias)
            };
            let identity = mappers[i].decode_identity(view)?;
            if identity.has_null() {
                if node.parent.is_none() {
                    return Err(missing_root_identity(mappers[i].descriptor(), &identity, row_count));
                }
                continue;
            }

            let key = (parent_slot, identity);
            let slot = if let Some(&existing) = index[i].get(&key) {
                existing
            } else {
                let entity = mappers[i].map_view(view, node.skip.as_deref())?;
                let slot = slots.len();
                slots.push(Slot {
                    entity,
                    children: Vec::new(),
                });
                match parent_slot {
                    Some(parent) => slots[parent].push_child(i, slot),
                    None => roots.push(slot),
                }
                trace!(node = %node.alias, slot, "New entity slot");
                index[i].insert(key, slot);
                slot
            };
            current[i] = Some(slot);
        }
    }

    let slot_count = slots.len();
    // children always occupy later slots than their parent
    let mut done: Vec<Option<Entity>> = vec![None; slot_count];
    for (s, slot) in slots.into_iter().enumerate().rev() {
        let mut entity = slot.entity;
        for (node, child_slots) in slot.children {
            let Some(via) = nodes[node].association else {
                continue;
            };
            let assoc = model.association(via);
            let items: Vec<Entity> = child_slots.iter().filter_map(|c| done[*c].take()).collect();
            if assoc.is_collection() {
                entity.set_related(&assoc.field, Related::Collection(items));
            } else if let Some(target) = items.into_iter().next() {
                entity.set_related(&assoc.field, Related::Loaded(Box::new(target)));
            }
        }
        done[s] = Some(entity);
    }

    let entities: Vec<Entity> = roots.iter().filter_map(|r| done[*r].take()).collect();
    debug!(
        rows = row_count,
        entities = entities.len(),
        slots = slot_count,
        "Grouped eager rows"
    );
    Ok(Entities::new(entities))
}

/// Names the first key column the root row left NULL.
fn missing_root_identity(desc: &EntityDescriptor, identity: &IdentityKey, row: usize) -> Error {
    let mut err = ConversionError::new(
        ConversionErrorKind::MissingColumn,
        format!("row {row} has no identifier for the query root"),
    )
    .entity(&desc.name);
    let key_columns = desc.key_columns();
    if let Some(col) = identity
        .values()
        .iter()
        .zip(&key_columns)
        .find_map(|(value, col)| value.is_null().then_some(*col))
    {
        err = err.field(&col.field).column(&col.column);
    }
    err.into()
}
