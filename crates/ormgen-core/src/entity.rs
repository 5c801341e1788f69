//! Runtime entity instances.
//!
//! An [`Entity`] is a dynamically shaped instance of one described entity:
//! scalar field values keyed by field name plus one [`Related`] slot per
//! association. Generated routines read and produce these; they never hold
//! live pointers between instances, so a child loaded through its parent's
//! collection simply leaves its back-reference [`Related::Unset`].

use crate::value::{IdentityKey, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// State of one association slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Related {
    /// Not loaded and not referenced.
    #[default]
    Unset,
    /// Many-to-one known only by the target's identity.
    Reference(IdentityKey),
    /// Many-to-one with the target instance attached.
    Loaded(Box<Entity>),
    /// One-to-many / many-to-many contents, in load order.
    Collection(Vec<Entity>),
}

static UNSET: Related = Related::Unset;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    name: String,
    values: HashMap<String, Value>,
    related: HashMap<String, Related>,
}

impl Entity {
    /// An empty instance of the named entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
            related: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a scalar field (builder style).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// A scalar field, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// A scalar field, NULL when absent.
    pub fn value(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set an association slot (builder style).
    pub fn with_related(mut self, field: impl Into<String>, related: Related) -> Self {
        self.set_related(field, related);
        self
    }

    pub fn set_related(&mut self, field: impl Into<String>, related: Related) {
        self.related.insert(field.into(), related);
    }

    /// Attach a many-to-one target.
    pub fn with_loaded(self, field: impl Into<String>, target: Entity) -> Self {
        self.with_related(field, Related::Loaded(Box::new(target)))
    }

    /// Reference a many-to-one target by identity.
    pub fn with_reference(self, field: impl Into<String>, key: IdentityKey) -> Self {
        self.with_related(field, Related::Reference(key))
    }

    pub fn with_collection(self, field: impl Into<String>, items: Vec<Entity>) -> Self {
        self.with_related(field, Related::Collection(items))
    }

    /// Association slot; [`Related::Unset`] when never set.
    pub fn related(&self, field: &str) -> &Related {
        self.related.get(field).unwrap_or(&UNSET)
    }

    /// Collection contents; empty unless the slot holds a collection.
    pub fn collection(&self, field: &str) -> &[Entity] {
        match self.related.get(field) {
            Some(Related::Collection(items)) => items,
            _ => &[],
        }
    }

    /// Attached many-to-one target, if loaded.
    pub fn loaded(&self, field: &str) -> Option<&Entity> {
        match self.related.get(field) {
            Some(Related::Loaded(target)) => Some(target),
            _ => None,
        }
    }
}
