//!
//! # Properties Repository
//!
//! Interns property *names* and property *sets* into small integer ids, so
//! shapes, instances, and cells can carry annotations at the cost of a
//! single id. Interning is append-only: ids stay valid for the repository's
//! lifetime, and re-interning equal content yields equal ids.
//!

// Std-Lib
use std::collections::{BTreeMap, HashMap};

// Crates.io
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Id of an interned property name
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct PropNameId(pub usize);

/// Id of an interned property set
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct PropertiesId(pub usize);

/// # Property Value
///
/// The value half of a property entry. Decimal values use
/// [rust_decimal::Decimal], keeping them exact, hashable, and orderable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropValue {
    Int(i64),
    /// A pair of ids, e.g. (device, terminal)
    IntPair(i64, i64),
    Str(String),
    Decimal(Decimal),
}

/// An interned set of (name, value) pairs
pub type PropertySet = BTreeMap<PropNameId, PropValue>;

/// # Properties Repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertiesRepository {
    /// Interned names, by id
    names: Vec<String>,
    /// Name => id lookup
    name_ids: HashMap<String, PropNameId>,
    /// Interned sets, by id
    sets: Vec<PropertySet>,
    /// Set => id lookup
    set_ids: HashMap<PropertySet, PropertiesId>,
}
impl PropertiesRepository {
    /// Intern `name`, returning its id. Idempotent.
    pub fn prop_name_id(&mut self, name: impl Into<String>) -> PropNameId {
        let name = name.into();
        if let Some(id) = self.name_ids.get(&name) {
            return *id;
        }
        let id = PropNameId(self.names.len());
        self.names.push(name.clone());
        self.name_ids.insert(name, id);
        id
    }
    /// Get the name for `id`, if interned
    pub fn prop_name(&self, id: PropNameId) -> Option<&str> {
        self.names.get(id.0).map(|s| s.as_str())
    }
    /// Look up an already-interned name without interning it
    pub fn find_prop_name_id(&self, name: &str) -> Option<PropNameId> {
        self.name_ids.get(name).copied()
    }
    /// Intern the property set `set`, returning its id. Idempotent.
    pub fn properties_id(&mut self, set: PropertySet) -> PropertiesId {
        if let Some(id) = self.set_ids.get(&set) {
            return *id;
        }
        let id = PropertiesId(self.sets.len());
        self.sets.push(set.clone());
        self.set_ids.insert(set, id);
        id
    }
    /// Get the property set for `id`, if interned
    pub fn properties(&self, id: PropertiesId) -> Option<&PropertySet> {
        self.sets.get(id.0)
    }
    /// Get the value stored under `name` in set `id`, if any
    pub fn value(&self, id: PropertiesId, name: PropNameId) -> Option<&PropValue> {
        self.properties(id).and_then(|set| set.get(&name))
    }
}
