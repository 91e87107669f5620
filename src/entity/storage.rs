//! Main data store of the simulation: entity lifecycle and component
//! storage with schema-driven defaults and write coercion.

use std::sync::Arc;

use fnv::FnvHashMap;
use indexmap::IndexMap;

use crate::entity::{BoundFunction, CompBag, Entity};
use crate::error::{Error, Result};
use crate::value::{Value, ValueType};
use crate::{CompName, EntityId, FuncName, VarName};

/// Owns all entities and their components.
///
/// Entity ids are dense non-negative integers handed out by a bump
/// allocator; ids are never recycled, and reserving an explicit id
/// advances the allocator past it. Iteration-order guarantees offered
/// to callers (queries, snapshots) follow entity insertion order, which
/// is tracked separately from the backing hash map.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Store {
    entities: FnvHashMap<EntityId, Entity>,
    /// Entity ids in insertion order.
    insertion: Vec<EntityId>,
    next_id: EntityId,
    /// Per-component default field records, registered at load.
    defaults: FnvHashMap<CompName, CompBag>,
    /// Per-component declared field types, registered at load.
    field_types: FnvHashMap<CompName, FnvHashMap<VarName, ValueType>>,
}

/// Entity lifecycle.
impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// Allocates a fresh entity with the next free id.
    pub fn create_entity(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(id, Entity::empty());
        self.insertion.push(id);
        id
    }

    /// Reserves an explicit entity id, advancing the allocator past it.
    ///
    /// Reusing a live id is rejected rather than overwriting; the
    /// allocator is still advanced so implicit allocation cannot hand
    /// the contested id out again later.
    pub fn create_entity_with_id(&mut self, id: EntityId) -> Result<EntityId> {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        if self.entities.contains_key(&id) {
            return Err(Error::DuplicateEntityId(id));
        }
        self.entities.insert(id, Entity::empty());
        self.insertion.push(id);
        Ok(id)
    }

    /// Removes an entity and all its components. Returns false if the
    /// id was not live. Entity-typed fields on other entities that
    /// referenced the id are left untouched; rules are expected to
    /// guard against dangling references.
    pub fn delete_entity(&mut self, id: EntityId) -> bool {
        if self.entities.remove(&id).is_none() {
            return false;
        }
        if let Some(n) = self.insertion.iter().position(|e| *e == id) {
            self.insertion.remove(n);
        }
        true
    }

    /// Deep-copies an entity, including nested lists and maps inside
    /// component fields. Bound functions are shared by reference; their
    /// bodies are immutable after load.
    pub fn clone_entity(
        &mut self,
        source: EntityId,
        target: Option<EntityId>,
    ) -> Result<EntityId> {
        let original = self
            .entities
            .get(&source)
            .cloned()
            .ok_or(Error::NoSuchEntity(source))?;
        let new_id = match target {
            Some(id) => self.create_entity_with_id(id)?,
            None => self.create_entity(),
        };
        // Entity::clone is a deep copy of component data
        if let Some(entity) = self.entities.get_mut(&new_id) {
            *entity = original;
        }
        Ok(new_id)
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// All live entity ids in insertion order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.insertion.clone()
    }

    pub fn len(&self) -> usize {
        self.insertion.len()
    }
    pub fn is_empty(&self) -> bool {
        self.insertion.is_empty()
    }
}

/// Component schema registration, configured once at IR load.
impl Store {
    pub fn set_component_defaults(&mut self, name: &str, defaults: CompBag) {
        self.defaults.insert(name.to_string(), defaults);
    }
    pub fn set_component_field_types(
        &mut self,
        name: &str,
        types: FnvHashMap<VarName, ValueType>,
    ) {
        self.field_types.insert(name.to_string(), types);
    }
    pub fn field_type(&self, comp: &str, field: &str) -> Option<ValueType> {
        self.field_types.get(comp)?.get(field).copied()
    }
    fn default_bag(&self, comp: &str) -> CompBag {
        self.defaults.get(comp).cloned().unwrap_or_default()
    }
}

/// Component and field access.
impl Store {
    /// Attaches a component, merging supplied data over the declared
    /// defaults. An already-present component is replaced the same way.
    /// Writes go through declared-type coercion.
    pub fn add_component(&mut self, id: EntityId, comp: &str, data: CompBag) -> Result<()> {
        let mut bag = self.default_bag(comp);
        for (field, value) in data {
            let value = match self.field_type(comp, &field) {
                Some(type_) => value.coerce(type_),
                None => value,
            };
            bag.insert(field, value);
        }
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(Error::NoSuchEntity(id))?;
        entity.components.insert(comp.to_string(), bag);
        Ok(())
    }

    /// Detaches a component from an entity. Returns false if either the
    /// entity or the component was absent.
    pub fn remove_component(&mut self, id: EntityId, comp: &str) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => entity.components.shift_remove(comp).is_some(),
            None => false,
        }
    }

    /// Writes a single field, creating the component from defaults if
    /// it was absent. Integer-declared fields truncate on every write.
    pub fn set_field(
        &mut self,
        id: EntityId,
        comp: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        let value = match self.field_type(comp, field) {
            Some(type_) => value.coerce(type_),
            None => value,
        };
        let defaults = self.default_bag(comp);
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(Error::NoSuchEntity(id))?;
        let bag = entity
            .components
            .entry(comp.to_string())
            .or_insert(defaults);
        bag.insert(field.to_string(), value);
        Ok(())
    }

    pub fn get_field(&self, id: EntityId, comp: &str, field: &str) -> Option<&Value> {
        self.entities.get(&id)?.get_comp(comp)?.get(field)
    }

    pub fn get_component(&self, id: EntityId, comp: &str) -> Option<&CompBag> {
        self.entities.get(&id)?.get_comp(comp)
    }

    pub fn has_component(&self, id: EntityId, comp: &str) -> bool {
        self.entities
            .get(&id)
            .map(|e| e.has_comp(comp))
            .unwrap_or(false)
    }

    pub fn has_all_components<S: AsRef<str>>(&self, id: EntityId, comps: &[S]) -> bool {
        match self.entities.get(&id) {
            Some(entity) => comps.iter().all(|c| entity.has_comp(c.as_ref())),
            None => false,
        }
    }

    /// Ids of all entities possessing every named component, in
    /// insertion order.
    pub fn query<S: AsRef<str>>(&self, comps: &[S]) -> Vec<EntityId> {
        self.insertion
            .iter()
            .filter(|id| self.has_all_components(**id, comps))
            .copied()
            .collect()
    }
}

/// Bound choice functions.
impl Store {
    pub fn bind_function(
        &mut self,
        id: EntityId,
        name: &str,
        function: Arc<BoundFunction>,
    ) -> Result<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(Error::NoSuchEntity(id))?;
        entity.bound_functions.insert(name.to_string(), function);
        Ok(())
    }

    pub fn get_bound_function(&self, id: EntityId, name: &str) -> Option<Arc<BoundFunction>> {
        self.entities.get(&id)?.bound_functions.get(name).cloned()
    }
}

/// Whole-store views.
impl Store {
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Deep copy of the entire store in insertion order, for debugging
    /// and external observation. The structure is not a wire format.
    pub fn snapshot(&self) -> IndexMap<EntityId, Entity> {
        self.insertion
            .iter()
            .filter_map(|id| self.entities.get(id).map(|e| (*id, e.clone())))
            .collect()
    }

    /// Drops every entity. Schema registrations and the id allocator
    /// position are kept.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.insertion.clear();
    }
}
