//! Implements the runtime's rule execution capability.

pub mod error;
pub mod eval;
pub mod exec;

pub use error::{Error, ErrorKind, Result};

use fnv::FnvHashMap;
use rand::rngs::StdRng;

use crate::model::SimModel;
use crate::value::Value;
use crate::EntityId;

/// Transient execution context of a single rule firing (or a direct
/// bound-function invocation). Built by the dispatcher, discarded when
/// the firing completes.
pub struct Context<'a> {
    pub model: &'a SimModel,
    /// Rule-scoped entity bindings: variable name to entity id. Always
    /// contains `entity`, the entity currently visited by the rule.
    pub bindings: FnvHashMap<String, EntityId>,
    /// Flat local variable scope; `let` shadows by overwrite, loops
    /// rebind their iteration variable here.
    pub locals: FnvHashMap<String, Value>,
    /// Event field values, or parameter values inside a function call.
    pub params: FnvHashMap<String, Value>,
    /// Facade-owned generator, threaded through so built-in randomness
    /// stays reproducible under a fixed seed.
    pub rng: &'a mut StdRng,
}

impl<'a> Context<'a> {
    pub fn new(model: &'a SimModel, rng: &'a mut StdRng) -> Context<'a> {
        Context {
            model,
            bindings: FnvHashMap::default(),
            locals: FnvHashMap::default(),
            params: FnvHashMap::default(),
            rng,
        }
    }

    /// Resolves a variable name: locals, then entity bindings, then
    /// event params, then module constants. Unknown names resolve to
    /// null with a warning.
    pub fn resolve_var(&self, name: &str) -> Value {
        if let Some(value) = self.locals.get(name) {
            return value.clone();
        }
        if let Some(id) = self.bindings.get(name) {
            return Value::Entity(*id);
        }
        if let Some(value) = self.params.get(name) {
            return value.clone();
        }
        if let Some(value) = self.model.constants.get(name) {
            return value.clone();
        }
        warn!("unknown variable \"{}\", resolving to null", name);
        Value::Null
    }

    /// Entity held by a variable, if the variable resolves to one.
    pub fn resolve_entity_var(&self, name: &str) -> Option<EntityId> {
        if let Some(value) = self.locals.get(name) {
            return value.as_entity();
        }
        if let Some(id) = self.bindings.get(name) {
            return Some(*id);
        }
        self.params.get(name).and_then(|v| v.as_entity())
    }
}
