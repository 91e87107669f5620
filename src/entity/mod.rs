//! Defines entity structure related functionality.

mod storage;
pub use self::storage::Store;

use std::sync::Arc;

use fnv::FnvHashMap;
use indexmap::IndexMap;

use crate::ir::{IrBoundFunction, IrExpr};
use crate::model::{params_from_ir, ParamModel};
use crate::value::{Value, ValueType};
use crate::{CompName, FuncName, VarName};

/// Field record of a single component instance, in declared field order.
pub type CompBag = IndexMap<VarName, Value>;

/// Basic building block of the simulation state: an ordered bag of
/// components plus any choice functions bound to the entity.
///
/// Entities carry no intrinsic class; identity is structural. `Clone`
/// deep-copies component data while bound functions, immutable after
/// load, are shared by reference.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// All component data attached to the entity, in attach order.
    pub components: IndexMap<CompName, CompBag>,
    /// Choice functions bound to this entity, keyed by function name.
    #[serde(skip)]
    pub bound_functions: FnvHashMap<FuncName, Arc<BoundFunction>>,
}

impl Entity {
    pub fn empty() -> Entity {
        Entity::default()
    }

    pub fn get_comp(&self, name: &str) -> Option<&CompBag> {
        self.components.get(name)
    }
    pub fn get_comp_mut(&mut self, name: &str) -> Option<&mut CompBag> {
        self.components.get_mut(name)
    }
    pub fn has_comp(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }
}

/// Choice function bound to a single entity. Loaded once with its
/// entity and immutable thereafter.
#[derive(Debug, Clone)]
pub struct BoundFunction {
    pub params: Vec<ParamModel>,
    pub return_type: Option<ValueType>,
    pub body: IrExpr,
    /// Original surface source, carried for UI display.
    pub source: Option<String>,
}

impl BoundFunction {
    pub fn from_ir(ir: &IrBoundFunction) -> BoundFunction {
        BoundFunction {
            params: params_from_ir(&ir.params),
            return_type: ir.return_type.as_ref().and_then(|t| t.parse()),
            body: ir.body.clone(),
            source: ir.source.clone(),
        }
    }
}
