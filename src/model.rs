//! Contains definitions for model objects, as well as logic for turning
//! a validated IR module into a runtime model.
//!
//! `SimModel` is the immutable aggregate a simulation instance is built
//! from: component schemas with resolved field types and defaults, rules
//! indexed by trigger event, module-level functions, constants and the
//! choice-point metadata carried for presentation layers. Spawning
//! anything at runtime requires a reference to the model.

use fnv::FnvHashMap;
use indexmap::IndexMap;

use crate::error::Result;
use crate::ir::{IrAction, IrChoicePoint, IrExpr, IrMetadata, IrModule, IrSourceMap};
use crate::value::{Value, ValueType};
use crate::{CompName, EventName, FuncName, VarName};

/// Runtime model built from a validated [`IrModule`].
#[derive(Debug, Clone)]
pub struct SimModel {
    /// Module name as declared in the IR.
    pub name: String,
    pub components: Vec<ComponentModel>,
    /// Rules in IR declaration order. Declaration order is the firing
    /// precedence within an event.
    pub rules: Vec<RuleModel>,
    /// Indexes of `rules` grouped by trigger event, declaration order
    /// preserved within each group.
    pub rules_by_event: FnvHashMap<EventName, Vec<usize>>,
    pub functions: FnvHashMap<FuncName, FunctionModel>,
    pub constants: IndexMap<String, Value>,
    pub choice_points: Vec<IrChoicePoint>,
    pub source_map: Option<IrSourceMap>,
    pub metadata: Option<IrMetadata>,
}

/// Component schema: ordered fields with resolved types and defaults.
#[derive(Debug, Clone)]
pub struct ComponentModel {
    pub name: CompName,
    pub fields: Vec<FieldModel>,
}

#[derive(Debug, Clone)]
pub struct FieldModel {
    pub name: VarName,
    pub type_: ValueType,
    pub default: Value,
}

#[derive(Debug, Clone)]
pub struct RuleModel {
    pub id: u32,
    pub name: String,
    pub event: EventName,
    /// Trigger bindings: variable name to `"source"`, `"target"` or an
    /// event field name.
    pub bindings: IndexMap<String, String>,
    /// Components an entity must hold to be visited by the rule.
    pub filter: Vec<CompName>,
    pub condition: Option<IrExpr>,
    pub actions: Vec<IrAction>,
}

#[derive(Debug, Clone)]
pub struct FunctionModel {
    pub name: FuncName,
    pub params: Vec<ParamModel>,
    pub return_type: Option<ValueType>,
    pub body: IrExpr,
}

#[derive(Debug, Clone)]
pub struct ParamModel {
    pub name: String,
    pub type_: Option<ValueType>,
}

impl SimModel {
    /// Builds the runtime model from a validated IR module.
    ///
    /// Rules with trigger types other than `"event"` are kept out of the
    /// event index with a warning; they never fire.
    pub fn from_ir(ir: &IrModule) -> Result<SimModel> {
        let mut model = SimModel {
            name: ir.module.clone(),
            components: Vec::new(),
            rules: Vec::new(),
            rules_by_event: FnvHashMap::default(),
            functions: FnvHashMap::default(),
            constants: IndexMap::new(),
            choice_points: ir.choice_points.clone(),
            source_map: ir.source_map.clone(),
            metadata: ir.metadata.clone(),
        };

        for ir_comp in &ir.components {
            let mut fields = Vec::new();
            for ir_field in &ir_comp.fields {
                // validate() already rejected unparseable types
                let type_ = match ir_field.type_.parse() {
                    Some(t) => t,
                    None => continue,
                };
                let default = match &ir_field.default {
                    Some(json) => Value::from_json(json).coerce(type_),
                    None => type_.default_value(),
                };
                fields.push(FieldModel {
                    name: ir_field.name.clone(),
                    type_,
                    default,
                });
            }
            model.components.push(ComponentModel {
                name: ir_comp.name.clone(),
                fields,
            });
        }

        for ir_rule in &ir.rules {
            let rule_n = model.rules.len();
            let name = ir_rule
                .name
                .clone()
                .unwrap_or_else(|| format!("rule_{}", ir_rule.id));
            if ir_rule.trigger.trigger_type != "event" {
                warn!(
                    "rule \"{}\" has unsupported trigger type \"{}\", it will never fire",
                    name, ir_rule.trigger.trigger_type
                );
            }
            let event = ir_rule.trigger.event.clone().unwrap_or_default();
            model.rules.push(RuleModel {
                id: ir_rule.id,
                name,
                event: event.clone(),
                bindings: ir_rule.trigger.bindings.clone().unwrap_or_default(),
                filter: ir_rule
                    .filter
                    .as_ref()
                    .map(|f| f.components.clone())
                    .unwrap_or_default(),
                condition: ir_rule.condition.clone(),
                actions: ir_rule.actions.clone(),
            });
            if ir_rule.trigger.trigger_type == "event" && !event.is_empty() {
                model
                    .rules_by_event
                    .entry(event)
                    .or_insert_with(Vec::new)
                    .push(rule_n);
            }
        }

        for ir_func in &ir.functions {
            model.functions.insert(
                ir_func.name.clone(),
                FunctionModel {
                    name: ir_func.name.clone(),
                    params: params_from_ir(&ir_func.params),
                    return_type: ir_func.return_type.as_ref().and_then(|t| t.parse()),
                    body: ir_func.body.clone(),
                },
            );
        }

        for (name, json) in &ir.constants {
            model.constants.insert(name.clone(), Value::from_json(json));
        }

        Ok(model)
    }
}

impl SimModel {
    /// Get reference to a component schema by name.
    pub fn get_component(&self, name: &str) -> Option<&ComponentModel> {
        self.components.iter().find(|comp| comp.name == name)
    }
    /// Get reference to a rule by name.
    pub fn get_rule(&self, name: &str) -> Option<&RuleModel> {
        self.rules.iter().find(|rule| rule.name == name)
    }
    /// Indexes into `rules` for all rules triggered by the given event,
    /// in declaration order.
    pub fn rules_for_event(&self, event: &str) -> &[usize] {
        self.rules_by_event
            .get(event)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

pub(crate) fn params_from_ir(params: &[crate::ir::IrParam]) -> Vec<ParamModel> {
    params
        .iter()
        .map(|p| ParamModel {
            name: p.name.clone(),
            type_: p.type_.parse(),
        })
        .collect()
}
