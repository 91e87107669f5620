//! Event dispatch: rule selection and per-entity firing.

use fnv::FnvHashMap;
use rand::rngs::StdRng;

use crate::entity::Store;
use crate::machine::{eval, exec, Context, Result};
use crate::model::{RuleModel, SimModel};
use crate::sim::{DebugCallback, DebugNotification, EventRef, RuleRef};
use crate::timeline::{ScheduledEvent, Timeline};
use crate::EntityId;

/// Dispatches one popped event: for every rule triggered by the event
/// type, in IR declaration order, resolves the target entity set and
/// fires the rule once per entity in store insertion order.
pub(crate) fn dispatch_event(
    model: &SimModel,
    store: &mut Store,
    timeline: &mut Timeline,
    rng: &mut StdRng,
    event: &ScheduledEvent,
    debug: bool,
    debug_observers: &mut Vec<DebugCallback>,
) -> Result<()> {
    let rule_idxs = model.rules_for_event(&event.event_type).to_vec();
    for rule_n in rule_idxs {
        let rule = &model.rules[rule_n];
        let firings = match select_entities(rule, event, store) {
            FiringSet::PerEntity(entities) => entities.into_iter().map(Some).collect(),
            FiringSet::Global => vec![event.source],
        };
        for entity in firings {
            let mut ctx = Context::new(model, rng);
            if let Some(entity) = entity {
                ctx.bindings.insert("entity".to_string(), entity);
            }
            populate_trigger_bindings(rule, event, &mut ctx.bindings);
            ctx.params = event
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();

            if let Some(condition) = &rule.condition {
                let passed = eval::eval(condition, &mut ctx, store)
                    .map_err(|e| e.with_context(&rule.name, &event.event_type))?
                    .to_bool();
                if !passed {
                    continue;
                }
            }

            if debug {
                notify(
                    debug_observers,
                    &DebugNotification::RuleStart {
                        rule: RuleRef {
                            id: rule.id,
                            name: rule.name.clone(),
                        },
                        event: EventRef {
                            id: event.id,
                            event_type: event.event_type.clone(),
                        },
                        // TODO carry per-rule source spans once the
                        // compiler emits them in the IR
                        source_location: None,
                    },
                );
            }

            exec::execute(&rule.actions, &mut ctx, store, timeline)
                .map_err(|e| e.with_context(&rule.name, &event.event_type))?;

            if debug {
                notify(
                    debug_observers,
                    &DebugNotification::RuleEnd {
                        rule: RuleRef {
                            id: rule.id,
                            name: rule.name.clone(),
                        },
                        event: EventRef {
                            id: event.id,
                            event_type: event.event_type.clone(),
                        },
                    },
                );
            }
        }
    }
    Ok(())
}

/// The firings a rule produces for one event.
enum FiringSet {
    /// Fire once per listed entity, in store insertion order.
    PerEntity(Vec<EntityId>),
    /// Fire exactly once; the rule addresses entities explicitly in its
    /// body (queries, bindings) rather than through dispatch.
    Global,
}

/// Resolves the set of entities a rule fires against, in precedence
/// order:
///
/// 1. a trigger binding to `source` pins the set to the event source,
///    provided it passes the component filter;
/// 2. otherwise any trigger binding naming a numeric event field pins
///    the set to that entity, same filter proviso;
/// 3. otherwise a non-empty component filter selects by store query;
/// 4. a rule with neither bindings nor filter fires once per event.
fn select_entities(rule: &RuleModel, event: &ScheduledEvent, store: &Store) -> FiringSet {
    if rule.bindings.values().any(|source| source == "source") {
        if let Some(source) = event.source {
            if store.has_all_components(source, &rule.filter) {
                return FiringSet::PerEntity(vec![source]);
            }
        }
        return FiringSet::PerEntity(Vec::new());
    }

    if !rule.bindings.is_empty() {
        for source in rule.bindings.values() {
            let candidate = match source.as_str() {
                "target" => event.target,
                field => event.fields.get(field).and_then(|v| v.as_entity()),
            };
            if let Some(id) = candidate {
                if store.has_all_components(id, &rule.filter) {
                    return FiringSet::PerEntity(vec![id]);
                }
                return FiringSet::PerEntity(Vec::new());
            }
        }
        return FiringSet::PerEntity(Vec::new());
    }

    if !rule.filter.is_empty() {
        return FiringSet::PerEntity(store.query(&rule.filter));
    }

    FiringSet::Global
}

/// Populates trigger bindings for one firing: `source` and `target`
/// resolve to the event's dedicated slots, anything else to a numeric
/// event field interpreted as an entity id.
fn populate_trigger_bindings(
    rule: &RuleModel,
    event: &ScheduledEvent,
    bindings: &mut FnvHashMap<String, EntityId>,
) {
    for (variable, source) in &rule.bindings {
        let resolved = match source.as_str() {
            "source" => event.source,
            "target" => event.target,
            field => event.fields.get(field).and_then(|v| v.as_entity()),
        };
        if let Some(id) = resolved {
            bindings.insert(variable.clone(), id);
        }
    }
}

fn notify(observers: &mut Vec<DebugCallback>, notification: &DebugNotification) {
    for observer in observers.iter_mut() {
        observer(notification);
    }
}
