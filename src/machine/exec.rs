//! Executes statement-level actions against the execution context,
//! producing store mutations and timeline insertions.
//!
//! Actions run strictly in order. There is no early return, break or
//! continue at the action level; rules express early exits through
//! nested conditionals. A breaking error aborts the remaining actions
//! of the firing but already-committed mutations are not rolled back.

use indexmap::IndexMap;

use crate::entity::{CompBag, Store};
use crate::ir::{IrAction, IrActionKind, IrLetRhs};
use crate::timeline::{ScheduleOptions, Timeline};
use crate::value::Value;
use crate::{Int, MAX_WHILE_ITERATIONS};

use super::eval::{binary_op, call_function, eval, resolve_entity_ref};
use super::{Context, Error, ErrorKind, Result};

/// Executes an ordered list of actions.
pub fn execute(
    actions: &[IrAction],
    ctx: &mut Context,
    store: &mut Store,
    timeline: &mut Timeline,
) -> Result<()> {
    for action in actions {
        execute_single(action, ctx, store, timeline)?;
    }
    Ok(())
}

/// Executes one action and returns its yield value: the event id for
/// `schedule`/`emit`, the new entity id for `spawn`/`clone`, the bound
/// value for `let`, null otherwise. The yield value is what an
/// enclosing `let` captures.
pub fn execute_single(
    action: &IrAction,
    ctx: &mut Context,
    store: &mut Store,
    timeline: &mut Timeline,
) -> Result<Value> {
    let kind = match action {
        IrAction::Known(kind) => kind,
        IrAction::Other(raw) => {
            warn!(
                "unknown action kind \"{}\", skipping",
                raw.get("type").and_then(|t| t.as_str()).unwrap_or("?")
            );
            return Ok(Value::Null);
        }
    };
    match &**kind {
        IrActionKind::Modify {
            entity,
            component,
            field,
            op,
            value,
        } => {
            let id = match resolve_entity_ref(entity, ctx, store)? {
                Some(id) => id,
                // null entity makes the whole action a no-op
                None => return Ok(Value::Null),
            };
            let rhs = eval(value, ctx, store)?;
            let new = match op.as_str() {
                "set" => rhs,
                "add" | "subtract" | "multiply" | "divide" => {
                    let current = store
                        .get_field(id, component, field)
                        .cloned()
                        .unwrap_or(Value::Int(0));
                    binary_op(op, current, rhs)
                }
                other => {
                    warn!("unknown modify op \"{}\", skipping", other);
                    return Ok(Value::Null);
                }
            };
            store.set_field(id, component, field, new)?;
            Ok(Value::Null)
        }

        IrActionKind::Schedule {
            event,
            delay,
            source,
            target,
            fields,
            recurring,
            interval,
        } => {
            let delay = match delay {
                Some(expr) => eval(expr, ctx, store)?.to_float(),
                None => 0.0,
            };
            let source = match source {
                Some(expr) => eval(expr, ctx, store)?.as_entity(),
                None => None,
            };
            let target = match target {
                Some(expr) => eval(expr, ctx, store)?.as_entity(),
                None => None,
            };
            let interval = match interval {
                Some(expr) => eval(expr, ctx, store)?.to_float(),
                None => 0.0,
            };
            if *recurring && interval <= 0.0 {
                return Err(Error::new(ErrorKind::RecurringWithoutInterval(
                    event.clone(),
                )));
            }
            let mut field_values = IndexMap::new();
            for (name, expr) in fields {
                field_values.insert(name.clone(), eval(expr, ctx, store)?);
            }
            let uid = timeline.schedule(
                event,
                delay,
                ScheduleOptions {
                    source,
                    target,
                    fields: field_values,
                    recurring: *recurring,
                    interval,
                },
            );
            Ok(Value::Int(uid as Int))
        }

        IrActionKind::Emit { event, fields } => {
            let mut field_values = IndexMap::new();
            for (name, expr) in fields {
                field_values.insert(name.clone(), eval(expr, ctx, store)?);
            }
            let uid = timeline.schedule_immediate(
                event,
                ScheduleOptions {
                    fields: field_values,
                    ..Default::default()
                },
            );
            Ok(Value::Int(uid as Int))
        }

        IrActionKind::Spawn { components } => {
            let id = store.create_entity();
            for (comp_name, field_exprs) in components.iter() {
                let mut bag = CompBag::new();
                for (field, expr) in field_exprs {
                    bag.insert(field.clone(), eval(expr, ctx, store)?);
                }
                store.add_component(id, comp_name, bag)?;
            }
            Ok(Value::Entity(id))
        }

        IrActionKind::Despawn { entity } => {
            if let Some(id) = resolve_entity_ref(entity, ctx, store)? {
                store.delete_entity(id);
            }
            Ok(Value::Null)
        }

        IrActionKind::Clone { source, overrides } => {
            let source_id = match resolve_entity_ref(source, ctx, store)? {
                Some(id) => id,
                None => {
                    warn!("clone: source resolved to null, skipping");
                    return Ok(Value::Null);
                }
            };
            let new_id = store.clone_entity(source_id, None)?;
            for (comp_name, field_exprs) in overrides {
                for (field, expr) in field_exprs {
                    let value = eval(expr, ctx, store)?;
                    store.set_field(new_id, comp_name, field, value)?;
                }
            }
            Ok(Value::Entity(new_id))
        }

        IrActionKind::Let { name, value } => {
            let bound = match value {
                IrLetRhs::Expr(expr) => eval(expr, ctx, store)?,
                IrLetRhs::Action(action) => execute_single(action, ctx, store, timeline)?,
            };
            ctx.locals.insert(name.clone(), bound.clone());
            Ok(bound)
        }

        IrActionKind::Conditional {
            condition,
            then_actions,
            else_actions,
        } => {
            if eval(condition, ctx, store)?.to_bool() {
                execute(then_actions, ctx, store, timeline)?;
            } else if let Some(actions) = else_actions {
                execute(actions, ctx, store, timeline)?;
            }
            Ok(Value::Null)
        }

        IrActionKind::Loop {
            variable,
            iterable,
            body,
        } => {
            match eval(iterable, ctx, store)? {
                Value::List(items) => {
                    for item in items {
                        ctx.locals.insert(variable.clone(), item);
                        execute(body, ctx, store, timeline)?;
                    }
                }
                other => {
                    warn!("loop: iterable evaluated to {:?}, not a list", other);
                }
            }
            Ok(Value::Null)
        }

        IrActionKind::While { condition, body } => {
            let mut iterations = 0u32;
            while eval(condition, ctx, store)?.to_bool() {
                execute(body, ctx, store, timeline)?;
                iterations += 1;
                if iterations >= MAX_WHILE_ITERATIONS {
                    warn!(
                        "while loop reached the {} iteration cap, breaking",
                        MAX_WHILE_ITERATIONS
                    );
                    break;
                }
            }
            Ok(Value::Null)
        }

        IrActionKind::Call { function, args } => {
            let mut argv = Vec::with_capacity(args.len());
            for arg in args {
                argv.push(eval(arg, ctx, store)?);
            }
            call_function(function, argv, ctx, store)?;
            Ok(Value::Null)
        }

        IrActionKind::AddComponent { entity, component } => {
            let id = match resolve_entity_ref(entity, ctx, store)? {
                Some(id) => id,
                None => return Ok(Value::Null),
            };
            let mut bag = CompBag::new();
            for (field, expr) in &component.fields {
                bag.insert(field.clone(), eval(expr, ctx, store)?);
            }
            store.add_component(id, &component.name, bag)?;
            Ok(Value::Null)
        }

        IrActionKind::RemoveComponent { entity, component } => {
            if let Some(id) = resolve_entity_ref(entity, ctx, store)? {
                store.remove_component(id, component);
            }
            Ok(Value::Null)
        }
    }
}
