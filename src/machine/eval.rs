//! Pure evaluation of the IR expression language over an execution
//! context. Evaluation never mutates the store or the timeline; the
//! only state it touches is the context's local scope and the facade's
//! random number generator.

use fnv::FnvHashMap;
use rand::Rng;

use crate::entity::{BoundFunction, Store};
use crate::ir::{IrEntityRef, IrExpr, IrExprKind};
use crate::value::Value;
use crate::{EntityId, Float, Int};

use super::{Context, Error, ErrorKind, Result};

/// Evaluates a single expression tree node.
pub fn eval(expr: &IrExpr, ctx: &mut Context, store: &Store) -> Result<Value> {
    match expr {
        IrExpr::Known(kind) => eval_kind(kind, ctx, store),
        IrExpr::Other(raw) => {
            warn!(
                "unknown expression kind \"{}\", yielding null",
                raw.get("type").and_then(|t| t.as_str()).unwrap_or("?")
            );
            Ok(Value::Null)
        }
    }
}

fn eval_kind(kind: &IrExprKind, ctx: &mut Context, store: &Store) -> Result<Value> {
    match kind {
        IrExprKind::Literal { value } => Ok(Value::from_json(value)),
        IrExprKind::Var { name } => Ok(ctx.resolve_var(name)),
        IrExprKind::Param { name } => match ctx.params.get(name) {
            Some(value) => Ok(value.clone()),
            None => {
                warn!("unknown event field \"{}\", resolving to null", name);
                Ok(Value::Null)
            }
        },
        IrExprKind::Field {
            entity,
            component,
            field,
        } => match resolve_entity_ref(entity, ctx, store)? {
            Some(id) => Ok(store
                .get_field(id, component, field)
                .cloned()
                .unwrap_or(Value::Null)),
            None => Ok(Value::Null),
        },
        IrExprKind::Binary { op, left, right } => {
            let left = eval(left, ctx, store)?;
            let right = eval(right, ctx, store)?;
            Ok(binary_op(op, left, right))
        }
        IrExprKind::Unary { op, expr } => {
            let value = eval(expr, ctx, store)?;
            Ok(unary_op(op, value))
        }
        IrExprKind::If {
            condition,
            then,
            else_expr,
        } => {
            if eval(condition, ctx, store)?.to_bool() {
                eval(then, ctx, store)
            } else {
                eval(else_expr, ctx, store)
            }
        }
        IrExprKind::Call { function, args } => {
            let mut argv = Vec::with_capacity(args.len());
            for arg in args {
                argv.push(eval(arg, ctx, store)?);
            }
            call_function(function, argv, ctx, store)
        }
    }
}

/// Resolves the entity operand of a field access or action: a plain
/// string is a variable name, anything else a nested expression. A null
/// or non-entity result is `None`.
pub(crate) fn resolve_entity_ref(
    entity: &IrEntityRef,
    ctx: &mut Context,
    store: &Store,
) -> Result<Option<EntityId>> {
    match entity {
        IrEntityRef::Name(name) => Ok(ctx.resolve_entity_var(name)),
        IrEntityRef::Expr(expr) => Ok(eval(expr, ctx, store)?.as_entity()),
    }
}

/// Applies a binary operator. Arithmetic stays in integers while both
/// operands are integers, except division which is always IEEE-754
/// float (infinities and NaN propagate and are squashed to 0 by integer
/// write coercion). Unknown operators warn and yield null.
pub(crate) fn binary_op(op: &str, left: Value, right: Value) -> Value {
    match op {
        "add" => match (left, right) {
            // list add concatenates or appends
            (Value::List(mut l), Value::List(mut r)) => {
                l.append(&mut r);
                Value::List(l)
            }
            (Value::List(mut l), r) => {
                l.push(r);
                Value::List(l)
            }
            (l @ Value::Str(_), r) | (l, r @ Value::Str(_)) => {
                Value::Str(format!("{}{}", l.to_string(), r.to_string()))
            }
            (Value::Int(l), Value::Int(r)) => Value::Int(l + r),
            (l, r) => Value::Float(l.to_float() + r.to_float()),
        },
        "subtract" => match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => Value::Int(l - r),
            _ => Value::Float(left.to_float() - right.to_float()),
        },
        "multiply" => match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => Value::Int(l * r),
            _ => Value::Float(left.to_float() * right.to_float()),
        },
        "divide" => Value::Float(left.to_float() / right.to_float()),
        "modulo" => match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => {
                if *r == 0 {
                    Value::Float(Float::NAN)
                } else {
                    Value::Int(l % r)
                }
            }
            _ => Value::Float(left.to_float() % right.to_float()),
        },
        "eq" => Value::Bool(left.loose_eq(&right)),
        "neq" => Value::Bool(!left.loose_eq(&right)),
        "lt" => Value::Bool(left.to_float() < right.to_float()),
        "lte" => Value::Bool(left.to_float() <= right.to_float()),
        "gt" => Value::Bool(left.to_float() > right.to_float()),
        "gte" => Value::Bool(left.to_float() >= right.to_float()),
        "and" => Value::Bool(left.to_bool() && right.to_bool()),
        "or" => Value::Bool(left.to_bool() || right.to_bool()),
        _ => {
            warn!("unknown binary operator \"{}\", yielding null", op);
            Value::Null
        }
    }
}

fn unary_op(op: &str, value: Value) -> Value {
    match op {
        "not" => Value::Bool(!value.to_bool()),
        "neg" | "negate" => match value {
            Value::Int(i) => Value::Int(-i),
            other => Value::Float(-other.to_float()),
        },
        _ => {
            warn!("unknown unary operator \"{}\", yielding null", op);
            Value::Null
        }
    }
}

/// Dispatches a call: built-ins first, then module-level functions,
/// then choice functions bound to an entity argument. Anything else is
/// a runtime reference error.
pub(crate) fn call_function(
    function: &str,
    args: Vec<Value>,
    ctx: &mut Context,
    store: &Store,
) -> Result<Value> {
    if let Some(value) = call_builtin(function, &args, ctx, store)? {
        return Ok(value);
    }

    let model = ctx.model;
    if let Some(func) = model.functions.get(function) {
        if func.params.len() != args.len() {
            return Err(Error::new(ErrorKind::BadArity {
                function: function.to_string(),
                expected: func.params.len(),
                got: args.len(),
            }));
        }
        let mut params = FnvHashMap::default();
        for (param, arg) in func.params.iter().zip(args) {
            params.insert(param.name.clone(), arg);
        }
        return scoped_eval(&func.body, params, ctx, store);
    }

    if let Some(entity) = args.iter().find_map(|arg| match arg {
        Value::Entity(id) => Some(*id),
        _ => None,
    }) {
        let bound = store.get_bound_function(entity, function).ok_or_else(|| {
            Error::new(ErrorKind::UnknownBoundFunction(entity, function.to_string()))
        })?;
        return call_bound(&bound, function, args, ctx, store);
    }

    Err(Error::new(ErrorKind::UnknownFunction(function.to_string())))
}

/// Invokes a bound choice function with positional arguments.
pub(crate) fn call_bound(
    function: &BoundFunction,
    name: &str,
    args: Vec<Value>,
    ctx: &mut Context,
    store: &Store,
) -> Result<Value> {
    if function.params.len() != args.len() {
        return Err(Error::new(ErrorKind::BadArity {
            function: name.to_string(),
            expected: function.params.len(),
            got: args.len(),
        }));
    }
    let mut params = FnvHashMap::default();
    for (param, arg) in function.params.iter().zip(args) {
        params.insert(param.name.clone(), arg);
    }
    scoped_eval(&function.body, params, ctx, store)
}

/// Evaluates a function body with its own parameter scope and a fresh
/// local scope, restoring the caller's scopes afterwards.
fn scoped_eval(
    body: &IrExpr,
    params: FnvHashMap<String, Value>,
    ctx: &mut Context,
    store: &Store,
) -> Result<Value> {
    let saved_params = std::mem::replace(&mut ctx.params, params);
    let saved_locals = std::mem::take(&mut ctx.locals);
    let result = eval(body, ctx, store);
    ctx.params = saved_params;
    ctx.locals = saved_locals;
    result
}

fn int_of(f: Float) -> Int {
    if f.is_finite() {
        f as Int
    } else {
        0
    }
}

fn call_builtin(
    name: &str,
    args: &[Value],
    ctx: &mut Context,
    store: &Store,
) -> Result<Option<Value>> {
    let arity = |expected: usize| -> Result<()> {
        if args.len() != expected {
            Err(Error::new(ErrorKind::BadArity {
                function: name.to_string(),
                expected,
                got: args.len(),
            }))
        } else {
            Ok(())
        }
    };

    let value = match name {
        "min" | "max" => {
            if args.is_empty() {
                return Err(Error::new(ErrorKind::BadArity {
                    function: name.to_string(),
                    expected: 2,
                    got: 0,
                }));
            }
            let all_int = args.iter().all(|a| matches!(a, Value::Int(_)));
            if all_int {
                let mut acc = args[0].to_int();
                for arg in &args[1..] {
                    let v = arg.to_int();
                    acc = if name == "min" { acc.min(v) } else { acc.max(v) };
                }
                Value::Int(acc)
            } else {
                let mut acc = args[0].to_float();
                for arg in &args[1..] {
                    let v = arg.to_float();
                    acc = if name == "min" { acc.min(v) } else { acc.max(v) };
                }
                Value::Float(acc)
            }
        }
        "floor" => {
            arity(1)?;
            Value::Int(int_of(args[0].to_float().floor()))
        }
        "ceil" => {
            arity(1)?;
            Value::Int(int_of(args[0].to_float().ceil()))
        }
        "round" => {
            arity(1)?;
            Value::Int(int_of(args[0].to_float().round()))
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Value::Int(i.abs()),
                other => Value::Float(other.to_float().abs()),
            }
        }
        // uniform [0, 1)
        "random" => {
            arity(0)?;
            Value::Float(ctx.rng.gen::<Float>())
        }
        // uniform [min, max); collapses to min on an empty range
        "random_range" => {
            arity(2)?;
            let low = args[0].to_float();
            let high = args[1].to_float();
            if high > low {
                Value::Float(ctx.rng.gen_range(low, high))
            } else {
                Value::Float(low)
            }
        }
        "len" => {
            arity(1)?;
            match &args[0] {
                Value::List(items) => Value::Int(items.len() as Int),
                Value::Str(s) => Value::Int(s.chars().count() as Int),
                Value::Map(map) => Value::Int(map.len() as Int),
                other => {
                    warn!("len() of non-collection value {:?}", other);
                    Value::Int(0)
                }
            }
        }
        "list" => Value::List(args.to_vec()),
        "entities_having" => {
            arity(1)?;
            let component = args[0].to_string();
            Value::List(
                store
                    .query(&[component])
                    .into_iter()
                    .map(Value::Entity)
                    .collect(),
            )
        }
        // bounds-checked list indexing; out of range yields null
        "get" => {
            arity(2)?;
            let index = args[1].to_int();
            match &args[0] {
                Value::List(items) if index >= 0 && (index as usize) < items.len() => {
                    items[index as usize].clone()
                }
                _ => Value::Null,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_stays_integral_until_floats_appear() {
        assert_eq!(binary_op("add", Value::Int(2), Value::Int(3)), Value::Int(5));
        assert_eq!(
            binary_op("subtract", Value::Int(100), Value::Float(7.9)),
            Value::Float(92.1)
        );
    }

    #[test]
    fn division_is_ieee_754() {
        match binary_op("divide", Value::Int(1), Value::Int(0)) {
            Value::Float(f) => assert!(f.is_infinite()),
            other => panic!("unexpected {:?}", other),
        }
        match binary_op("divide", Value::Int(0), Value::Int(0)) {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn comparisons_are_loose_over_numeric_kinds() {
        assert_eq!(
            binary_op("eq", Value::Entity(4), Value::Int(4)),
            Value::Bool(true)
        );
        assert_eq!(
            binary_op("eq", Value::Null, Value::Int(0)),
            Value::Bool(false)
        );
        assert_eq!(
            binary_op("lt", Value::Int(1), Value::Float(1.5)),
            Value::Bool(true)
        );
    }

    #[test]
    fn unknown_operator_warns_and_yields_null() {
        assert_eq!(binary_op("xor", Value::Int(1), Value::Int(2)), Value::Null);
    }
}
