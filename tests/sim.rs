//! Facade-level behavior: determinism, rule parity, observers, bound
//! choice functions, tolerant IR handling and the batched driver.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use blink_core::sim::{DebugNotification, DriverCommand, RunOptions};
use blink_core::{IrModule, Sim, Value};

fn sim_from(ir: serde_json::Value) -> Sim {
    let module = IrModule::from_json_value(ir).expect("ir should parse");
    Sim::from_ir(&module).expect("sim should assemble")
}

fn dice_module() -> serde_json::Value {
    json!({
        "version": "1.0",
        "module": "dice",
        "components": [
            {"id": 0, "name": "Roll", "fields": [
                {"name": "last", "type": "integer", "default": 0},
                {"name": "total", "type": "integer", "default": 0}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "roll",
             "trigger": {"type": "event", "event": "Tick"},
             "filter": {"components": ["Roll"]},
             "actions": [
                {"type": "let", "name": "d",
                 "value": {"type": "call", "function": "floor", "args": [
                    {"type": "call", "function": "random_range", "args": [
                        {"type": "literal", "value": 1},
                        {"type": "literal", "value": 7}
                    ]}
                 ]}},
                {"type": "modify", "entity": "entity", "component": "Roll",
                 "field": "last", "op": "set", "value": {"type": "var", "name": "d"}},
                {"type": "modify", "entity": "entity", "component": "Roll",
                 "field": "total", "op": "add", "value": {"type": "var", "name": "d"}}
             ]}
        ],
        "initial_state": {"entities": [
            {"id": 0, "components": {"Roll": {}}},
            {"id": 1, "components": {"Roll": {}}}
        ]}
    })
}

fn run_dice(seed: u64) -> (serde_json::Value, Vec<(String, f64)>) {
    let mut sim = sim_from(dice_module()).with_seed(seed);
    let trace = Rc::new(RefCell::new(Vec::new()));
    let sink = trace.clone();
    sim.on_step(move |n| {
        sink.borrow_mut()
            .push((n.event.event_type.clone(), n.time));
    });
    sim.schedule_recurring_event("Tick", 0.5, Default::default());
    for _ in 0..20 {
        sim.step().unwrap();
    }
    let snapshot = serde_json::to_value(sim.snapshot()).unwrap();
    let trace = trace.borrow().clone();
    (snapshot, trace)
}

#[test]
fn identical_seeds_replay_identically() {
    let (snap_a, trace_a) = run_dice(7);
    let (snap_b, trace_b) = run_dice(7);
    assert_eq!(snap_a, snap_b);
    assert_eq!(trace_a, trace_b);
}

#[test]
fn different_seeds_diverge() {
    let (snap_a, _) = run_dice(7);
    let (snap_b, _) = run_dice(8);
    assert_ne!(snap_a, snap_b);
}

#[test]
fn filtered_rule_fires_once_per_matching_entity() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "C", "fields": [
                {"name": "fired", "type": "integer", "default": 0}
            ]},
            {"id": 1, "name": "Other", "fields": []}
        ],
        "rules": [
            {"id": 0, "name": "mark",
             "trigger": {"type": "event", "event": "E"},
             "filter": {"components": ["C"]},
             "actions": [
                {"type": "modify", "entity": "entity", "component": "C",
                 "field": "fired", "op": "add", "value": {"type": "literal", "value": 1}}
             ]}
        ],
        "initial_state": {"entities": [
            {"id": 0, "components": {"C": {}}},
            {"id": 1, "components": {"Other": {}}},
            {"id": 2, "components": {"C": {}}}
        ]}
    }));

    let expected = sim.query(&["C"]);
    sim.schedule_event("E", 0.0, None);
    sim.step().unwrap();

    for id in expected {
        assert_eq!(sim.get_field(id, "C", "fired"), Some(&Value::Int(1)));
    }
    assert!(sim.get_field(1, "C", "fired").is_none());
}

#[test]
fn debug_mode_wraps_rule_firings() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [{"id": 0, "name": "C", "fields": []}],
        "rules": [
            {"id": 4, "name": "traced",
             "trigger": {"type": "event", "event": "E"},
             "filter": {"components": ["C"]},
             "actions": []}
        ],
        "initial_state": {"entities": [{"id": 0, "components": {"C": {}}}]}
    }));
    sim.set_debug(true);

    let trace = Rc::new(RefCell::new(Vec::new()));
    let sink = trace.clone();
    sim.on_debug(move |n| {
        let tag = match n {
            DebugNotification::RuleStart { rule, .. } => format!("start:{}", rule.name),
            DebugNotification::RuleEnd { rule, .. } => format!("end:{}", rule.name),
        };
        sink.borrow_mut().push(tag);
    });

    sim.schedule_event("E", 0.0, None);
    sim.step().unwrap();
    assert_eq!(
        trace.borrow().as_slice(),
        ["start:traced".to_string(), "end:traced".to_string()]
    );
}

#[test]
fn bound_choice_functions_resolve_per_entity() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "Hero", "fields": [
                {"name": "aggression", "type": "integer", "default": 3}
            ]}
        ],
        "rules": [],
        "initial_state": {"entities": [
            {"id": 0,
             "components": {"Hero": {}},
             "bound_functions": {
                "choose_stance": {
                    "params": [{"name": "self", "type": "entity"}],
                    "return_type": "integer",
                    "body": {"type": "binary", "op": "multiply",
                             "left": {"type": "field", "entity": {"type": "param", "name": "self"},
                                      "component": "Hero", "field": "aggression"},
                             "right": {"type": "literal", "value": 2}}
                }
             }}
        ]}
    }));

    let result = sim
        .call_bound(0, "choose_stance", vec![Value::Entity(0)])
        .unwrap();
    assert_eq!(result, Value::Int(6));

    // unresolved lookups are runtime reference errors, not fallbacks
    assert!(sim
        .call_bound(0, "choose_retreat", vec![Value::Entity(0)])
        .is_err());
}

#[test]
fn unknown_action_kinds_warn_and_are_skipped() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "C", "fields": [
                {"name": "x", "type": "integer", "default": 0}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "tolerant",
             "trigger": {"type": "event", "event": "E"},
             "filter": {"components": ["C"]},
             "actions": [
                {"type": "teleport", "destination": "narnia"},
                {"type": "modify", "entity": "entity", "component": "C",
                 "field": "x", "op": "set", "value": {"type": "literal", "value": 1}}
             ]}
        ],
        "initial_state": {"entities": [{"id": 0, "components": {"C": {}}}]}
    }));

    sim.schedule_event("E", 0.0, None);
    // the unknown action is skipped, later actions still run
    sim.step().unwrap();
    assert_eq!(sim.get_field(0, "C", "x"), Some(&Value::Int(1)));
}

#[test]
fn constants_resolve_as_variables() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "constants": {"BASE_DAMAGE": 12},
        "components": [
            {"id": 0, "name": "C", "fields": [
                {"name": "x", "type": "integer", "default": 0}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "apply",
             "trigger": {"type": "event", "event": "E"},
             "filter": {"components": ["C"]},
             "actions": [
                {"type": "modify", "entity": "entity", "component": "C",
                 "field": "x", "op": "set",
                 "value": {"type": "var", "name": "BASE_DAMAGE"}}
             ]}
        ],
        "initial_state": {"entities": [{"id": 0, "components": {"C": {}}}]}
    }));

    sim.schedule_event("E", 0.0, None);
    sim.step().unwrap();
    assert_eq!(sim.get_field(0, "C", "x"), Some(&Value::Int(12)));
}

#[test]
fn driver_yields_between_batches_and_honors_stop() {
    let mut sim = sim_from(json!({"version": "1.0", "module": "test"}));
    for n in 0..25 {
        sim.schedule_event("E", n as f64, None);
    }

    let yields = Rc::new(RefCell::new(0u32));
    let counter = yields.clone();
    let processed = sim
        .run(
            RunOptions {
                batch_size: 10,
                max_steps: None,
            },
            move |_| {
                *counter.borrow_mut() += 1;
                if *counter.borrow() == 2 {
                    DriverCommand::Stop
                } else {
                    DriverCommand::Continue
                }
            },
        )
        .unwrap();

    // two full batches, stopped at the second yield
    assert_eq!(processed, 20);
    assert_eq!(*yields.borrow(), 2);
    assert!(sim.has_events());
}

#[test]
fn run_until_complete_counts_steps_and_caps() {
    let mut sim = sim_from(json!({"version": "1.0", "module": "test"}));
    for n in 0..5 {
        sim.schedule_event("E", n as f64, None);
    }
    assert_eq!(sim.run_until_complete(3).unwrap(), 3);
    assert_eq!(sim.run_until_complete(100).unwrap(), 2);
    assert_eq!(sim.get_clock(), 5);
}

#[test]
fn shutdown_clears_timeline_and_store() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [{"id": 0, "name": "C", "fields": []}],
        "initial_state": {"entities": [{"id": 0, "components": {"C": {}}}]}
    }));
    sim.schedule_event("E", 1.0, None);
    sim.shutdown();
    assert!(!sim.has_events());
    assert!(sim.get_entities().is_empty());
}
