//! End-to-end scenarios driving the full facade: schedule ordering,
//! recurring events, coercion, rule dispatch, loops and the while cap.

use serde_json::json;

use blink_core::{IrModule, Sim, Value};

fn sim_from(ir: serde_json::Value) -> Sim {
    let module = IrModule::from_json_value(ir).expect("ir should parse");
    Sim::from_ir(&module).expect("sim should assemble")
}

fn empty_module() -> serde_json::Value {
    json!({ "version": "1.0", "module": "test" })
}

#[test]
fn schedule_and_pop_order() {
    let mut sim = sim_from(empty_module());
    sim.schedule_event("A", 2.0, None);
    sim.schedule_event("B", 1.0, None);
    sim.schedule_event("C", 1.0, None);

    let first = sim.step().unwrap().unwrap();
    assert_eq!(first.event.event_type, "B");
    assert_eq!(first.time, 1.0);
    let second = sim.step().unwrap().unwrap();
    assert_eq!(second.event.event_type, "C");
    assert_eq!(second.time, 1.0);
    let third = sim.step().unwrap().unwrap();
    assert_eq!(third.event.event_type, "A");
    assert_eq!(third.time, 2.0);
    assert!(sim.step().unwrap().is_none());
}

#[test]
fn recurring_event_and_cancellation() {
    let mut sim = sim_from(empty_module());
    let id = sim.schedule_recurring_event("Tick", 1.0, Default::default());

    for expected_time in &[0.0, 1.0, 2.0] {
        let report = sim.step().unwrap().unwrap();
        assert_eq!(report.event.event_type, "Tick");
        assert_eq!(report.event.id, id);
        assert_eq!(report.time, *expected_time);
    }
    assert!(sim.cancel_event(id));
    assert!(sim.step().unwrap().is_none());
    assert_eq!(sim.get_time(), 2.0);
}

#[test]
fn modify_coerces_integer_fields_by_truncation() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "Health", "fields": [
                {"name": "current", "type": "integer", "default": 100},
                {"name": "max", "type": "integer", "default": 100}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "hit",
             "trigger": {"type": "event", "event": "Hit"},
             "filter": {"components": ["Health"]},
             "actions": [
                {"type": "modify", "entity": "entity",
                 "component": "Health", "field": "current",
                 "op": "subtract", "value": {"type": "literal", "value": 7.9}}
             ]}
        ],
        "initial_state": {"entities": [
            {"id": 0, "components": {"Health": {}}}
        ]}
    }));

    sim.schedule_event("Hit", 0.0, None);
    sim.step().unwrap();
    assert_eq!(sim.get_field(0, "Health", "current"), Some(&Value::Int(92)));
    assert_eq!(sim.get_field(0, "Health", "max"), Some(&Value::Int(100)));
}

#[test]
fn source_binding_selects_only_the_event_source() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "Combat", "fields": [
                {"name": "hits", "type": "integer", "default": 0},
                {"name": "marked", "type": "integer", "default": 0}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "R",
             "trigger": {"type": "event", "event": "DoAttack",
                         "bindings": {"attacker": "source"}},
             "filter": {"components": ["Combat"]},
             "actions": [
                {"type": "modify", "entity": "entity", "component": "Combat",
                 "field": "hits", "op": "add", "value": {"type": "literal", "value": 1}},
                {"type": "modify", "entity": "attacker", "component": "Combat",
                 "field": "marked", "op": "add", "value": {"type": "literal", "value": 1}}
             ]}
        ],
        "initial_state": {"entities": [
            {"id": 17, "components": {"Combat": {}}},
            {"id": 18, "components": {"Combat": {}}}
        ]}
    }));

    let mut fields = indexmap::IndexMap::new();
    fields.insert("source".to_string(), Value::Entity(17));
    sim.schedule_event("DoAttack", 0.0, Some(fields));
    sim.step().unwrap();

    // exactly one firing, with both `entity` and `attacker` bound to 17
    assert_eq!(sim.get_field(17, "Combat", "hits"), Some(&Value::Int(1)));
    assert_eq!(sim.get_field(17, "Combat", "marked"), Some(&Value::Int(1)));
    assert_eq!(sim.get_field(18, "Combat", "hits"), Some(&Value::Int(0)));
    assert_eq!(sim.get_field(18, "Combat", "marked"), Some(&Value::Int(0)));
}

#[test]
fn loop_over_query_visits_each_enemy_once() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "Enemy", "fields": []},
            {"id": 1, "name": "Health", "fields": [
                {"name": "current", "type": "integer", "default": 0}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "tick",
             "trigger": {"type": "event", "event": "Tick"},
             "actions": [
                {"type": "let", "name": "es",
                 "value": {"type": "call", "function": "entities_having",
                           "args": [{"type": "literal", "value": "Enemy"}]}},
                {"type": "loop", "variable": "e",
                 "iterable": {"type": "var", "name": "es"},
                 "body": [
                    {"type": "modify", "entity": "e", "component": "Health",
                     "field": "current", "op": "subtract",
                     "value": {"type": "literal", "value": 1}}
                 ]}
             ]}
        ],
        "initial_state": {"entities": [
            {"id": 0, "components": {"Enemy": {}, "Health": {"current": 5}}},
            {"id": 1, "components": {"Enemy": {}, "Health": {"current": 4}}},
            {"id": 2, "components": {"Enemy": {}, "Health": {"current": 3}}}
        ]}
    }));

    sim.schedule_event("Tick", 0.0, None);
    sim.step().unwrap();
    assert_eq!(sim.get_field(0, "Health", "current"), Some(&Value::Int(4)));
    assert_eq!(sim.get_field(1, "Health", "current"), Some(&Value::Int(3)));
    assert_eq!(sim.get_field(2, "Health", "current"), Some(&Value::Int(2)));
}

#[test]
fn cloned_entity_is_independent_of_its_template() {
    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "Stats", "fields": [
                {"name": "hp", "type": "integer", "default": 0},
                {"name": "items", "type": "list<integer>"}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "setup",
             "trigger": {"type": "event", "event": "Setup"},
             "actions": [
                {"type": "let", "name": "t",
                 "value": {"type": "spawn", "components": {
                    "Stats": {"hp": {"type": "literal", "value": 10},
                              "items": {"type": "literal", "value": [1, 2, 3]}}}}},
                {"type": "let", "name": "u",
                 "value": {"type": "clone", "source": "t"}},
                {"type": "modify", "entity": "u", "component": "Stats",
                 "field": "hp", "op": "set", "value": {"type": "literal", "value": 99}},
                // list add appends on the clone's own copy
                {"type": "modify", "entity": "u", "component": "Stats",
                 "field": "items", "op": "add", "value": {"type": "literal", "value": 4}}
             ]}
        ]
    }));

    sim.schedule_event("Setup", 0.0, None);
    sim.step().unwrap();

    let (t, u) = (0, 1);
    assert_eq!(sim.get_field(t, "Stats", "hp"), Some(&Value::Int(10)));
    assert_eq!(
        sim.get_field(t, "Stats", "items"),
        Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
    );
    assert_eq!(sim.get_field(u, "Stats", "hp"), Some(&Value::Int(99)));
    assert_eq!(
        sim.get_field(u, "Stats", "items"),
        Some(&Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4)
        ]))
    );
}

#[test]
fn while_loop_stops_at_the_iteration_cap() {
    simplelog::SimpleLogger::init(
        simplelog::LevelFilter::Warn,
        simplelog::Config::default(),
    )
    .ok();

    let mut sim = sim_from(json!({
        "version": "1.0",
        "module": "test",
        "components": [
            {"id": 0, "name": "Counter", "fields": [
                {"name": "value", "type": "integer", "default": 0}
            ]}
        ],
        "rules": [
            {"id": 0, "name": "boot",
             "trigger": {"type": "event", "event": "Boot"},
             "actions": [
                {"type": "let", "name": "c",
                 "value": {"type": "call", "function": "get", "args": [
                    {"type": "call", "function": "entities_having",
                     "args": [{"type": "literal", "value": "Counter"}]},
                    {"type": "literal", "value": 0}
                 ]}},
                {"type": "while",
                 "condition": {"type": "literal", "value": true},
                 "body": [
                    {"type": "modify", "entity": "c", "component": "Counter",
                     "field": "value", "op": "add", "value": {"type": "literal", "value": 1}}
                 ]}
             ]}
        ],
        "initial_state": {"entities": [{"id": 0, "components": {"Counter": {}}}]}
    }));

    sim.schedule_event("Boot", 0.0, None);
    sim.step().unwrap();
    assert_eq!(
        sim.get_field(0, "Counter", "value"),
        Some(&Value::Int(blink_core::MAX_WHILE_ITERATIONS as i64))
    );

    // the simulation stays usable afterwards
    sim.schedule_event("Boot", 0.0, None);
    assert!(sim.step().unwrap().is_some());
}
