//! Store-level invariants: coercion, defaults, query order, deep
//! cloning and snapshot isolation.

use blink_core::entity::{CompBag, Store};
use blink_core::{Value, ValueType};
use fnv::FnvHashMap;

fn stats_store() -> Store {
    let mut store = Store::new();
    let mut defaults = CompBag::new();
    defaults.insert("hp".to_string(), Value::Int(10));
    defaults.insert("items".to_string(), Value::List(Vec::new()));
    store.set_component_defaults("Stats", defaults);
    let mut types = FnvHashMap::default();
    types.insert("hp".to_string(), ValueType::Int);
    types.insert("items".to_string(), ValueType::List);
    store.set_component_field_types("Stats", types);
    store
}

#[test]
fn integer_writes_truncate_every_time() {
    let mut store = stats_store();
    let e = store.create_entity();
    for (written, expected) in &[
        (Value::Float(3.7), 3),
        (Value::Float(-3.7), -3),
        (Value::Float(f64::NAN), 0),
        (Value::Int(42), 42),
    ] {
        store.set_field(e, "Stats", "hp", written.clone()).unwrap();
        assert_eq!(store.get_field(e, "Stats", "hp"), Some(&Value::Int(*expected)));
    }
}

#[test]
fn first_field_write_fills_in_declared_defaults() {
    let mut store = stats_store();
    let e = store.create_entity();
    assert!(!store.has_component(e, "Stats"));
    store
        .set_field(e, "Stats", "items", Value::List(vec![Value::Int(1)]))
        .unwrap();
    assert_eq!(store.get_field(e, "Stats", "hp"), Some(&Value::Int(10)));
}

#[test]
fn query_returns_insertion_order_and_exact_membership() {
    let mut store = stats_store();
    store.set_component_defaults("Tag", CompBag::new());

    let a = store.create_entity();
    let b = store.create_entity();
    let c = store.create_entity();
    store.add_component(a, "Stats", CompBag::new()).unwrap();
    store.add_component(b, "Stats", CompBag::new()).unwrap();
    store.add_component(b, "Tag", CompBag::new()).unwrap();
    store.add_component(c, "Tag", CompBag::new()).unwrap();

    assert_eq!(store.query(&["Stats"]), vec![a, b]);
    assert_eq!(store.query(&["Stats", "Tag"]), vec![b]);
    for id in store.query(&["Tag"]) {
        assert!(store.has_component(id, "Tag"));
    }

    store.delete_entity(a);
    assert_eq!(store.query(&["Stats"]), vec![b]);
}

#[test]
fn clone_copies_nested_structures_deeply() {
    let mut store = stats_store();
    let source = store.create_entity();
    store
        .add_component(source, "Stats", {
            let mut bag = CompBag::new();
            bag.insert(
                "items".to_string(),
                Value::List(vec![Value::Int(1), Value::List(vec![Value::Int(2)])]),
            );
            bag
        })
        .unwrap();

    let target = store.clone_entity(source, None).unwrap();
    store
        .set_field(
            target,
            "Stats",
            "items",
            Value::List(vec![Value::Int(9)]),
        )
        .unwrap();
    store.set_field(target, "Stats", "hp", Value::Int(99)).unwrap();

    assert_eq!(
        store.get_field(source, "Stats", "items"),
        Some(&Value::List(vec![
            Value::Int(1),
            Value::List(vec![Value::Int(2)])
        ]))
    );
    assert_eq!(store.get_field(source, "Stats", "hp"), Some(&Value::Int(10)));
}

#[test]
fn snapshot_is_isolated_from_the_live_store() {
    let mut store = stats_store();
    let e = store.create_entity();
    store.add_component(e, "Stats", CompBag::new()).unwrap();

    let mut snap = store.snapshot();
    let bag = snap.get_mut(&e).unwrap().get_comp_mut("Stats").unwrap();
    bag.insert("hp".to_string(), Value::Int(-1));

    assert_eq!(store.get_field(e, "Stats", "hp"), Some(&Value::Int(10)));
}

#[test]
fn explicit_id_reservation_and_collision() {
    let mut store = Store::new();
    store.create_entity_with_id(100).unwrap();
    assert!(store.create_entity_with_id(100).is_err());
    // the allocator moved past the explicit id
    assert_eq!(store.create_entity(), 101);
    // ids are not recycled after deletion
    store.delete_entity(100);
    assert_eq!(store.create_entity(), 102);
}
