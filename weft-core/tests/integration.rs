//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that cells, formulas, subscribers, effects, and owner
//! lifecycles work together through the public API.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use weft_core::{Error, OwnerId, Runtime, RuntimeConfig};

/// Collects every value a subscriber receives.
fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(&T) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |value: &T| sink.borrow_mut().push(value.clone()))
}

/// Writes within one turn reach each subscriber once, with the final value.
#[test]
fn subscriber_sees_final_value_once_per_turn() {
    let runtime = Runtime::new();
    let count = runtime.cell(0);
    let (seen, record) = recorder::<i32>();
    let _sub = runtime.subscribe(&count, record);

    count.set(1);
    count.set(2);
    count.update(|value| *value += 10);
    runtime.flush();

    assert_eq!(*seen.borrow(), vec![12]);
    assert_eq!(runtime.turn(), 1);

    // Nothing written, nothing delivered.
    runtime.flush();
    assert_eq!(*seen.borrow(), vec![12]);
}

/// A formula subscriber is notified after its cells change.
#[test]
fn formula_subscriber_follows_cells() {
    let runtime = Runtime::new();
    let first = runtime.cell("Ada".to_string());
    let last = runtime.cell("Lovelace".to_string());
    let full = runtime.formula({
        let (first, last) = (first.clone(), last.clone());
        move || format!("{} {}", first.get(), last.get())
    });
    let (seen, record) = recorder::<String>();
    let _sub = runtime.subscribe(&full, record);

    first.set("Grace".to_string());
    last.set("Hopper".to_string());
    runtime.flush();

    assert_eq!(*seen.borrow(), vec!["Grace Hopper".to_string()]);
    assert_eq!(full.dependency_count(), 2);
}

/// A formula that reads no cells is constant and never recomputes.
#[test]
fn constant_formula_never_recomputes() {
    let runtime = Runtime::new();
    let unrelated = runtime.cell(1);
    let answer = runtime.formula(|| 6 * 7);

    assert_eq!(answer.get(), 42);
    assert!(answer.is_const());

    unrelated.set(2);
    runtime.flush();
    for _ in 0..3 {
        assert_eq!(answer.get(), 42);
    }
    assert_eq!(answer.compute_count(), 1);
}

/// Two paths from one cell to one formula cause a single recomputation.
#[test]
fn diamond_recomputes_once() {
    let runtime = Runtime::new();
    let base = runtime.cell(1);
    let left = runtime.formula({
        let base = base.clone();
        move || base.get() + 1
    });
    let right = runtime.formula({
        let base = base.clone();
        move || base.get() * 10
    });
    let joined = runtime.formula({
        let (left, right) = (left.clone(), right.clone());
        move || left.get() + right.get()
    });
    let (seen, record) = recorder::<i32>();
    let _sub = runtime.subscribe(&joined, record);
    assert_eq!(joined.compute_count(), 1);

    base.set(2);
    runtime.flush();

    assert_eq!(*seen.borrow(), vec![23]);
    assert_eq!(joined.compute_count(), 2);
    assert_eq!(left.compute_count(), 2);
    assert_eq!(right.compute_count(), 2);
}

/// A formula over two cells written in the same turn recomputes once.
#[test]
fn two_writes_one_recompute() {
    let runtime = Runtime::new();
    let width = runtime.cell(2);
    let height = runtime.cell(3);
    let area = runtime.formula({
        let (width, height) = (width.clone(), height.clone());
        move || width.get() * height.get()
    });
    let (seen, record) = recorder::<i32>();
    let _sub = runtime.subscribe(&area, record);

    width.set(4);
    height.set(5);
    runtime.flush();

    assert_eq!(*seen.borrow(), vec![20]);
    assert_eq!(area.compute_count(), 2);
    assert_eq!(runtime.dependents_of(width.id()), vec![area.id()]);
}

/// Writes made by a subscriber land in the following turn.
#[test]
fn subscriber_writes_are_deferred() {
    let runtime = Runtime::new();
    let source = runtime.cell(1);
    let mirror = runtime.cell(0);
    let _copy = runtime.subscribe(&source, {
        let mirror = mirror.clone();
        move |value: &i32| mirror.set(*value)
    });
    let (seen, record) = recorder::<i32>();
    let _sub = runtime.subscribe(&mirror, record);

    source.set(5);
    runtime.flush();
    assert!(seen.borrow().is_empty());
    assert!(runtime.is_flush_pending());

    runtime.flush();
    assert_eq!(*seen.borrow(), vec![5]);
}

/// A failing subscriber is evicted and the rest still run.
#[test]
fn failing_subscriber_is_contained() {
    let runtime = Runtime::new();
    let cell = runtime.cell(0);
    let _bad = runtime.try_subscribe(&cell, |value: &i32| {
        if *value > 0 {
            Err("value out of range")
        } else {
            Ok(())
        }
    });
    let (seen, record) = recorder::<i32>();
    let _good = runtime.subscribe(&cell, record);

    cell.set(1);
    runtime.flush();
    cell.set(2);
    runtime.flush();

    assert_eq!(*seen.borrow(), vec![1, 2]);
    let faults = runtime.take_faults();
    assert_eq!(faults.len(), 1);
    assert!(matches!(faults[0], Error::OpcodeFailed { .. }));
    assert_eq!(runtime.subscriber_count(cell.id()), 1);
}

/// The flush hook fires once per batch of writes.
#[test]
fn flush_hook_fires_once_per_batch() {
    let runtime = Runtime::new();
    let requests = Rc::new(StdCell::new(0));
    runtime.set_flush_hook({
        let requests = requests.clone();
        move || requests.set(requests.get() + 1)
    });
    let a = runtime.cell(0);
    let b = runtime.cell(0);

    a.set(1);
    b.set(1);
    a.set(2);
    assert_eq!(requests.get(), 1);

    runtime.flush();
    b.set(2);
    assert_eq!(requests.get(), 2);
}

/// Effects re-run when their cells change and stop when their owner dies.
#[test]
fn effect_lifecycle() {
    let runtime = Runtime::new();
    let owner = OwnerId::new();
    let count = runtime.cell(1);
    let (seen, record) = recorder::<i32>();
    let record = RefCell::new(record);

    let effect = runtime.effect(owner, {
        let count = count.clone();
        move || (record.borrow_mut())(&count.get())
    });
    assert_eq!(*seen.borrow(), vec![1]);

    count.set(2);
    runtime.flush();
    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(effect.run_count(), 2);

    runtime.destroy_sync(owner);
    count.set(3);
    runtime.flush();
    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert!(effect.is_disposed());
}

/// Fields are per-owner cells that vanish with the owner.
#[test]
fn fields_are_scoped_to_owners() {
    let runtime = Runtime::new();
    let owner = OwnerId::new();

    let clicks = runtime.field(owner, "clicks", || 0u32);
    clicks.set(3);
    let again = runtime.field(owner, "clicks", || 99u32);
    assert_eq!(again.get(), 3);

    let other = runtime.field(OwnerId::new(), "clicks", || 7u32);
    assert_eq!(other.get(), 7);

    runtime.destroy_sync(owner);
    let fresh = runtime.field(owner, "clicks", || 0u32);
    assert_eq!(fresh.get(), 0);
}

/// Destroying an owner runs its destructors once, in registration order.
#[test]
fn destructors_run_once_in_order() {
    let runtime = Runtime::new();
    let owner = OwnerId::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    for step in ["first", "second", "third"] {
        let order = order.clone();
        runtime.on_destroy(owner, move || order.borrow_mut().push(step));
    }

    assert!(runtime.destroy(owner).is_complete());
    assert!(runtime.destroy(owner).is_complete());
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

/// Contexts resolve through the nearest providing ancestor.
#[test]
fn context_resolves_through_ancestors() {
    #[derive(Debug, Clone, PartialEq)]
    struct Theme(&'static str);

    let runtime = Runtime::new();
    let root = runtime.child_owner(None, "root").unwrap();
    let panel = runtime.child_owner(Some(root), "panel").unwrap();
    let button = runtime.child_owner(Some(panel), "button").unwrap();

    runtime.provide_context(root, Theme("light"));
    assert_eq!(runtime.use_context::<Theme>(button), Some(Theme("light")));

    runtime.provide_context(panel, Theme("dark"));
    assert_eq!(runtime.use_context::<Theme>(button), Some(Theme("dark")));
    assert_eq!(runtime.use_context::<Theme>(root), Some(Theme("light")));

    assert!(matches!(
        runtime.expect_context::<u8>(button),
        Err(Error::MissingContext { .. })
    ));
    assert_eq!(runtime.use_context_or(button, 5u8), 5);
}

/// Destroying a subtree silences every subscriber bound inside it.
#[test]
fn destroyed_subtree_stays_silent() {
    let runtime = Runtime::new();
    let root = runtime.child_owner(None, "root").unwrap();
    let child = runtime.child_owner(Some(root), "child").unwrap();
    let grandchild = runtime.child_owner(Some(child), "grandchild").unwrap();
    let cell = runtime.cell(0);
    let calls = Rc::new(StdCell::new(0));

    for owner in [child, grandchild] {
        let calls = calls.clone();
        runtime
            .bind(owner, &cell, move |_: &i32| {
                calls.set(calls.get() + 1);
                Ok::<(), Error>(())
            })
            .unwrap();
    }
    assert_eq!(calls.get(), 2);

    runtime.destroy_sync(child);
    assert!(!runtime.in_tree(grandchild));
    assert_eq!(runtime.tree_children(root), Vec::<OwnerId>::new());

    cell.set(1);
    runtime.flush();
    assert_eq!(calls.get(), 2);
    assert_eq!(runtime.subscriber_count(cell.id()), 0);
}

/// Configuration parses from JSON and reaches the runtime.
#[test]
fn runtime_from_json_config() {
    let config = RuntimeConfig::from_json(r#"{ "label": "panel", "dev_mode": true }"#).unwrap();
    let runtime = Runtime::with_config(config);
    assert!(runtime.config().dev_mode);
    assert_eq!(runtime.config().label, "panel");

    assert!(matches!(
        RuntimeConfig::from_json("{ not json"),
        Err(Error::InvalidConfig(_))
    ));
}

/// Deferred destructors hold the teardown open until they finish.
#[tokio::test]
async fn deferred_teardown_settles() {
    let runtime = Runtime::new();
    let owner = OwnerId::new();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let finished = Rc::new(StdCell::new(false));
    runtime.register_destructor(
        owner,
        [weft_core::Destructor::deferred({
            let finished = finished.clone();
            move || async move {
                let _ = rx.await;
                finished.set(true);
            }
        })],
    );

    let teardown = runtime.destroy(owner);
    assert!(!teardown.is_complete());
    assert_eq!(runtime.pending_teardowns(), 1);

    let release = async move {
        tokio::task::yield_now().await;
        let _ = tx.send(());
    };
    tokio::join!(runtime.settle(), release);

    assert!(finished.get());
    assert_eq!(runtime.pending_teardowns(), 0);
}
