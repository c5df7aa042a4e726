//! Integration Tests for the Reactive Core
//!
//! These tests verify that properties, reactions and the tracking helpers
//! keep the dependency graph consistent while they are created, rebound,
//! moved and destroyed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_core::reactive::{
    track, Introspect, Property, Reaction, Runtime, TrackingList, UpdateResult,
};
use weft_core::ReactiveError;

fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    (count.clone(), count)
}

fn bump(count: &Cell<usize>) {
    count.set(count.get() + 1);
}

/// Reading a property during an update registers it as a dependency.
#[test]
fn read_registers_dependency() {
    let a = Property::new(1);
    let a_clone = a.clone();
    let b = Property::computed(move || a_clone.get() + 1);

    assert!(a.is_dependency_of(&b));
    assert!(a.is_implicit_dependency_of(&b));
    assert!(b.is_dependent_on(&a));
    assert!(!a.is_explicit_dependency_of(&b));
    Runtime::verify().unwrap();
}

/// Writing a dependency re-runs the dependent without a manual read.
#[test]
fn write_triggers_cascade() {
    let a = Property::new(1);
    let a_clone = a.clone();
    let b = Property::computed(move || a_clone.get() + 1);
    let b_clone = b.clone();
    let c = Property::computed(move || b_clone.get() * 10);

    assert_eq!(a.get(), 1);
    assert_eq!(b.get(), 2);

    a.set(5);
    assert_eq!(b.get(), 6);
    assert_eq!(c.get(), 60);
}

/// Assigning an equal value does not touch dependents.
#[test]
fn equality_short_circuits_propagation() {
    let a = Property::new(3);
    let (runs, runs_clone) = counter();
    let _b = Property::bound((&a,), move |value: i32| {
        bump(&runs_clone);
        value
    });
    assert_eq!(runs.get(), 1);

    a.set(3);
    assert_eq!(runs.get(), 1);

    a.set(4);
    assert_eq!(runs.get(), 2);
}

/// An unchanged intermediate value stops the cascade.
#[test]
fn unchanged_intermediate_stops_cascade() {
    let a = Property::new(1);
    let parity = Property::bound((&a,), |value: i32| value % 2);
    let (runs, runs_clone) = counter();
    let _watcher = Reaction::watch((&parity,), move |_: i32| bump(&runs_clone));
    assert_eq!(runs.get(), 1);

    a.set(3);
    assert_eq!(parity.get(), 1);
    assert_eq!(runs.get(), 1);

    a.set(4);
    assert_eq!(runs.get(), 2);
}

/// Destroying a required explicit dependency unbinds the dependent and
/// keeps its last value.
#[test]
fn required_dependency_destruction_unbinds() {
    let x = Property::new(21);
    let d = Property::bound((&x,), |value: i32| value * 2);
    assert!(d.is_bound());

    drop(x);
    assert!(!d.is_bound());
    assert_eq!(d.get(), 42);
    assert_eq!(d.dependency_count(), 0);
    Runtime::verify().unwrap();
}

/// Destroying an optional explicit dependency passes `None` on the next
/// update and keeps the binding.
#[test]
fn optional_dependency_destruction_degrades() {
    let x = Property::new(5);
    let y = Property::new(1);
    let d = Property::bound((&x, &y), |x: Option<i32>, y: i32| x.unwrap_or(-100) + y);
    assert_eq!(d.get(), 6);

    drop(x);
    assert!(d.is_bound());
    assert_eq!(d.get(), -99);

    // Positions are stable: the remaining argument still arrives second
    y.set(2);
    assert_eq!(d.get(), -98);
    assert_eq!(d.dependency_count(), 2);
    Runtime::verify().unwrap();
}

/// Optional cell parameters receive the cell itself.
#[test]
fn optional_cell_parameter() {
    let label = Property::new(String::from("width"));
    let len = Property::bound((&label,), |label: Option<Property<String>>| {
        label.map_or(0, |label| label.with(String::len))
    });
    assert_eq!(len.get(), 5);

    label.set("height".to_string());
    assert_eq!(len.get(), 6);

    drop(label);
    assert_eq!(len.get(), 0);
    assert!(len.is_bound());
}

/// Moving a handle keeps every edge of the cell.
#[test]
fn move_preserves_external_bindings() {
    let a = Property::new(1);
    let b = Property::bound((&a,), |value: i32| value + 1);

    let a2 = a;
    assert!(b.is_dependent_on(&a2));

    a2.set(10);
    assert_eq!(b.get(), 11);
}

/// `take` moves the cell into a new node: dependents follow it.
#[test]
fn take_repoints_dependents() {
    let a = Property::new(1);
    let b = Property::bound((&a,), |value: i32| value + 1);

    let a2 = a.take();
    assert!(b.is_dependent_on(&a2));
    assert!(!b.is_dependent_on(&a));
    assert_eq!(a.get(), 0);

    a2.set(10);
    assert_eq!(b.get(), 11);

    // The emptied source no longer drives anything
    a.set(50);
    assert_eq!(b.get(), 11);
    Runtime::verify().unwrap();
}

/// An updater returning `Unbind` detaches permanently.
#[test]
fn updater_can_unbind_itself() {
    let source = Property::new(1);
    let latched = Property::with_updater(0, (&source,), |value: &mut i32, s: i32| {
        if s > 10 {
            return UpdateResult::Unbind;
        }
        *value = s;
        UpdateResult::Changed
    });
    assert_eq!(latched.get(), 1);

    source.set(11);
    assert!(!latched.is_bound());
    assert_eq!(latched.get(), 1);

    source.set(3);
    assert_eq!(latched.get(), 1);
    assert!(!source.is_dependency_of(&latched));
}

/// p3 sums p1 and p2; destroying p2 freezes p3.
#[test]
fn sum_scenario() {
    let p1 = Property::new(1);
    let p2 = Property::new(1);
    let p3 = Property::bound((&p1, &p2), |a: i32, b: i32| a + b);
    assert_eq!(p3.get(), 2);

    p1.set(5);
    assert_eq!(p3.get(), 6);

    drop(p2);
    assert!(!p3.is_bound());
    assert_eq!(p3.get(), 6);

    p1.set(7);
    assert_eq!(p3.get(), 6);
}

/// A conditional read switches the implicit dependency set.
#[test]
fn nested_implicit_dependency_switches() {
    let p1 = Property::new(1);
    let p2 = Property::new(2);
    let (p1_clone, p2_clone) = (p1.clone(), p2.clone());
    let p3 = Property::computed(move || {
        if p1_clone.get_untracked() != 0 {
            p1_clone.get()
        } else {
            p2_clone.get()
        }
    });

    assert!(p1.is_implicit_dependency_of(&p3));
    assert!(!p2.is_dependency_of(&p3));
    assert_eq!(p3.dependency_count(), 1);

    p1.set(0);
    assert_eq!(p3.get(), 2);
    assert!(!p1.is_dependency_of(&p3));
    assert!(p2.is_implicit_dependency_of(&p3));
    assert_eq!(p3.dependency_count(), 1);
    assert_eq!(p1.dependent_count(), 0);
    Runtime::verify().unwrap();
}

/// Swapping exchanges values and repoints dependents.
#[test]
fn swap_repoints_dependents() {
    let a = Property::new(1);
    let b = Property::new(2);
    let on_a = Property::bound((&a,), |value: i32| value * 10);
    let on_b = Property::bound((&b,), |value: i32| value * 100);

    a.swap(&b);
    assert_eq!(a.get(), 2);
    assert_eq!(b.get(), 1);
    assert!(on_a.is_dependent_on(&b));
    assert!(on_b.is_dependent_on(&a));

    b.set(3);
    assert_eq!(on_a.get(), 30);
    a.set(4);
    assert_eq!(on_b.get(), 400);
    Runtime::verify().unwrap();
}

/// Swapping a cell with its own dependent reverses the edge.
#[test]
fn swap_with_dependent() {
    let source = Property::new(1);
    let derived = Property::bound((&source,), |value: i32| value + 1);

    source.swap(&derived);
    assert_eq!(source.get(), 2);
    assert_eq!(derived.get(), 1);
    assert!(source.is_bound());
    assert!(!derived.is_bound());
    assert!(source.is_dependent_on(&derived));

    derived.set(10);
    assert_eq!(source.get(), 11);
    Runtime::verify().unwrap();
}

/// The same cell at two explicit positions yields one reciprocal edge.
#[test]
fn duplicate_explicit_positions() {
    let a = Property::new(3);
    let (runs, runs_clone) = counter();
    let square = Property::bound((&a, &a), move |x: i32, y: i32| {
        bump(&runs_clone);
        x * y
    });
    assert_eq!(square.get(), 9);
    assert_eq!(square.dependency_count(), 2);
    assert_eq!(a.dependent_count(), 1);

    a.set(4);
    assert_eq!(square.get(), 16);
    assert_eq!(runs.get(), 2);

    drop(a);
    assert!(!square.is_bound());
    Runtime::verify().unwrap();
}

/// Reading an explicit dependency again does not add an implicit edge.
#[test]
fn explicit_read_does_not_duplicate_as_implicit() {
    let x = Property::new(1);
    let y = Property::new(2);
    let (x_clone, y_clone) = (x.clone(), y.clone());
    let d = Property::bound((&x,), move |slot: i32| slot + x_clone.get() + y_clone.get());

    assert!(x.is_explicit_dependency_of(&d));
    assert!(!x.is_implicit_dependency_of(&d));
    assert!(y.is_implicit_dependency_of(&d));
    assert_eq!(d.dependency_count(), 2);
    assert_eq!(x.dependent_count(), 1);
    assert_eq!(d.get(), 4);
    Runtime::verify().unwrap();
}

/// Destroying an implicit dependency erases exactly its slot.
#[test]
fn implicit_dependency_destruction_erases_one_slot() {
    let x = Property::new(1);
    let y = Property::new(2);
    let z = Property::new(3);
    let sources = Rc::new(RefCell::new(vec![x.clone(), y.clone(), z.clone()]));
    let sources_clone = sources.clone();
    let (runs, runs_clone) = counter();
    let sum = Property::computed(move || {
        bump(&runs_clone);
        sources_clone.borrow().iter().map(|p| p.get()).sum::<i32>()
    });
    assert_eq!(sum.get(), 6);
    assert_eq!(sum.dependency_count(), 3);

    // Drop every handle to y; the store keeps x and z
    sources.borrow_mut().remove(1);
    drop(y);
    assert_eq!(sum.dependency_count(), 2);
    assert!(x.is_implicit_dependency_of(&sum));
    assert!(z.is_implicit_dependency_of(&sum));
    assert!(sum.is_bound());
    // Re-run after losing the slot
    assert_eq!(runs.get(), 2);
    assert_eq!(sum.get(), 4);
    Runtime::verify().unwrap();
}

/// Writes from inside an updater propagate like any other write.
#[test]
fn reentrant_write_from_reaction() {
    let source = Property::new(1);
    let mirror = Property::new(0);
    let mirror_clone = mirror.clone();
    let _sync = Reaction::watch((&source,), move |value: i32| mirror_clone.set(value * 2));
    let mirror_for_view = mirror.clone();
    let view = Property::computed(move || mirror_for_view.get() + 1);

    source.set(5);
    assert_eq!(mirror.get(), 10);
    assert_eq!(view.get(), 11);
}

/// A property assigning itself from its own updater ends up unbound, and
/// the assignment wins over the value the updater returns.
#[test]
fn reentrant_write_to_self_unbinds() {
    let source = Property::new(1);
    let target = Property::new(0);
    let target_clone = target.clone();
    target.bind((&source,), move |value: i32| {
        if value > 1 {
            target_clone.set(-1);
        }
        value
    });
    assert!(target.is_bound());

    source.set(2);
    assert!(!target.is_bound());
    assert_eq!(target.get(), -1);
    assert_eq!(target.dependency_count(), 0);
    assert!(!source.is_dependency_of(&target));

    source.set(3);
    assert_eq!(target.get(), -1);
    Runtime::verify().unwrap();
}

/// Same for a generator with implicit dependencies: the reads of the
/// interrupted run are not registered.
#[test]
fn reentrant_write_to_self_drops_implicit_reads() {
    let source = Property::new(1);
    let target = Property::new(0);
    let (source_clone, target_clone) = (source.clone(), target.clone());
    target.bind_computed(move || {
        let value = source_clone.get();
        if value > 1 {
            target_clone.set(-1);
        }
        value
    });
    assert!(source.is_implicit_dependency_of(&target));

    source.set(2);
    assert!(!target.is_bound());
    assert_eq!(target.get(), -1);
    assert_eq!(target.dependency_count(), 0);
    assert_eq!(source.dependent_count(), 0);
    Runtime::verify().unwrap();
}

/// Rebinding from inside the running updater installs the new binding.
#[test]
fn rebind_from_own_updater_takes_over() {
    let source = Property::new(1);
    let other = Property::new(100);
    let target = Property::new(0);
    let (source_clone, target_clone, other_clone) =
        (source.clone(), target.clone(), other.clone());
    target.bind_computed(move || {
        let value = source_clone.get();
        if value > 1 {
            target_clone.bind((&other_clone,), |v: i32| v + 1);
        }
        value
    });
    assert_eq!(target.get(), 1);

    source.set(2);
    assert!(target.is_bound());
    assert_eq!(target.get(), 101);
    assert!(other.is_explicit_dependency_of(&target));
    assert!(!source.is_dependency_of(&target));

    source.set(3);
    assert_eq!(target.get(), 101);
    other.set(5);
    assert_eq!(target.get(), 6);
    Runtime::verify().unwrap();
}

/// A tracking pointer follows its target's lifetime.
#[test]
fn tracking_pointer_nulls() {
    let reaction = Reaction::new(|| ());
    let pointer = track(&reaction);
    assert!(pointer.get().is_some());
    assert!(reaction.is_dependency_of(&pointer));

    drop(reaction);
    assert!(pointer.is_null());
    assert!(pointer.get().is_none());
    Runtime::verify().unwrap();
}

/// A dependent destroyed by another dependent mid-propagation is skipped.
#[test]
fn propagation_survives_destruction_of_dependents() {
    let source = Property::new(1);
    let doomed: Rc<RefCell<Option<Property<i32>>>> = Rc::new(RefCell::new(None));

    let doomed_clone = doomed.clone();
    let source_clone = source.clone();
    let _reaper = Reaction::new(move || {
        if source_clone.get() > 1 {
            let victim = doomed_clone.borrow_mut().take();
            drop(victim);
        }
    });

    let (runs, runs_clone) = counter();
    let source_clone = source.clone();
    *doomed.borrow_mut() = Some(Property::computed(move || {
        bump(&runs_clone);
        source_clone.get() * 3
    }));
    assert_eq!(runs.get(), 1);
    assert_eq!(source.dependent_count(), 2);

    source.set(2);
    assert!(doomed.borrow().is_none());
    assert_eq!(runs.get(), 1);
    assert_eq!(source.dependent_count(), 1);
    Runtime::verify().unwrap();
}

/// The snapshot taken while a change propagates is not counted as a
/// dependent.
#[test]
fn dependent_count_is_stable_during_propagation() {
    let source = Property::new(0);
    let derived = Property::bound((&source,), |v: i32| v);
    let _view = Property::bound((&derived,), |v: i32| v * 2);

    let seen = Rc::new(Cell::new(usize::MAX));
    let (seen_clone, derived_clone) = (seen.clone(), derived.clone());
    let _watcher = Reaction::watch((&source,), move |_: i32| {
        seen_clone.set(derived_clone.dependent_count())
    });
    assert_eq!(seen.get(), 1);

    seen.set(usize::MAX);
    source.set(1);
    assert_eq!(seen.get(), 1);
    assert_eq!(derived.dependent_count(), 1);
    assert_eq!(source.dependent_count(), 2);
}

/// A snapshot of dependents stays valid while entries are unbound.
#[test]
fn tracking_list_snapshot_is_stable() {
    let source = Property::new(0);
    let first = Property::bound((&source,), |v: i32| v);
    let second = Property::bound((&source,), |v: i32| v);

    let list = TrackingList::dependents_of(&source);
    first.unbind();
    assert_eq!(list.len(), 2);
    assert_eq!(list.get(0), Some(first.node_id()));
    assert_eq!(source.dependent_count(), 1);

    drop(second);
    assert_eq!(list.iter().count(), 1);
    Runtime::verify().unwrap();
}

/// A panicking updater unbinds itself and every node it cascaded through.
#[test]
fn panic_unbinds_and_surfaces() {
    let source = Property::new(1);
    let source_clone = source.clone();
    let middle = Property::computed(move || source_clone.get() + 1);
    let middle_clone = middle.clone();
    let fragile = Property::computed(move || {
        let value = middle_clone.get();
        if value > 5 {
            panic!("value {value} out of range");
        }
        value
    });

    let result = Runtime::catch_update(|| source.set(10));
    match result {
        Err(ReactiveError::UpdaterPanicked { node, message }) => {
            assert_eq!(node, fragile.node_id());
            assert!(message.contains("out of range"));
        }
        other => panic!("expected an updater panic, got {other:?}"),
    }

    assert!(!fragile.is_bound());
    assert_eq!(fragile.get(), 2);
    assert!(!middle.is_bound());
    assert_eq!(middle.get(), 11);
    Runtime::verify().unwrap();

    // Static from now on
    source.set(2);
    assert_eq!(middle.get(), 11);
}

/// A generator panicking on its first evaluation leaves no node behind.
#[test]
fn first_evaluation_panic_destroys_the_new_node() {
    let source = Property::new(7);
    let baseline = Runtime::node_count();

    let source_clone = source.clone();
    let computed = Runtime::catch_update(|| {
        Property::computed(move || -> i32 {
            let value = source_clone.get();
            panic!("cannot compute from {value}")
        })
    });
    match computed {
        Err(ReactiveError::UpdaterPanicked { message, .. }) => {
            assert!(message.contains("cannot compute from 7"));
        }
        other => panic!("expected an updater panic, got {other:?}"),
    }
    assert_eq!(Runtime::node_count(), baseline);
    assert_eq!(source.dependent_count(), 0);
    Runtime::verify().unwrap();

    let bound = Runtime::catch_update(|| {
        Property::bound((&source,), |value: i32| -> i32 {
            panic!("cannot bind to {value}")
        })
    });
    match bound {
        Err(ReactiveError::UpdaterPanicked { message, .. }) => {
            assert!(message.contains("cannot bind to 7"));
        }
        other => panic!("expected an updater panic, got {other:?}"),
    }
    assert_eq!(Runtime::node_count(), baseline);
    assert_eq!(source.dependent_count(), 0);
    Runtime::verify().unwrap();
}

/// Panics that did not come from an updater are not converted.
#[test]
fn catch_update_passes_foreign_panics_through() {
    let outcome = std::panic::catch_unwind(|| {
        let _ = Runtime::catch_update(|| panic!("not an updater"));
    });
    assert!(outcome.is_err());
}

/// Dropping every cell leaves an empty graph.
#[test]
fn graph_is_empty_after_teardown() {
    let before = Runtime::node_count();
    {
        let a = Property::new(1);
        let b = Property::bound((&a,), |v: i32| v + 1);
        let b_clone = b.clone();
        let _c = Reaction::new(move || {
            b_clone.get();
        });
        let _pointer = track(&a);
        assert_eq!(Runtime::node_count(), before + 4);
    }
    assert_eq!(Runtime::node_count(), before);
}
