//! Property Implementation
//!
//! A Property is the typed reactive cell. It holds a value and optionally an
//! updater that recomputes the value from other cells.
//!
//! # How Properties Work
//!
//! 1. Reading a property while another node is updating registers the
//!    property as an implicit dependency of that node.
//!
//! 2. Writing a property compares the new value with the old one. Only a
//!    change notifies dependents.
//!
//! 3. A bound property re-runs its updater whenever one of its dependencies
//!    changes. Explicit dependencies are named at bind time and passed to the
//!    updater as arguments; implicit ones are whatever it read last time.
//!
//! 4. Assigning a plain value unbinds the property first.
//!
//! # Handles
//!
//! `Property<T>` is a shared handle: clones refer to the same cell, and the
//! node is destroyed when the last handle is dropped. Use [`Property::copied`]
//! for an independent copy of the current value.
//!
//! # Memory Layout
//!
//! Each property consists of:
//! - The node id (8 bytes); the relation list lives in the graph store
//! - The value, behind a `RefCell`
//! - The optional updater closure and its epoch counter
//! - The equality policy and the value describer used by status dumps

use std::any::type_name;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::binder::{Apply, Generate, IntoGenerator, IntoUpdater, UpdateResult};
use super::context;
use super::runtime;
use crate::graph::{with_graph, Node, NodeId, Relation};

/// The stored recomputation of a property.
pub(crate) enum Updater<T> {
    Generate(Generate<T>),
    Apply(Apply<T>),
}

fn never_equal<T>(_: &T, _: &T) -> bool {
    false
}

fn describe_opaque<T>(_: &T) -> String {
    format!("<{}>", type_name::<T>())
}

fn describe_debug<T: fmt::Debug>(value: &T) -> String {
    format!("{value:?}")
}

pub(crate) struct PropertyInner<T> {
    id: NodeId,
    value: RefCell<T>,
    updater: RefCell<Option<Updater<T>>>,
    /// Bumped whenever the updater is replaced or dropped.
    epoch: Cell<u64>,
    same: Cell<fn(&T, &T) -> bool>,
    describer: Cell<fn(&T) -> String>,
}

impl<T> PropertyInner<T> {
    /// Write `next` unless the equality policy considers it unchanged.
    fn store(&self, next: T) -> UpdateResult {
        let same = self.same.get();
        let mut value = self.value.borrow_mut();
        if same(&value, &next) {
            return UpdateResult::Unchanged;
        }
        let old = std::mem::replace(&mut *value, next);
        drop(value);
        drop(old);
        UpdateResult::Changed
    }

    /// Swap in a new updater, returning the old one.
    fn install(&self, updater: Option<Updater<T>>) -> Option<Updater<T>> {
        self.epoch.set(self.epoch.get() + 1);
        self.updater.replace(updater)
    }
}

impl<T: 'static> Node for PropertyInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn update(&self) {
        runtime::drive(self.id, &self.updater, &self.epoch, |updater, relations| {
            match updater {
                Updater::Generate(generate) => {
                    let started = self.epoch.get();
                    match generate(relations) {
                        // Assigned or rebound from inside the generator
                        Some(_) if self.epoch.get() != started => UpdateResult::Unchanged,
                        Some(next) => self.store(next),
                        None => UpdateResult::Unbind,
                    }
                }
                Updater::Apply(apply) => {
                    let mut value = self.value.borrow_mut();
                    apply(&mut *value, relations)
                }
            }
        });
    }

    fn release(&self) {
        let old = self.install(None);
        drop(old);
    }

    fn describe(&self) -> String {
        match self.value.try_borrow() {
            Ok(value) => (self.describer.get())(&value),
            Err(_) => "<borrowed>".to_string(),
        }
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn std::any::Any> {
        self
    }
}

impl<T> Drop for PropertyInner<T> {
    fn drop(&mut self) {
        runtime::destroy(self.id);
    }
}

/// A typed reactive cell.
///
/// # Example
///
/// ```rust,ignore
/// let a = Property::new(1);
/// let b = Property::computed({
///     let a = a.clone();
///     move || a.get() + 1
/// });
/// assert_eq!(b.get(), 2);
///
/// a.set(5);
/// assert_eq!(b.get(), 6);
/// ```
pub struct Property<T: 'static> {
    inner: Rc<PropertyInner<T>>,
}

impl<T: 'static> Property<T> {
    fn from_parts(
        id: NodeId,
        value: T,
        updater: Option<Updater<T>>,
        same: fn(&T, &T) -> bool,
    ) -> Self {
        let inner = Rc::new(PropertyInner {
            id,
            value: RefCell::new(value),
            updater: RefCell::new(updater),
            epoch: Cell::new(0),
            same: Cell::new(same),
            describer: Cell::new(describe_opaque::<T>),
        });
        let handler: Weak<PropertyInner<T>> = Rc::downgrade(&inner);
        runtime::attach(id, handler);
        Self { inner }
    }

    fn with_policy(value: T, same: fn(&T, &T) -> bool) -> Self {
        Self::from_parts(runtime::allocate(), value, None, same)
    }

    /// Create a property whose payload has no meaningful equality. Every
    /// write notifies dependents.
    pub fn opaque(value: T) -> Self {
        Self::with_policy(value, never_equal::<T>)
    }

    /// Recover a handle from a graph handler.
    pub(crate) fn from_node(node: Rc<dyn Node>) -> Option<Self> {
        node.into_any()
            .downcast::<PropertyInner<T>>()
            .ok()
            .map(|inner| Self { inner })
    }

    pub(crate) fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Render values as `Debug` in status dumps.
    pub fn with_debug(self) -> Self
    where
        T: fmt::Debug,
    {
        self.inner.describer.set(describe_debug::<T>);
        self
    }

    // ---- Reads ----

    /// Get the current value.
    ///
    /// If called during another node's update, this also registers the
    /// property as a dependency of that node.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        runtime::read_notify(self.id());
        self.inner.value.borrow().clone()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Read the value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        runtime::read_notify(self.id());
        f(&self.inner.value.borrow())
    }

    /// Borrow the value. The property stays borrowed while the guard lives.
    pub fn borrow(&self) -> Ref<'_, T> {
        runtime::read_notify(self.id());
        self.inner.value.borrow()
    }

    pub(crate) fn value_cell(&self) -> &RefCell<T> {
        &self.inner.value
    }

    // ---- Writes ----

    /// Assign a value.
    ///
    /// The property is unbound first. Dependents are notified only if the
    /// value changed.
    pub fn set(&self, value: T) {
        self.unbind();
        if self.inner.store(value) == UpdateResult::Changed {
            runtime::write_notify(self.id());
        }
    }

    /// Assign a value and return the previous one.
    pub fn replace(&self, value: T) -> T {
        self.unbind();
        let same = self.inner.same.get();
        let (old, changed) = {
            let mut current = self.inner.value.borrow_mut();
            let old = std::mem::replace(&mut *current, value);
            let changed = !same(&old, &current);
            (old, changed)
        };
        if changed {
            runtime::write_notify(self.id());
        }
        old
    }

    /// Mutate the value in place and notify dependents once.
    ///
    /// The property stays bound; its next update overwrites the change.
    pub fn apply<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        runtime::write_notify(self.id());
        result
    }

    /// Like [`apply`](Self::apply), but skips the notification if the value
    /// compares equal to a snapshot taken before `f`.
    pub fn apply_if_changed<R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Clone,
    {
        let (result, changed) = {
            let mut value = self.inner.value.borrow_mut();
            let before = value.clone();
            let result = f(&mut value);
            (result, !(self.inner.same.get())(&before, &value))
        };
        if changed {
            runtime::write_notify(self.id());
        }
        result
    }

    /// Notify dependents without changing the value.
    pub fn notify(&self) {
        runtime::write_notify(self.id());
    }

    // ---- Binding ----

    /// Bind a generator over explicit dependencies and run it once.
    ///
    /// Closure parameters must be annotated; see [`binder`](super::binder)
    /// for how each parameter type is fetched.
    pub fn bind<D, P>(&self, dependencies: D, generator: impl IntoGenerator<T, D, P>) {
        let binding = generator.into_generator(dependencies);
        self.rebind_with(Updater::Generate(binding.updater), &binding.dependencies);
    }

    /// Bind an in-place updater over explicit dependencies and run it once.
    pub fn bind_updater<D, P>(&self, dependencies: D, updater: impl IntoUpdater<T, D, P>) {
        let binding = updater.into_updater(dependencies);
        self.rebind_with(Updater::Apply(binding.updater), &binding.dependencies);
    }

    /// Bind a generator whose dependencies are discovered from its reads.
    pub fn bind_computed(&self, mut generator: impl FnMut() -> T + 'static) {
        self.rebind_with(Updater::Generate(Box::new(move |_| Some(generator()))), &[]);
    }

    fn rebind_with(&self, updater: Updater<T>, dependencies: &[Relation]) {
        let old = self.inner.install(Some(updater));
        runtime::rebind(self.id(), dependencies);
        drop(old);
        self.inner.update();
    }

    /// Drop the updater. The current value is kept.
    pub fn unbind(&self) {
        if runtime::is_bound(self.id()) {
            runtime::unbind(self.id());
        }
    }

    /// Whether the property has an updater.
    pub fn is_bound(&self) -> bool {
        runtime::is_bound(self.id())
    }

    /// Re-run the updater now.
    pub fn update(&self) {
        self.inner.update();
    }

    // ---- Moves ----

    /// Move this cell into a new property, leaving a default unbound cell
    /// behind.
    ///
    /// The new property takes over the value, the updater and every relation:
    /// dependents of this cell now depend on the returned one.
    pub fn take(&self) -> Self
    where
        T: Default,
    {
        let fresh = Self::with_policy(T::default(), self.inner.same.get());
        fresh.inner.describer.set(self.inner.describer.get());

        fresh.inner.value.swap(&self.inner.value);
        let updater = self.inner.install(None);
        fresh.inner.install(updater);

        let (from, to) = (self.id(), fresh.id());
        with_graph(|graph| {
            graph.relocate(from, to);
            let name = graph.get_mut(from).and_then(|record| {
                let name = record.name().map(str::to_string);
                record.set_name(None);
                name
            });
            if let Some(record) = graph.get_mut(to) {
                record.set_name(name);
            }
        });
        fresh
    }

    /// Exchange value, updater and relations with `other`.
    ///
    /// Dependents follow the value: whatever depended on `self` depends on
    /// `other` afterwards, and vice versa.
    pub fn swap(&self, other: &Property<T>) {
        if Rc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        self.inner.value.swap(&other.inner.value);
        self.inner.updater.swap(&other.inner.updater);
        self.inner.same.swap(&other.inner.same);
        self.inner.describer.swap(&other.inner.describer);
        for inner in [&self.inner, &other.inner] {
            inner.epoch.set(inner.epoch.get() + 1);
        }
        let (a, b) = (self.id(), other.id());
        with_graph(|graph| graph.swap(a, b));
    }
}

impl<T: PartialEq + 'static> Property<T> {
    /// Create an unbound property.
    pub fn new(value: T) -> Self {
        Self::with_policy(value, <T as PartialEq>::eq)
    }

    /// Create a property computed by `generator`, with dependencies
    /// discovered from what it reads.
    pub fn computed(mut generator: impl FnMut() -> T + 'static) -> Self {
        let id = runtime::allocate();
        let value = first_value(id, || generator());
        let updater: Generate<T> = Box::new(move |_| Some(generator()));
        Self::bound_parts(id, value, updater)
    }

    /// Create a property computed from explicit dependencies.
    ///
    /// ```rust,ignore
    /// let p1 = Property::new(1);
    /// let p2 = Property::new(1);
    /// let p3 = Property::bound((&p1, &p2), |a: i32, b: i32| a + b);
    /// ```
    pub fn bound<D, P>(dependencies: D, generator: impl IntoGenerator<T, D, P>) -> Self {
        let id = runtime::allocate();
        let (value, binding) = first_value(id, || generator.into_seeded(dependencies));
        runtime::rebind(id, &binding.dependencies);
        Self::bound_parts(id, value, binding.updater)
    }

    /// Create a property holding `initial`, then bind `updater` to it.
    pub fn with_updater<D, P>(
        initial: T,
        dependencies: D,
        updater: impl IntoUpdater<T, D, P>,
    ) -> Self {
        let property = Self::new(initial);
        property.bind_updater(dependencies, updater);
        property
    }

    fn bound_parts(id: NodeId, value: T, updater: Generate<T>) -> Self {
        let property = Self::from_parts(
            id,
            value,
            Some(Updater::Generate(updater)),
            <T as PartialEq>::eq,
        );
        with_graph(|graph| {
            if let Some(record) = graph.get_mut(id) {
                record.set_has_updater(true);
            }
        });
        property
    }
}

impl<T: Clone + 'static> Property<T> {
    /// A new, unbound property holding a copy of the current value.
    pub fn copied(&self) -> Self {
        let copy = Self::with_policy(self.get_untracked(), self.inner.same.get());
        copy.inner.describer.set(self.inner.describer.get());
        copy
    }
}

/// Run the first evaluation of a new node's generator.
///
/// On panic the half-built node is destroyed before unwinding continues.
fn first_value<T>(id: NodeId, run: impl FnOnce() -> T) -> T {
    let outcome = {
        let _scope = context::update_start(id);
        panic::catch_unwind(AssertUnwindSafe(run))
    };
    match outcome {
        Ok(value) => value,
        Err(payload) => {
            runtime::updater_panicked(id, payload.as_ref());
            runtime::destroy(id);
            panic::resume_unwind(payload)
        }
    }
}

impl<T: 'static> Clone for Property<T> {
    /// Another handle to the same cell.
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Default + PartialEq + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: PartialEq + 'static> From<T> for Property<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Property");
        debug.field("id", &self.id());
        match self.inner.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<borrowed>"),
        };
        debug.field("bound", &self.is_bound()).finish()
    }
}

impl<T: fmt::Display + 'static> fmt::Display for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| fmt::Display::fmt(value, f))
    }
}

// ---- Tests ----
