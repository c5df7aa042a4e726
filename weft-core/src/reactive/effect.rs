//! Reaction Implementation
//!
//! A Reaction is a void cell: it has no value, only an updater that runs for
//! its side effects whenever its dependencies change.
//!
//! # How Reactions Work
//!
//! 1. When created, the reaction runs its closure immediately to establish
//!    its dependencies (unless created with [`Reaction::lazy`]).
//!
//! 2. When any dependency changes, the reaction re-runs synchronously.
//!
//! 3. Every run rebuilds the implicit dependencies from what the closure
//!    read; explicit dependencies are passed in as arguments.
//!
//! # Use Cases
//!
//! Reactions synchronize reactive state with the outside world:
//!
//! - Pushing values into a widget or a platform handle
//! - Logging state changes
//!
//! # Differences from Property
//!
//! - Properties hold a value; reactions do not.
//! - A reaction returning `()` never notifies dependents.
//! - Disposing a reaction is unbinding it: it keeps its node but never runs
//!   again.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::binder::{IntoReaction, React, ReactionOutput};
use super::runtime;
use crate::graph::{Node, NodeId, Relation};

struct ReactionInner {
    id: NodeId,
    run: RefCell<Option<React>>,
    epoch: Cell<u64>,
    runs: Cell<usize>,
}

impl ReactionInner {
    fn install(&self, run: Option<React>) -> Option<React> {
        self.epoch.set(self.epoch.get() + 1);
        self.run.replace(run)
    }
}

impl Node for ReactionInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn update(&self) {
        runtime::drive(self.id, &self.run, &self.epoch, |run, relations| {
            self.runs.set(self.runs.get() + 1);
            run(relations)
        });
    }

    fn release(&self) {
        let old = self.install(None);
        drop(old);
    }

    fn describe(&self) -> String {
        format!("reaction ({} runs)", self.runs.get())
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Drop for ReactionInner {
    fn drop(&mut self) {
        runtime::destroy(self.id);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Property::new(0);
///
/// let reaction = Reaction::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct Reaction {
    inner: Rc<ReactionInner>,
}

impl Reaction {
    fn unbound() -> Self {
        let id = runtime::allocate();
        let inner = Rc::new(ReactionInner {
            id,
            run: RefCell::new(None),
            epoch: Cell::new(0),
            runs: Cell::new(0),
        });
        let handler: Weak<ReactionInner> = Rc::downgrade(&inner);
        runtime::attach(id, handler);
        Self { inner }
    }

    fn wrap<R: ReactionOutput>(mut run: impl FnMut() -> R + 'static) -> React {
        Box::new(move |_| run().into_result())
    }

    /// Create a reaction with implicit dependencies.
    ///
    /// The closure runs immediately to establish them.
    pub fn new<R: ReactionOutput>(run: impl FnMut() -> R + 'static) -> Self {
        let reaction = Self::lazy(run);
        reaction.run();
        reaction
    }

    /// Create a reaction without running it.
    ///
    /// It has no dependencies until the first [`run`](Self::run).
    pub fn lazy<R: ReactionOutput>(run: impl FnMut() -> R + 'static) -> Self {
        let reaction = Self::unbound();
        reaction.install(Self::wrap(run), &[]);
        reaction
    }

    /// Create a reaction over explicit dependencies and run it once.
    ///
    /// ```rust,ignore
    /// let reaction = Reaction::watch((&width,), |w: i32| println!("width {w}"));
    /// ```
    pub fn watch<D, M>(dependencies: D, run: impl IntoReaction<D, M>) -> Self {
        let reaction = Self::unbound();
        reaction.rebind(dependencies, run);
        reaction
    }

    /// Replace the closure and its explicit dependencies, then run once.
    pub fn rebind<D, M>(&self, dependencies: D, run: impl IntoReaction<D, M>) {
        let binding = run.into_reaction(dependencies);
        self.install(binding.updater, &binding.dependencies);
        self.run();
    }

    fn install(&self, run: React, dependencies: &[Relation]) {
        let old = self.inner.install(Some(run));
        runtime::rebind(self.inner.id, dependencies);
        drop(old);
    }

    /// Run the closure now.
    pub fn run(&self) {
        self.inner.update();
    }

    /// Stop the reaction. It drops its closure and all of its edges.
    pub fn dispose(&self) {
        runtime::unbind(self.inner.id);
    }

    /// Check if the reaction has been disposed or severed.
    pub fn is_disposed(&self) -> bool {
        !runtime::is_bound(self.inner.id)
    }

    /// Get the number of times the reaction has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    pub(crate) fn id(&self) -> NodeId {
        self.inner.id
    }

    pub(crate) fn from_node(node: Rc<dyn Node>) -> Option<Self> {
        node.into_any()
            .downcast::<ReactionInner>()
            .ok()
            .map(|inner| Self { inner })
    }
}

impl Clone for Reaction {
    /// Another handle to the same reaction.
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.inner.id)
            .field("runs", &self.inner.runs.get())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ---- Tests ----
