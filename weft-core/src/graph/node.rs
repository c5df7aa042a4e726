//! Graph Nodes
//!
//! This module defines the per-node record that lives in the dependency
//! graph, the edge type stored in it, and the interface every kind of cell
//! implements so the graph can dispatch updates back to it.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are never reused, so an id that is no longer present in the graph
/// always belongs to a destroyed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One entry of a node's relation list.
///
/// A relation is a non-owning reference to another node plus the "required"
/// bit. Losing the target of a required relation unbinds the holder; losing
/// the target of an optional one only clears the slot.
///
/// `target == None` is an inert explicit slot whose node was destroyed. The
/// slot is kept because explicit dependencies are positional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Relation {
    target: Option<NodeId>,
    required: bool,
}

impl Relation {
    pub fn new(target: Option<NodeId>, required: bool) -> Self {
        Self { target, required }
    }

    /// A relation whose loss unbinds the holder.
    pub fn required(target: NodeId) -> Self {
        Self::new(Some(target), true)
    }

    /// A relation whose loss only nulls the slot.
    pub fn optional(target: NodeId) -> Self {
        Self::new(Some(target), false)
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    pub fn points_to(&self, id: NodeId) -> bool {
        self.target == Some(id)
    }

    pub(crate) fn clear(&mut self) {
        self.target = None;
    }

    pub(crate) fn retarget(&mut self, from: NodeId, to: NodeId) {
        if self.target == Some(from) {
            self.target = Some(to);
        }
    }
}

/// Relation storage. Most nodes have a handful of relations, so the list
/// lives inline until it grows past four entries.
pub type Relations = SmallVec<[Relation; 4]>;

/// Lifecycle of a node.
///
/// Only `Alive` nodes take part in reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    /// Allocated, but its owning cell has not been attached yet.
    Constructing,

    /// Attached to a cell and fully wired into the graph.
    Alive,

    /// Edges are being torn down.
    Destroying,
}

/// The three contiguous regions of a relation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Dependencies named at bind time, positionally meaningful.
    Explicit,

    /// Dependencies discovered by reads during the last update.
    Implicit,

    /// Nodes that depend on this one.
    Dependent,
}

/// The interface every kind of cell exposes to the graph.
///
/// The graph only holds weak handles to implementers; it calls back into
/// them to re-run updaters and to drop updaters when a node is severed.
pub trait Node {
    /// The id under which this cell is registered.
    fn node_id(&self) -> NodeId;

    /// Recompute the cell from its dependencies.
    fn update(&self);

    /// Drop the updater closure, if any.
    ///
    /// Graph edges have already been removed by the caller.
    fn release(&self) {}

    /// Human-readable rendering of the current value, for status dumps.
    fn describe(&self) -> String;

    /// Upcast used to recover the concrete cell type from a handle.
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// A node in the dependency graph.
///
/// The relation list is partitioned as `[0, E)` explicit dependencies,
/// `[E, E + I)` implicit dependencies and `[E + I, len)` dependents.
#[derive(Debug)]
pub struct NodeRecord {
    relations: Relations,
    explicit: usize,
    implicit: usize,
    has_updater: bool,
    /// Snapshot helper; left out of dependent counts and status dumps.
    transient: bool,
    lifecycle: Lifecycle,
    name: Option<String>,
    handler: Option<Weak<dyn Node>>,
}

impl NodeRecord {
    pub fn new() -> Self {
        Self {
            relations: Relations::new(),
            explicit: 0,
            implicit: 0,
            has_updater: false,
            transient: false,
            lifecycle: Lifecycle::Constructing,
            name: None,
            handler: None,
        }
    }

    /// The whole relation list, all three zones.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn explicit_dependencies(&self) -> &[Relation] {
        &self.relations[..self.explicit]
    }

    pub fn implicit_dependencies(&self) -> &[Relation] {
        &self.relations[self.explicit..self.explicit + self.implicit]
    }

    /// Explicit and implicit dependencies together.
    pub fn dependencies(&self) -> &[Relation] {
        &self.relations[..self.explicit + self.implicit]
    }

    pub fn dependents(&self) -> &[Relation] {
        &self.relations[self.explicit + self.implicit..]
    }

    pub fn explicit_count(&self) -> usize {
        self.explicit
    }

    pub fn implicit_count(&self) -> usize {
        self.implicit
    }

    pub fn dependent_count(&self) -> usize {
        self.relations.len() - self.explicit - self.implicit
    }

    pub fn zone_of(&self, index: usize) -> Zone {
        if index < self.explicit {
            Zone::Explicit
        } else if index < self.explicit + self.implicit {
            Zone::Implicit
        } else {
            Zone::Dependent
        }
    }

    pub fn has_updater(&self) -> bool {
        self.has_updater
    }

    pub(crate) fn set_has_updater(&mut self, has_updater: bool) {
        self.has_updater = has_updater;
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub(crate) fn set_transient(&mut self, transient: bool) {
        self.transient = transient;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub(crate) fn handler(&self) -> Option<Weak<dyn Node>> {
        self.handler.clone()
    }

    pub(crate) fn set_handler(&mut self, handler: Weak<dyn Node>) {
        self.handler = Some(handler);
    }

    /// Whether any dependency slot (explicit or implicit) points at `target`.
    pub fn references(&self, target: NodeId) -> bool {
        self.dependencies().iter().any(|r| r.points_to(target))
    }

    pub fn has_explicit(&self, target: NodeId) -> bool {
        self.explicit_dependencies().iter().any(|r| r.points_to(target))
    }

    pub fn has_implicit(&self, target: NodeId) -> bool {
        self.implicit_dependencies().iter().any(|r| r.points_to(target))
    }

    pub fn has_dependent(&self, dependent: NodeId) -> bool {
        self.dependents().iter().any(|r| r.points_to(dependent))
    }

    /// Append at the end of the explicit zone.
    pub(crate) fn push_explicit(&mut self, relation: Relation) {
        self.relations.insert(self.explicit, relation);
        self.explicit += 1;
    }

    /// Append at the end of the implicit zone.
    pub(crate) fn push_implicit(&mut self, target: NodeId) {
        self.relations
            .insert(self.explicit + self.implicit, Relation::optional(target));
        self.implicit += 1;
    }

    /// Register a dependent. Dependents are coalesced: a node that refers to
    /// us from several slots is listed once.
    pub(crate) fn push_dependent(&mut self, dependent: NodeId) -> bool {
        if self.has_dependent(dependent) {
            return false;
        }
        self.relations.push(Relation::optional(dependent));
        true
    }

    pub(crate) fn remove_dependent(&mut self, dependent: NodeId) -> bool {
        let start = self.explicit + self.implicit;
        match self.relations[start..]
            .iter()
            .position(|r| r.points_to(dependent))
        {
            Some(offset) => {
                self.relations.remove(start + offset);
                true
            }
            None => false,
        }
    }

    /// Erase `target` from the implicit zone, if present.
    pub(crate) fn remove_implicit(&mut self, target: NodeId) -> bool {
        match self
            .implicit_dependencies()
            .iter()
            .position(|r| r.points_to(target))
        {
            Some(offset) => {
                self.relations.remove(self.explicit + offset);
                self.implicit -= 1;
                true
            }
            None => false,
        }
    }

    /// Forget a destroyed dependency: explicit slots pointing at it are
    /// nulled in place, the implicit slot (at most one) is erased.
    pub(crate) fn forget(&mut self, target: NodeId) {
        for slot in &mut self.relations[..self.explicit] {
            if slot.points_to(target) {
                slot.clear();
            }
        }
        self.remove_implicit(target);
    }

    /// Overwrite the explicit zone with `new`, index by index.
    pub(crate) fn assign_explicit(&mut self, new: &[Relation]) {
        let common = self.explicit.min(new.len());
        for (slot, relation) in self.relations[..common].iter_mut().zip(new) {
            if slot != relation {
                *slot = *relation;
            }
        }
        if new.len() > self.explicit {
            self.relations
                .insert_many(self.explicit, new[common..].iter().copied());
        } else {
            self.relations.drain(new.len()..self.explicit);
        }
        self.explicit = new.len();
    }

    /// Overwrite the implicit zone with `targets`: the common prefix is
    /// rewritten in place, then the tail is inserted or deleted.
    pub(crate) fn assign_implicit(&mut self, targets: &[NodeId]) {
        let start = self.explicit;
        let common = self.implicit.min(targets.len());
        for (slot, target) in self.relations[start..start + common]
            .iter_mut()
            .zip(targets)
        {
            if !slot.points_to(*target) {
                *slot = Relation::optional(*target);
            }
        }
        if targets.len() > self.implicit {
            self.relations.insert_many(
                start + self.implicit,
                targets[common..].iter().map(|t| Relation::optional(*t)),
            );
        } else {
            self.relations
                .drain(start + targets.len()..start + self.implicit);
        }
        self.implicit = targets.len();
    }

    /// Remove both dependency zones and return them.
    pub(crate) fn take_dependencies(&mut self) -> Relations {
        let taken = self.relations.drain(..self.explicit + self.implicit).collect();
        self.explicit = 0;
        self.implicit = 0;
        taken
    }

    /// Move the relation list (with its zone counts and bound flag) out,
    /// leaving this record empty and unbound.
    pub(crate) fn take_relations(&mut self) -> (Relations, usize, usize, bool) {
        let taken = (
            std::mem::take(&mut self.relations),
            self.explicit,
            self.implicit,
            self.has_updater,
        );
        self.explicit = 0;
        self.implicit = 0;
        self.has_updater = false;
        taken
    }

    pub(crate) fn put_relations(&mut self, parts: (Relations, usize, usize, bool)) {
        let (relations, explicit, implicit, has_updater) = parts;
        self.relations = relations;
        self.explicit = explicit;
        self.implicit = implicit;
        self.has_updater = has_updater;
    }

    /// Replace every reference to `from` with `to`, in all zones.
    pub(crate) fn retarget(&mut self, from: NodeId, to: NodeId) {
        for relation in &mut self.relations {
            relation.retarget(from, to);
        }
    }
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self::new()
    }
}
