//! Tracking Helpers
//!
//! Two helper nodes built on the ordinary relation machinery:
//!
//! - [`Tracking`] holds a soft reference to another cell. It is a node with a
//!   single required explicit dependency; destroying the target severs that
//!   edge, which is what the pointer reports as null.
//!
//! - [`TrackingList`] snapshots a range of another node's relations as its
//!   own optional explicit dependencies. Iterating the snapshot stays valid
//!   while entries are destroyed or unbound, because the snapshot owns its
//!   edges: a destroyed entry just becomes a null slot.

use std::any::Any;
use std::marker::PhantomData;
use std::ops::Range;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::effect::Reaction;
use super::property::Property;
use super::runtime;
use crate::graph::{with_graph, Node, NodeId, Relation, Relations};

/// A helper node that carries relations but never recomputes anything.
struct Anchor {
    id: NodeId,
    label: &'static str,
}

impl Anchor {
    fn new(label: &'static str) -> Rc<Self> {
        let id = runtime::allocate();
        let anchor = Rc::new(Self { id, label });
        let handler: Weak<Anchor> = Rc::downgrade(&anchor);
        runtime::attach(id, handler);
        anchor
    }

    fn set_relations(&self, relations: &[Relation]) {
        with_graph(|graph| graph.set_explicit_dependencies(self.id, relations));
    }

    fn slot(&self, index: usize) -> Option<NodeId> {
        with_graph(|graph| {
            graph
                .get(self.id)
                .and_then(|record| record.explicit_dependencies().get(index).copied())
                .and_then(|relation| relation.target())
        })
    }

    fn slot_count(&self) -> usize {
        with_graph(|graph| graph.get(self.id).map_or(0, |record| record.explicit_count()))
    }
}

impl Node for Anchor {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn update(&self) {}

    fn describe(&self) -> String {
        self.label.to_string()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Drop for Anchor {
    fn drop(&mut self) {
        runtime::destroy(self.id);
    }
}

/// Cells a [`Tracking`] pointer can point at.
pub trait Trackable: Sized {
    fn tracking_id(&self) -> NodeId;

    /// Recover a handle to the live cell registered under a graph handler.
    fn from_handler(node: Rc<dyn Node>) -> Option<Self>;
}

impl<T: 'static> Trackable for Property<T> {
    fn tracking_id(&self) -> NodeId {
        self.id()
    }

    fn from_handler(node: Rc<dyn Node>) -> Option<Self> {
        Property::from_node(node)
    }
}

impl Trackable for Reaction {
    fn tracking_id(&self) -> NodeId {
        self.id()
    }

    fn from_handler(node: Rc<dyn Node>) -> Option<Self> {
        Reaction::from_node(node)
    }
}

/// A soft reference to a cell that becomes null once the cell is destroyed.
///
/// Holding a `Tracking` does not keep the target alive.
///
/// # Example
///
/// ```rust,ignore
/// let target = Property::new(1);
/// let pointer = track(&target);
/// assert!(pointer.get().is_some());
///
/// drop(target);
/// assert!(pointer.is_null());
/// ```
pub struct Tracking<N: Trackable> {
    anchor: Rc<Anchor>,
    _target: PhantomData<N>,
}

/// Start tracking `node`.
pub fn track<N: Trackable>(node: &N) -> Tracking<N> {
    let tracking = Tracking::null();
    tracking.retarget(node);
    tracking
}

impl<N: Trackable> Tracking<N> {
    /// A pointer that tracks nothing.
    pub fn null() -> Self {
        Self {
            anchor: Anchor::new("tracking"),
            _target: PhantomData,
        }
    }

    /// A handle to the target, or `None` once it is gone.
    pub fn get(&self) -> Option<N> {
        let target = self.target()?;
        N::from_handler(runtime::resolve(target)?)
    }

    /// Id of the tracked node, if it is still alive.
    pub fn target(&self) -> Option<NodeId> {
        self.anchor.slot(0)
    }

    pub fn is_null(&self) -> bool {
        self.target().is_none()
    }

    /// Stop tracking.
    pub fn reset(&self) {
        self.anchor.set_relations(&[]);
    }

    /// Track another node.
    pub fn retarget(&self, node: &N) {
        self.anchor
            .set_relations(&[Relation::required(node.tracking_id())]);
    }

    pub(crate) fn id(&self) -> NodeId {
        self.anchor.id
    }
}

impl<N: Trackable> Clone for Tracking<N> {
    /// A separate pointer to the same target.
    fn clone(&self) -> Self {
        let copy = Self::null();
        if let Some(target) = self.target() {
            copy.anchor.set_relations(&[Relation::required(target)]);
        }
        copy
    }
}

impl<N: Trackable> Default for Tracking<N> {
    fn default() -> Self {
        Self::null()
    }
}

impl<N: Trackable> std::fmt::Debug for Tracking<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracking")
            .field("id", &self.anchor.id)
            .field("target", &self.target())
            .finish()
    }
}

/// A snapshot of part of another node's relation list.
///
/// Entries destroyed after the snapshot was taken read as `None`; entries
/// created afterwards are not included.
pub struct TrackingList {
    anchor: Rc<Anchor>,
}

impl TrackingList {
    fn snapshot(targets: impl IntoIterator<Item = NodeId>) -> Self {
        let anchor = Anchor::new("tracking list");
        let relations: Relations = targets.into_iter().map(Relation::optional).collect();
        with_graph(|graph| {
            if let Some(record) = graph.get_mut(anchor.id) {
                record.set_transient(true);
            }
        });
        anchor.set_relations(&relations);
        Self { anchor }
    }

    /// Snapshot the current dependents of `id`.
    pub(crate) fn of_dependents(id: NodeId) -> Self {
        let dependents: SmallVec<[NodeId; 8]> = with_graph(|graph| {
            graph
                .get(id)
                .map(|record| record.dependents().iter().filter_map(Relation::target).collect())
                .unwrap_or_default()
        });
        Self::snapshot(dependents)
    }

    /// Snapshot the current dependents of `node`.
    pub fn dependents_of(node: &(impl super::Introspect + ?Sized)) -> Self {
        Self::of_dependents(node.node_id())
    }

    /// Snapshot the entries `range` of `node`'s whole relation list (all
    /// three zones). Null slots and out-of-range indices are skipped.
    pub fn range_of(node: &(impl super::Introspect + ?Sized), range: Range<usize>) -> Self {
        let id = node.node_id();
        let targets: SmallVec<[NodeId; 8]> = with_graph(|graph| {
            graph
                .get(id)
                .map(|record| {
                    let relations = record.relations();
                    let end = range.end.min(relations.len());
                    let start = range.start.min(end);
                    relations[start..end]
                        .iter()
                        .filter_map(Relation::target)
                        .collect()
                })
                .unwrap_or_default()
        });
        Self::snapshot(targets)
    }

    /// Number of entries, including destroyed ones.
    pub fn len(&self) -> usize {
        self.anchor.slot_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry at `index`, or `None` once it was destroyed.
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.anchor.slot(index)
    }

    /// A handle to the entry at `index`, if it is alive and of type `N`.
    pub fn get_as<N: Trackable>(&self, index: usize) -> Option<N> {
        N::from_handler(runtime::resolve(self.get(index)?)?)
    }

    /// Iterate the live entries. Each step re-reads the snapshot, so entries
    /// destroyed mid-iteration are skipped.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    pub(crate) fn id(&self) -> NodeId {
        self.anchor.id
    }
}

impl std::fmt::Debug for TrackingList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries((0..self.len()).map(|index| self.get(index))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Introspect;

    #[test]
    fn tracking_nulls_when_target_dies() {
        let target = Property::new(1);
        let pointer = track(&target);
        assert_eq!(pointer.target(), Some(target.id()));
        assert_eq!(pointer.get().map(|p| p.get()), Some(1));

        drop(target);
        assert!(pointer.is_null());
        assert!(pointer.get().is_none());
    }

    #[test]
    fn tracking_does_not_keep_target_alive() {
        let count = crate::reactive::Runtime::node_count();
        let target = Property::new(1);
        let pointer = track(&target);
        drop(target);
        // The pointer's own node is all that remains
        assert_eq!(crate::reactive::Runtime::node_count(), count + 1);
        drop(pointer);
        assert_eq!(crate::reactive::Runtime::node_count(), count);
    }

    #[test]
    fn reset_and_retarget() {
        let a = Property::new(1);
        let b = Property::new(2);
        let pointer = track(&a);

        pointer.reset();
        assert!(pointer.is_null());

        pointer.retarget(&b);
        assert_eq!(pointer.get().map(|p| p.get()), Some(2));
        assert!(!a.is_dependency_of(&pointer));
        assert!(b.is_dependency_of(&pointer));
    }

    #[test]
    fn cloned_pointer_is_independent() {
        let target = Property::new(1);
        let pointer = track(&target);
        let copy = pointer.clone();
        pointer.reset();
        assert!(pointer.is_null());
        assert_eq!(copy.target(), Some(target.id()));
    }

    #[test]
    fn list_survives_destruction_of_entries() {
        let source = Property::new(0);
        let first = Property::bound((&source,), |v: i32| v + 1);
        let second = Property::bound((&source,), |v: i32| v + 2);

        let list = TrackingList::dependents_of(&source);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0), Some(first.id()));

        drop(first);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0), None);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![second.id()]);
        assert_eq!(list.get_as::<Property<i32>>(1).map(|p| p.get()), Some(2));
    }

    #[test]
    fn snapshots_are_not_counted_as_dependents() {
        let source = Property::new(0);
        let derived = Property::bound((&source,), |v: i32| v);

        let list = TrackingList::dependents_of(&source);
        assert!(derived.is_dependency_of(&list));
        assert_eq!(derived.dependent_count(), 0);
        assert!(derived.status(0).dependents.is_empty());

        // Tracking pointers are real dependents
        let pointer = track(&derived);
        assert_eq!(derived.dependent_count(), 1);
        drop(pointer);
    }

    #[test]
    fn range_of_selects_relations() {
        let a = Property::new(1);
        let b = Property::new(2);
        let sum = Property::bound((&a, &b), |x: i32, y: i32| x + y);

        let explicit = TrackingList::range_of(&sum, 0..sum.dependency_count());
        assert_eq!(explicit.iter().collect::<Vec<_>>(), vec![a.id(), b.id()]);

        let clipped = TrackingList::range_of(&sum, 1..100);
        assert_eq!(clipped.len(), 1);
        assert!(clipped.is_dependent_on(&b));
    }
}
