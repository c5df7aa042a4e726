//! Graph Store
//!
//! The store owns every node record of the current thread and performs all
//! edge mutations. Every mutation keeps the two directions of an edge in
//! sync: if B lists A as a dependency, A lists B exactly once among its
//! dependents, and vice versa.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

use smallvec::SmallVec;

use super::node::{Lifecycle, Node, NodeId, NodeRecord, Relation, Relations};

thread_local! {
    static GRAPH: RefCell<Graph> = RefCell::new(Graph::new());
}

/// Run `f` against this thread's graph.
///
/// `f` must not call back into cells: the graph stays borrowed for the
/// duration of the call.
pub(crate) fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Like [`with_graph`], but returns `None` once the thread-local graph has
/// been torn down (cells dropped from other thread-local destructors).
pub(crate) fn try_with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> Option<R> {
    GRAPH
        .try_with(|graph| graph.try_borrow_mut().ok().map(|mut g| f(&mut g)))
        .ok()
        .flatten()
}

/// What destroying a node did to one of its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Severed {
    /// The dependent.
    pub node: NodeId,

    /// The dependent held a required edge and was unbound. Its updater still
    /// has to be released by the cell itself.
    pub unbound: bool,

    /// The dependent had an updater before the node went away. Helper nodes
    /// such as tracking pointers carry required edges without one.
    pub had_updater: bool,
}

/// All node records of one thread, indexed by ID.
pub struct Graph {
    nodes: HashMap<NodeId, NodeRecord>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Allocate a fresh record in the `Constructing` state.
    pub fn insert(&mut self) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, NodeRecord::new());
        id
    }

    /// Attach the owning cell and mark the node alive.
    pub fn attach(&mut self, id: NodeId, handler: Weak<dyn Node>) {
        if let Some(record) = self.nodes.get_mut(&id) {
            record.set_handler(handler);
            record.set_lifecycle(Lifecycle::Alive);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|r| r.lifecycle() == Lifecycle::Alive)
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&id)
    }

    /// Dependents of `id` other than transient snapshot helpers.
    pub fn visible_dependents(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|record| record.dependents().iter().filter_map(Relation::target))
            .filter(|dependent| !self.nodes.get(dependent).is_some_and(NodeRecord::is_transient))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn handler(&self, id: NodeId) -> Option<Weak<dyn Node>> {
        self.nodes.get(&id).and_then(NodeRecord::handler)
    }

    /// Register `dependent` among `target`'s dependents (coalesced).
    fn link(&mut self, dependent: NodeId, target: NodeId) {
        if let Some(record) = self.nodes.get_mut(&target) {
            record.push_dependent(dependent);
        }
    }

    /// Drop the reciprocal edge once `dependent` no longer refers to
    /// `target` from any dependency slot.
    fn unlink_if_unreferenced(&mut self, dependent: NodeId, target: NodeId) {
        let referenced = self
            .nodes
            .get(&dependent)
            .is_some_and(|r| r.references(target));
        if referenced {
            return;
        }
        if let Some(record) = self.nodes.get_mut(&target) {
            record.remove_dependent(dependent);
        }
    }

    /// Append an explicit dependency and register the reciprocal edge.
    ///
    /// Explicit dependencies are managed as a batch by the caller; the same
    /// target may occupy several positions.
    pub fn add_explicit_dependency(&mut self, id: NodeId, target: NodeId, required: bool) {
        if id == target || !self.nodes.contains_key(&target) {
            return;
        }
        let Some(record) = self.nodes.get_mut(&id) else {
            return;
        };
        record.remove_implicit(target);
        record.push_explicit(Relation::new(Some(target), required));
        self.link(id, target);
    }

    /// Append an implicit dependency unless `target` already appears in
    /// either dependency zone. Returns whether an edge was added.
    pub fn add_implicit_dependency(&mut self, id: NodeId, target: NodeId) -> bool {
        if id == target || !self.nodes.contains_key(&target) {
            return false;
        }
        let Some(record) = self.nodes.get_mut(&id) else {
            return false;
        };
        if record.references(target) {
            return false;
        }
        record.push_implicit(target);
        self.link(id, target);
        true
    }

    /// Replace the explicit zone with `new`, diffing index by index.
    ///
    /// Self references and references to dead nodes become null slots, which
    /// keeps positions stable for the updater's argument list.
    pub fn set_explicit_dependencies(&mut self, id: NodeId, new: &[Relation]) {
        let sanitized: Relations = new
            .iter()
            .map(|relation| match relation.target() {
                Some(target) if target == id || !self.nodes.contains_key(&target) => {
                    Relation::new(None, relation.is_required())
                }
                _ => *relation,
            })
            .collect();

        let Some(record) = self.nodes.get_mut(&id) else {
            return;
        };
        let old: SmallVec<[NodeId; 4]> = record
            .explicit_dependencies()
            .iter()
            .filter_map(Relation::target)
            .collect();
        record.assign_explicit(&sanitized);
        for target in sanitized.iter().filter_map(Relation::target) {
            record.remove_implicit(target);
        }

        for target in sanitized.iter().filter_map(Relation::target) {
            self.link(id, target);
        }
        for target in old {
            self.unlink_if_unreferenced(id, target);
        }
    }

    /// Reconcile the implicit zone with the reads of the latest update.
    ///
    /// Reads that are already explicit dependencies, the node itself, and
    /// nodes destroyed during the update are skipped. Reciprocal edges are
    /// only touched for targets that actually entered or left the zone.
    pub fn set_implicit_dependencies(&mut self, id: NodeId, reads: &[NodeId]) {
        let Some(record) = self.nodes.get(&id) else {
            return;
        };
        let mut fresh: SmallVec<[NodeId; 8]> = SmallVec::new();
        for &target in reads {
            if target != id
                && self.nodes.contains_key(&target)
                && !record.has_explicit(target)
                && !fresh.contains(&target)
            {
                fresh.push(target);
            }
        }
        let old: SmallVec<[NodeId; 8]> = record
            .implicit_dependencies()
            .iter()
            .filter_map(Relation::target)
            .collect();

        if let Some(record) = self.nodes.get_mut(&id) {
            record.assign_implicit(&fresh);
        }
        for target in fresh.iter().filter(|t| !old.contains(t)) {
            self.link(id, *target);
        }
        for target in old.iter().filter(|t| !fresh.contains(t)) {
            self.unlink_if_unreferenced(id, *target);
        }
    }

    /// Graph side of unbinding: forget the updater and remove every
    /// dependency edge in both directions.
    pub fn clear_dependencies(&mut self, id: NodeId) {
        let Some(record) = self.nodes.get_mut(&id) else {
            return;
        };
        record.set_has_updater(false);
        let old = record.take_dependencies();
        for target in old.iter().filter_map(Relation::target) {
            if let Some(target) = self.nodes.get_mut(&target) {
                target.remove_dependent(id);
            }
        }
    }

    /// Tear a node out of the graph.
    ///
    /// The node leaves its dependencies' dependent lists. Each dependent
    /// either held a required edge, in which case it is unbound on the graph
    /// side, or has its slots forgotten (explicit slots nulled, the implicit
    /// slot erased). The record is removed before returning.
    pub fn detach(&mut self, id: NodeId) -> Vec<Severed> {
        let Some(record) = self.nodes.get_mut(&id) else {
            return Vec::new();
        };
        record.set_lifecycle(Lifecycle::Destroying);
        let dependencies = record.take_dependencies();
        let dependents: SmallVec<[NodeId; 8]> = record
            .dependents()
            .iter()
            .filter_map(Relation::target)
            .collect();

        for target in dependencies.iter().filter_map(Relation::target) {
            if let Some(target) = self.nodes.get_mut(&target) {
                target.remove_dependent(id);
            }
        }

        let mut severed = Vec::with_capacity(dependents.len());
        for dependent in dependents {
            let Some(record) = self.nodes.get_mut(&dependent) else {
                continue;
            };
            let required = record
                .dependencies()
                .iter()
                .any(|r| r.points_to(id) && r.is_required());
            let had_updater = record.has_updater();
            if required {
                self.clear_dependencies(dependent);
            } else {
                record.forget(id);
            }
            severed.push(Severed {
                node: dependent,
                unbound: required,
                had_updater,
            });
        }

        self.nodes.remove(&id);
        severed
    }

    /// Move every relation of `from` onto `to` and repoint all reciprocal
    /// references. `to` must have no relations of its own.
    pub fn relocate(&mut self, from: NodeId, to: NodeId) {
        if from == to || !self.nodes.contains_key(&to) {
            return;
        }
        let Some(parts) = self.nodes.get_mut(&from).map(NodeRecord::take_relations) else {
            return;
        };
        let targets: SmallVec<[NodeId; 8]> =
            parts.0.iter().filter_map(Relation::target).collect();
        if let Some(record) = self.nodes.get_mut(&to) {
            debug_assert!(record.relations().is_empty(), "relocation target must be empty");
            record.put_relations(parts);
        }
        for target in targets {
            if let Some(record) = self.nodes.get_mut(&target) {
                record.retarget(from, to);
            }
        }
    }

    /// Exchange the relation lists of two nodes.
    ///
    /// A transient sentinel record holds one side while the other is moved
    /// over, so swapping related nodes never aliases. Names, handlers and
    /// lifecycles stay with their records.
    pub fn swap(&mut self, a: NodeId, b: NodeId) {
        if a == b || !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
            return;
        }
        let sentinel = self.insert();
        self.relocate(a, sentinel);
        self.relocate(b, a);
        self.relocate(sentinel, b);
        self.nodes.remove(&sentinel);
    }

    pub fn depends_on(&self, dependent: NodeId, target: NodeId) -> bool {
        self.nodes
            .get(&dependent)
            .is_some_and(|r| r.references(target))
    }

    pub fn depends_explicitly_on(&self, dependent: NodeId, target: NodeId) -> bool {
        self.nodes
            .get(&dependent)
            .is_some_and(|r| r.has_explicit(target))
    }

    pub fn depends_implicitly_on(&self, dependent: NodeId, target: NodeId) -> bool {
        self.nodes
            .get(&dependent)
            .is_some_and(|r| r.has_implicit(target))
    }

    /// Check the bookkeeping invariants of every record.
    pub fn verify(&self) -> Result<(), String> {
        for (&id, record) in &self.nodes {
            if record.explicit_count() + record.implicit_count() > record.relations().len() {
                return Err(format!("{id}: zone counts exceed relation list"));
            }
            for relation in record.dependencies() {
                let Some(target) = relation.target() else {
                    continue;
                };
                if target == id {
                    return Err(format!("{id}: depends on itself"));
                }
                let Some(target_record) = self.nodes.get(&target) else {
                    return Err(format!("{id}: depends on dead node {target}"));
                };
                let listed = target_record
                    .dependents()
                    .iter()
                    .filter(|r| r.points_to(id))
                    .count();
                if listed != 1 {
                    return Err(format!(
                        "{id}: listed {listed} times among dependents of {target}"
                    ));
                }
            }
            for (offset, relation) in record.implicit_dependencies().iter().enumerate() {
                let Some(target) = relation.target() else {
                    return Err(format!("{id}: null implicit dependency"));
                };
                let duplicated = record.has_explicit(target)
                    || record.implicit_dependencies()[offset + 1..]
                        .iter()
                        .any(|r| r.points_to(target));
                if duplicated {
                    return Err(format!("{id}: implicit dependency {target} duplicated"));
                }
            }
            for relation in record.dependents() {
                let Some(dependent) = relation.target() else {
                    return Err(format!("{id}: null dependent"));
                };
                if !self.depends_on(dependent, id) {
                    return Err(format!("{id}: stale dependent {dependent}"));
                }
            }
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
