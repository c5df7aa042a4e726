//! Binding Context
//!
//! The binding context tracks which node is currently updating. This enables
//! automatic dependency tracking: when a cell is read, the current node
//! records it, and when the update ends those reads become the node's
//! implicit dependencies.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Starting an update pushes a frame
//! for the node and returns an [`UpdateScope`]; dropping the scope pops the
//! frame and reconciles the node's implicit zone with what was read.
//!
//! Nested updates (a write inside an updater propagating to other nodes)
//! push their own frames, so the outer node's reads are restored untouched
//! once the inner update completes.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::{with_graph, NodeId};

thread_local! {
    static BINDING_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// An entry in the binding stack.
#[derive(Debug, Clone)]
struct Frame {
    /// The updating node, or `None` for an untracked section.
    node: Option<NodeId>,
    /// Nodes read during this update, in first-read order, without
    /// duplicates.
    reads: SmallVec<[NodeId; 8]>,
}

/// Guard for one in-progress update.
///
/// Dropping the guard ends the update, also while unwinding from a panicking
/// updater, so the stack always stays balanced.
#[must_use = "the update ends when the scope is dropped"]
pub struct UpdateScope {
    node: Option<NodeId>,
    depth: usize,
    reconcile: bool,
}

/// Start updating `node`: reads from now on are recorded for it.
pub fn update_start(node: NodeId) -> UpdateScope {
    push(Some(node))
}

fn push(node: Option<NodeId>) -> UpdateScope {
    let depth = BINDING_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(Frame {
            node,
            reads: SmallVec::new(),
        });
        stack.len()
    });
    UpdateScope {
        node,
        depth,
        reconcile: true,
    }
}

impl UpdateScope {
    /// The node this scope records reads for.
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// End the update explicitly.
    pub fn end(self) {}

    /// End the update and drop its reads. The node's implicit dependencies
    /// are left as they were.
    pub(crate) fn discard(mut self) {
        self.reconcile = false;
    }
}

impl Drop for UpdateScope {
    fn drop(&mut self) {
        let popped = BINDING_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                debug_assert_eq!(
                    stack.len(),
                    self.depth,
                    "UpdateScope mismatch: scopes must end in reverse order"
                );
                stack.pop()
            })
            .ok()
            .flatten();

        if !self.reconcile {
            return;
        }
        if let Some(Frame {
            node: Some(node),
            reads,
        }) = popped
        {
            with_graph(|graph| graph.set_implicit_dependencies(node, &reads));
        }
    }
}

/// The node currently updating, if any.
pub fn current_binding() -> Option<NodeId> {
    BINDING_STACK.with(|stack| stack.borrow().last().and_then(|frame| frame.node))
}

/// Whether `node` has an update in progress anywhere on the stack.
pub fn is_updating(node: NodeId) -> bool {
    BINDING_STACK.with(|stack| stack.borrow().iter().any(|frame| frame.node == Some(node)))
}

/// Number of nested updates in progress.
pub fn depth() -> usize {
    BINDING_STACK.with(|stack| stack.borrow().len())
}

/// Record a read of `node` for the updating node on top of the stack.
///
/// Returns whether the read was recorded.
pub(crate) fn record_read(node: NodeId) -> bool {
    BINDING_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let Some(frame) = stack.last_mut() else {
            return false;
        };
        match frame.node {
            Some(current) if current != node => {
                if !frame.reads.contains(&node) {
                    frame.reads.push(node);
                }
                true
            }
            _ => false,
        }
    })
}

/// Run `f` without registering any dependency for the updating node.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _scope = push(None);
    f()
}
