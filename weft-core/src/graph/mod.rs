//! Dependency Graph
//!
//! This module implements the bookkeeping half of the reactive engine: the
//! per-node relation lists and the store that keeps them consistent.
//!
//! # Overview
//!
//! Every observable cell owns one node. A node's relations form a single
//! flat list with three contiguous zones:
//!
//! - explicit dependencies, named when a formula is bound and passed to it
//!   positionally,
//! - implicit dependencies, discovered by reads during the latest update,
//! - dependents, the reverse edges.
//!
//! Each dependency edge carries a "required" bit. When the target of a
//! required edge is destroyed the holder is unbound; when the target of an
//! optional edge is destroyed only that slot is cleared.
//!
//! # Design Decisions
//!
//! 1. Records live in a thread-local store indexed by [`NodeId`] rather than
//!    inside the cells. Cells can then be moved freely by Rust without any
//!    reference needing repair, and a destroyed node is simply an id that is
//!    no longer in the store.
//!
//! 2. The store never calls into cells. Operations that need cell behaviour
//!    (re-running an updater, dropping one) return what happened and let the
//!    reactive runtime act on it once the store is released.

mod node;
mod store;

pub use node::{Lifecycle, Node, NodeId, NodeRecord, Relation, Relations, Zone};
pub use store::{Graph, Severed};

pub(crate) use store::{try_with_graph, with_graph};
