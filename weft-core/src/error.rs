//! Error types for the reactive core.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors surfaced by the reactive core.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A polymorphic payload was copied, but its concrete type has no clone.
    #[error("cannot copy {wrapper}: payload type `{payload}` is not clonable")]
    NotClonable {
        wrapper: &'static str,
        payload: &'static str,
    },

    /// A node was used outside its alive window.
    #[error("node {0} is not alive")]
    NodeNotAlive(NodeId),

    /// An updater panicked while propagating a change.
    ///
    /// `node` is the innermost node whose updater panicked; every node on
    /// the way up has been unbound.
    #[error("updater of node {node} panicked: {message}")]
    UpdaterPanicked { node: NodeId, message: String },

    /// The graph bookkeeping is inconsistent.
    #[error("dependency graph invariant violated: {0}")]
    Corrupted(String),

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
