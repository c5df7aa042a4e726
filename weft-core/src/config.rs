//! Runtime Configuration
//!
//! Knobs that change how the runtime checks and reports, never what it
//! computes. A configuration is installed per thread with
//! [`Runtime::configure`](crate::reactive::Runtime::configure), since every
//! thread owns an independent graph.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Runtime configuration.
///
/// Missing fields take their default value when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Panic with [`ReactiveError::NodeNotAlive`](crate::ReactiveError::NodeNotAlive)
    /// when a raw [`NodeId`](crate::NodeId) of a destroyed node is
    /// introspected or dumped, or a dead node is read or written. When off,
    /// such accesses are silently ignored. Defaults to on in debug builds.
    pub lifetime_checks: bool,

    /// Depth rendered by `Introspect::print_status`.
    pub status_depth: usize,

    /// Emit a `trace!` event for every update dispatched to a dependent.
    pub trace_propagation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lifetime_checks: cfg!(debug_assertions),
            status_depth: 2,
            trace_propagation: false,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
