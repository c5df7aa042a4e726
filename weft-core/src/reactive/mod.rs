//! Reactive Primitives
//!
//! This module implements the cells of the reactive system: properties,
//! reactions and the tracking helpers, together with the binder that turns
//! closures into updaters and the runtime that propagates changes.
//!
//! # Concepts
//!
//! ## Properties
//!
//! A Property is a typed cell. It either holds a plain value or is bound to
//! an updater that computes the value from other cells. Reading a property
//! during another cell's update registers it as an implicit dependency;
//! writing it re-runs its dependents, but only if the value changed.
//!
//! ## Explicit and implicit dependencies
//!
//! Explicit dependencies are named when binding and passed to the updater as
//! arguments. Their parameter types say whether losing one unbinds the cell
//! (required) or just passes `None` (optional). Implicit dependencies are
//! rediscovered from reads on every update.
//!
//! ## Reactions
//!
//! A Reaction is a void cell: an updater without a value, run for its side
//! effects.
//!
//! ## Tracking
//!
//! [`Tracking`] is a soft pointer that nulls itself when its target is
//! destroyed. [`TrackingList`] is a snapshot of another node's relations that
//! stays safe to iterate while entries are destroyed.
//!
//! # Implementation Notes
//!
//! Propagation is synchronous and single-threaded. Each thread has its own
//! graph; cell handles are `!Send`.

mod binder;
mod context;
mod dyn_value;
mod effect;
mod ops;
mod property;
mod runtime;
mod status;
mod track;

pub use binder::{
    Apply, Binding, Dependency, FromDependency, Generate, IntoGenerator, IntoReaction,
    IntoUpdater, React, Reacting, ReactionOutput, UpdateResult,
};
pub use context::{current_binding, is_updating, untracked, update_start, UpdateScope};
pub use dyn_value::DynValue;
pub use effect::Reaction;
pub use ops::WriteGuard;
pub use property::Property;
pub use runtime::{Hooks, Runtime};
pub use status::{Introspect, Link, Status};
pub use track::{track, Trackable, Tracking, TrackingList};
