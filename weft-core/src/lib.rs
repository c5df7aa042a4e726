//! Weft Core
//!
//! This crate provides the reactive core of the Weft toolkit: a graph of
//! observable cells whose values are computed from other cells and
//! recomputed automatically when those change.
//!
//! It implements:
//!
//! - Typed cells with explicit and implicit dependencies
//! - A binder adapting plain closures into updaters
//! - Automatic graph repair when cells are moved, swapped or destroyed
//! - Soft tracking pointers and stable iteration snapshots
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node records, relation lists and the per-thread graph store
//! - `reactive`: Cells, the binder, the binding context and the runtime
//! - `config`: Runtime configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::{Property, Reaction};
//!
//! let p1 = Property::new(1);
//! let p2 = Property::new(1);
//!
//! // Explicit dependencies, passed positionally
//! let p3 = Property::bound((&p1, &p2), |a: i32, b: i32| a + b);
//! assert_eq!(p3.get(), 2);
//!
//! // Reactions discover what they read
//! let log = Reaction::new({
//!     let p3 = p3.clone();
//!     move || println!("p3 = {}", p3.get())
//! });
//!
//! p1.set(5);
//! // Prints: "p3 = 6"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::Config;
pub use error::{ReactiveError, Result};
pub use graph::NodeId;
pub use reactive::{
    track, Hooks, Introspect, Property, Reaction, Runtime, Tracking, TrackingList, UpdateResult,
};
