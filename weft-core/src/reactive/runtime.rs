//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells to the
//! dependency graph. It implements the notification protocol on top of the
//! graph store and the binding context.
//!
//! # How It Works
//!
//! 1. When a cell is created, it allocates a node and attaches itself as the
//!    node's handler.
//!
//! 2. When a cell is read while another node is updating, the read is
//!    recorded and becomes an implicit dependency of that node.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Snapshots the node's dependents in a tracking list
//!    b. Re-runs every dependent that still depends on the node
//!    c. Each dependent that changes notifies its own dependents in turn
//!
//! 4. When a cell is destroyed, dependents holding a required edge to it are
//!    unbound and the others are re-run with the slot cleared.
//!
//! # Thread Safety
//!
//! Propagation is single-threaded and synchronous. The graph, the binding
//! stack and the configuration are thread-local; only the hooks are shared
//! process-wide.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::binder::UpdateResult;
use super::context;
use super::track::TrackingList;
use crate::config::Config;
use crate::error::{ReactiveError, Result};
use crate::graph::{try_with_graph, with_graph, Lifecycle, Node, NodeId, Relation, Relations, Severed};

type SeveredHook = Arc<dyn Fn(NodeId, NodeId) + Send + Sync>;
type PanicHook = Arc<dyn Fn(NodeId, &str) + Send + Sync>;

/// Callbacks the embedding application can install.
///
/// Both default to no-op.
#[derive(Clone, Default)]
pub struct Hooks {
    on_severed: Option<SeveredHook>,
    on_update_panic: Option<PanicHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with `(dependent, destroyed)` when destroying a node unbinds a
    /// dependent that held a required edge to it.
    pub fn on_severed<F>(mut self, hook: F) -> Self
    where
        F: Fn(NodeId, NodeId) + Send + Sync + 'static,
    {
        self.on_severed = Some(Arc::new(hook));
        self
    }

    /// Called with the node and the panic message when an updater panics.
    pub fn on_update_panic<F>(mut self, hook: F) -> Self
    where
        F: Fn(NodeId, &str) + Send + Sync + 'static,
    {
        self.on_update_panic = Some(Arc::new(hook));
        self
    }
}

static HOOKS: OnceLock<RwLock<Hooks>> = OnceLock::new();

fn get_hooks() -> &'static RwLock<Hooks> {
    HOOKS.get_or_init(|| RwLock::new(Hooks::default()))
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());

    /// Innermost node whose updater panicked and the panic message, kept
    /// until `Runtime::catch_update` picks it up.
    static LAST_PANIC: RefCell<Option<(NodeId, String)>> = const { RefCell::new(None) };
}

fn with_config<R>(f: impl FnOnce(&Config) -> R) -> R {
    CONFIG.with(|config| f(&config.borrow()))
}

/// Panic with [`ReactiveError::NodeNotAlive`] if lifetime checks are on and
/// `id` is not alive.
pub(crate) fn check_alive(id: NodeId) {
    if with_config(|c| c.lifetime_checks) && !with_graph(|graph| graph.is_alive(id)) {
        panic!("{}", ReactiveError::NodeNotAlive(id));
    }
}

pub(crate) fn allocate() -> NodeId {
    with_graph(|graph| graph.insert())
}

pub(crate) fn attach(id: NodeId, handler: std::rc::Weak<dyn Node>) {
    with_graph(|graph| graph.attach(id, handler));
}

/// The live cell registered for `id`.
pub(crate) fn resolve(id: NodeId) -> Option<Rc<dyn Node>> {
    with_graph(|graph| graph.handler(id)).and_then(|handler| handler.upgrade())
}

pub(crate) fn explicit_dependencies(id: NodeId) -> Relations {
    with_graph(|graph| {
        graph
            .get(id)
            .map(|record| record.explicit_dependencies().iter().copied().collect())
            .unwrap_or_default()
    })
}

pub(crate) fn is_bound(id: NodeId) -> bool {
    with_graph(|graph| graph.get(id).is_some_and(|record| record.has_updater()))
}

/// Install a new explicit dependency list and mark the node bound.
pub(crate) fn rebind(id: NodeId, dependencies: &[Relation]) {
    with_graph(|graph| {
        graph.set_explicit_dependencies(id, dependencies);
        if let Some(record) = graph.get_mut(id) {
            record.set_has_updater(true);
        }
    });
    trace!(node = %id, explicit = dependencies.len(), "bound");
}

/// Register `id` as an implicit dependency of the updating node.
pub(crate) fn read_notify(id: NodeId) {
    check_alive(id);
    context::record_read(id);
}

/// Re-run everything that depends on `id`.
pub(crate) fn write_notify(id: NodeId) {
    check_alive(id);
    let has_dependents = with_graph(|graph| {
        graph
            .get(id)
            .is_some_and(|record| record.dependent_count() > 0)
    });
    if !has_dependents {
        return;
    }

    // Updating one dependent can destroy or unbind another, so walk a
    // snapshot that holds its own edges instead of the live list.
    let snapshot = TrackingList::of_dependents(id);
    let trace_propagation = with_config(|c| c.trace_propagation);
    for dependent in snapshot.iter() {
        let pending = with_graph(|graph| {
            graph.depends_on(dependent, id)
                && graph.get(dependent).is_some_and(|record| record.has_updater())
        });
        if !pending {
            continue;
        }
        if trace_propagation {
            trace!(source = %id, node = %dependent, "dispatching update");
        }
        if let Some(node) = resolve(dependent) {
            node.update();
        }
    }
}

/// Drop the updater of `id` and all of its dependency edges. The value is
/// left untouched.
pub(crate) fn unbind(id: NodeId) {
    let handler = with_graph(|graph| {
        graph.clear_dependencies(id);
        graph.handler(id)
    });
    if let Some(node) = handler.and_then(|handler| handler.upgrade()) {
        node.release();
    }
}

/// Remove `id` from the graph and repair its dependents.
pub(crate) fn destroy(id: NodeId) {
    let Some(severed) = try_with_graph(|graph| graph.detach(id)) else {
        return;
    };

    for Severed {
        node,
        unbound,
        had_updater,
    } in severed
    {
        let handler = try_with_graph(|graph| graph.handler(node))
            .flatten()
            .and_then(|handler| handler.upgrade());

        if unbound {
            // Tracking pointers hold a required edge without an updater;
            // losing the target only nulls them.
            if !had_updater {
                continue;
            }
            debug!(node = %node, lost = %id, "required dependency destroyed, unbinding");
            if let Some(handler) = &handler {
                handler.release();
            }
            let hook = get_hooks().read().on_severed.clone();
            if let Some(hook) = hook {
                hook(node, id);
            }
            continue;
        }

        if context::is_updating(node) {
            continue;
        }
        if let Some(handler) = handler {
            handler.update();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) fn updater_panicked(id: NodeId, payload: &(dyn Any + Send)) {
    let message = panic_message(payload);
    warn!(node = %id, %message, "updater panicked, unbinding");

    LAST_PANIC.with(|last| {
        let mut last = last.borrow_mut();
        if last.is_none() {
            *last = Some((id, message.clone()));
        }
    });

    let hook = get_hooks().read().on_update_panic.clone();
    if let Some(hook) = hook {
        hook(id, &message);
    }
}

/// Notify the dependents of a node that just updated. A panic further down
/// the cascade unbinds this node too before it keeps unwinding.
fn propagate(id: NodeId) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| write_notify(id))) {
        debug!(node = %id, "unbinding after a panic downstream");
        unbind(id);
        panic::resume_unwind(payload);
    }
}

/// Run the updater stored in `slot` for node `id` and act on its result.
///
/// The updater is checked out of its slot while it runs, so a nested update
/// of the same node finds nothing to run. If the updater was replaced or
/// released meanwhile (`epoch` moved), the checked-out one is dropped
/// instead of being put back, and the run's result is dropped with it: its
/// reads do not become implicit dependencies and nothing is propagated.
/// Returns whether an updater ran.
pub(crate) fn drive<U>(
    id: NodeId,
    slot: &RefCell<Option<U>>,
    epoch: &Cell<u64>,
    run: impl FnOnce(&mut U, &[Relation]) -> UpdateResult,
) -> bool {
    let Some(mut updater) = slot.replace(None) else {
        return false;
    };
    let started = epoch.get();
    let relations = explicit_dependencies(id);

    let scope = context::update_start(id);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&mut updater, &relations)));

    if epoch.get() != started {
        scope.discard();
        drop(updater);
        debug!(node = %id, "updater replaced while running, result dropped");
        if let Err(payload) = outcome {
            updater_panicked(id, payload.as_ref());
            panic::resume_unwind(payload);
        }
        return true;
    }
    drop(scope);
    *slot.borrow_mut() = Some(updater);

    match outcome {
        Ok(UpdateResult::Unchanged) => {}
        Ok(UpdateResult::Changed) => propagate(id),
        Ok(UpdateResult::Unbind) => {
            debug!(node = %id, "updater detached itself");
            unbind(id);
        }
        Err(payload) => {
            updater_panicked(id, payload.as_ref());
            unbind(id);
            panic::resume_unwind(payload);
        }
    }
    true
}

/// Facade over the thread's reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Install a configuration for the current thread.
    pub fn configure(config: Config) {
        CONFIG.with(|current| *current.borrow_mut() = config);
    }

    /// The configuration of the current thread.
    pub fn config() -> Config {
        with_config(Config::clone)
    }

    /// Install process-wide hooks.
    pub fn set_hooks(hooks: Hooks) {
        *get_hooks().write() = hooks;
    }

    /// Restore the no-op hooks.
    pub fn reset_hooks() {
        Self::set_hooks(Hooks::default());
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        with_graph(|graph| graph.node_count())
    }

    /// Lifecycle of `id`, or `None` once it was destroyed.
    pub fn lifecycle(id: NodeId) -> Option<Lifecycle> {
        with_graph(|graph| graph.get(id).map(|record| record.lifecycle()))
    }

    /// Check the bookkeeping invariants of the whole graph.
    pub fn verify() -> Result<()> {
        with_graph(|graph| graph.verify()).map_err(ReactiveError::Corrupted)
    }

    /// Get the node currently updating, if any.
    pub fn current_binding() -> Option<NodeId> {
        context::current_binding()
    }

    /// Check if we're inside an update.
    pub fn is_tracking() -> bool {
        context::current_binding().is_some()
    }

    /// Run `f`, turning a panic raised by an updater during `f` into
    /// [`ReactiveError::UpdaterPanicked`]. Panics that did not come from an
    /// updater keep unwinding.
    pub fn catch_update<R>(f: impl FnOnce() -> R) -> Result<R> {
        LAST_PANIC.with(|last| last.borrow_mut().take());
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Ok(value),
            Err(payload) => match LAST_PANIC.with(|last| last.borrow_mut().take()) {
                Some((node, message)) => Err(ReactiveError::UpdaterPanicked { node, message }),
                None => panic::resume_unwind(payload),
            },
        }
    }
}
