//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, formulas,
//! subscribers, and owners. It holds the dependency graph and schedules
//! subscriber dispatch when cells change.
//!
//! # How It Works
//!
//! 1. When a cell or formula is created, it registers a node in the graph.
//!
//! 2. When a formula evaluates, the runtime records every cell it reads.
//!
//! 3. When a cell is written, the runtime:
//!    a. Marks every formula that read it as dirty
//!    b. Adds the cell to the turn's dirty set
//!    c. Requests a flush from the host, once per turn
//!
//! 4. A flush dispatches the subscribers of every dirty cell, then the
//!    subscribers of every formula depending on one. Formulas are lazy: each
//!    one recomputes at most once, on the first read after invalidation.
//!
//! # Threading
//!
//! A runtime is single-threaded. All state lives behind `RefCell`s in one
//! shared allocation; handles hold a [`WeakRuntime`] so that values stored in
//! the runtime never keep it alive. No borrow is held while user code runs.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, error, trace, warn};

use super::context::TrackerStack;
use super::subscriber::{SubscriberId, SubscriberRegistry};
use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::graph::{DependencyGraph, NodeId, RevalidationScheduler};
use crate::lifecycle::{ContextStore, DestructorRegistry, OwnerId, Teardown, TreeIndex};

/// Shared state behind a [`Runtime`].
pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) graph: RefCell<DependencyGraph>,
    pub(crate) tracker: RefCell<TrackerStack>,
    pub(crate) subscribers: RefCell<SubscriberRegistry>,
    pub(crate) scheduler: RefCell<RevalidationScheduler>,
    pub(crate) destructors: RefCell<DestructorRegistry>,
    pub(crate) tree: RefCell<TreeIndex>,
    pub(crate) contexts: RefCell<ContextStore>,
    /// Tracked fields, keyed by owner and field name.
    pub(crate) fields: RefCell<HashMap<OwnerId, HashMap<&'static str, Rc<dyn Any>>>>,
    /// Teardowns that were still pending when their destroy call returned.
    pub(crate) in_flight: RefCell<Vec<Teardown>>,
    pub(crate) faults: RefCell<Vec<Error>>,
}

/// Handle to a reactive runtime.
///
/// Cloning a `Runtime` is cheap and yields another handle to the same state.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

/// Non-owning handle to a [`Runtime`].
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Keeps a cell or formula node in the graph for as long as some handle to
/// its value exists. Dropping the last handle removes the node and its edges.
pub(crate) struct NodeLease {
    runtime: WeakRuntime,
    id: NodeId,
}

impl NodeLease {
    pub(crate) fn new(runtime: &Runtime, id: NodeId) -> Self {
        Self {
            runtime: runtime.downgrade(),
            id,
        }
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release_node(self.id);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(runtime = %config.label, dev_mode = config.dev_mode, "runtime created");
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(DependencyGraph::new()),
                tracker: RefCell::new(TrackerStack::default()),
                subscribers: RefCell::new(SubscriberRegistry::default()),
                scheduler: RefCell::new(RevalidationScheduler::new()),
                destructors: RefCell::new(DestructorRegistry::default()),
                tree: RefCell::new(TreeIndex::default()),
                contexts: RefCell::new(ContextStore::default()),
                fields: RefCell::new(HashMap::new()),
                in_flight: RefCell::new(Vec::new()),
                faults: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn label(&self) -> &str {
        &self.inner.config.label
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ----- scheduling -----

    /// Install the host hook invoked when a turn first needs a flush.
    ///
    /// The hook should arrange for [`Runtime::flush`] to run soon, for example
    /// on the next tick of the host's event loop. It must not flush
    /// synchronously: it is called from inside the cell write.
    pub fn set_flush_hook(&self, hook: impl Fn() + 'static) {
        self.inner.scheduler.borrow_mut().set_hook(Some(Rc::new(hook)));
    }

    pub fn clear_flush_hook(&self) {
        self.inner.scheduler.borrow_mut().set_hook(None);
    }

    /// Whether cells were written since the last flush.
    pub fn is_flush_pending(&self) -> bool {
        self.inner.scheduler.borrow().is_pending()
    }

    /// Number of flushes that have run.
    pub fn turn(&self) -> u64 {
        self.inner.scheduler.borrow().turn()
    }

    /// Invalidate the formulas that read `cell` and schedule the cell for the
    /// next flush.
    pub(crate) fn mark_dirty(&self, cell: NodeId) {
        let invalidated = self.inner.graph.borrow_mut().invalidate_dependents(cell);
        let hook = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            scheduler.mark(cell);
            scheduler.request()
        };
        trace!(%cell, invalidated, "cell written");
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Run one revalidation turn.
    ///
    /// Every subscriber of a written cell runs once, then every subscriber of
    /// a formula that depends on one. Subscribers observe final values: all
    /// writes of the turn happened before the flush started. Writes made by
    /// subscribers themselves are deferred to the next turn.
    pub fn flush(&self) {
        let dirty = self.inner.scheduler.borrow_mut().take();
        if !dirty.is_empty() {
            let span = debug_span!(
                "revalidate",
                runtime = %self.label(),
                turn = self.turn(),
                cells = dirty.len()
            );
            let _enter = span.enter();

            for &cell in &dirty {
                self.dispatch(cell);
            }

            let formulas = self.inner.graph.borrow().dependents_of_all(&dirty);
            debug!(formulas = formulas.len(), "dispatching dependent formulas");
            for formula in formulas {
                // A subscriber earlier in this turn may have destroyed it.
                if self.inner.graph.borrow().contains(formula) {
                    self.dispatch(formula);
                }
            }
        }
        self.poll_teardowns();
    }

    /// Yield to the executor, then flush.
    ///
    /// Lets spawned work that writes cells run first, so the flush sees its
    /// writes.
    pub async fn tick(&self) {
        tokio::task::yield_now().await;
        self.flush();
    }

    /// Flush until no writes and no teardowns remain pending.
    ///
    /// Gives up with a warning after `max_settle_rounds` rounds, which only
    /// happens when subscribers keep writing cells they depend on.
    pub async fn settle(&self) {
        let rounds = self.inner.config.max_settle_rounds.max(1);
        for _ in 0..rounds {
            self.flush();
            let in_flight = std::mem::take(&mut *self.inner.in_flight.borrow_mut());
            if in_flight.is_empty() {
                if !self.is_flush_pending() {
                    return;
                }
                continue;
            }
            trace!(teardowns = in_flight.len(), "awaiting in-flight teardowns");
            Teardown::all(in_flight).await;
        }
        warn!(runtime = %self.label(), rounds, "runtime did not settle");
    }

    /// Run every subscriber registered on `origin`.
    ///
    /// The list is snapshotted first so subscribers can subscribe or
    /// unsubscribe freely; one that was removed earlier in the same pass is
    /// skipped. A subscriber that fails or panics is evicted and recorded as
    /// a fault. The rest of the pass continues.
    pub(crate) fn dispatch(&self, origin: NodeId) {
        let opcodes = self.inner.subscribers.borrow().snapshot(origin);
        for (subscriber, opcode) in opcodes {
            if !self.inner.subscribers.borrow().contains(origin, subscriber) {
                continue;
            }
            let Ok(mut run) = opcode.try_borrow_mut() else {
                trace!(%subscriber, "subscriber already running; skipped");
                continue;
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (&mut **run)()));
            drop(run);

            let fault = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => Error::OpcodeFailed {
                    subscriber,
                    origin,
                    message: err.to_string(),
                },
                Err(payload) => Error::OpcodePanicked {
                    subscriber,
                    origin,
                    message: panic_message(&*payload),
                },
            };
            self.inner.subscribers.borrow_mut().remove(origin, subscriber);
            self.report_fault(fault);
        }
    }

    fn report_fault(&self, fault: Error) {
        error!(runtime = %self.label(), "{fault}; subscriber evicted");
        self.inner.faults.borrow_mut().push(fault);
    }

    /// Drain the faults recorded since the last call.
    pub fn take_faults(&self) -> Vec<Error> {
        std::mem::take(&mut *self.inner.faults.borrow_mut())
    }

    pub fn fault_count(&self) -> usize {
        self.inner.faults.borrow().len()
    }

    /// Remove `node` and every edge touching it from the graph.
    ///
    /// Releasing a node that is already gone is a no-op. Returns whether the
    /// node was removed.
    pub(crate) fn release_node(&self, node: NodeId) -> bool {
        let Ok(mut graph) = self.inner.graph.try_borrow_mut() else {
            warn!(runtime = %self.label(), %node, "graph busy; node not released");
            return false;
        };
        let released = graph.remove_node(node).is_some();
        drop(graph);
        if released {
            trace!(%node, "node released");
        }
        released
    }

    // ----- introspection -----

    /// Number of subscribers registered on a cell or formula.
    pub fn subscriber_count(&self, origin: NodeId) -> usize {
        self.inner.subscribers.borrow().count(origin)
    }

    /// Formulas that read `cell` during their last evaluation.
    pub fn dependents_of(&self, cell: NodeId) -> Vec<NodeId> {
        self.inner
            .graph
            .borrow()
            .get_node(cell)
            .map(|node| node.dependents().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live cells and formulas.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, origin: NodeId, subscriber: SubscriberId) -> bool {
        self.inner.subscribers.borrow().contains(origin, subscriber)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("label", &self.inner.config.label)
            .field("nodes", &self.node_count())
            .field("turn", &self.turn())
            .field("faults", &self.fault_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
