//! Formula Implementation
//!
//! A Formula is a derived value computed from cells. It caches its result
//! and recomputes only after one of the cells it read has been written.
//!
//! # Algorithm
//!
//! 1. A formula starts dirty. The first read evaluates it inside a tracking
//!    frame and records the cells it read as its dependencies.
//!
//! 2. A formula whose first evaluation read no cells is constant. It keeps
//!    its value forever and is never re-evaluated.
//!
//! 3. A write to any dependency marks the formula dirty. The next read
//!    re-evaluates it and replaces its dependency set with the cells read
//!    during that evaluation.
//!
//! 4. A formula read while another frame is active evaluates in place,
//!    without memoizing. Its cells are recorded on the outer frame, which is
//!    what keeps the graph one level deep.

use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::runtime::{NodeLease, Runtime, WeakRuntime};
use crate::graph::{Node, NodeId};
use crate::lifecycle::OwnerId;

struct FormulaSlot<T> {
    compute: Box<dyn Fn() -> T>,
    cached: RefCell<Option<T>>,
    label: Option<Rc<str>>,
    memoize: bool,
    evaluated: StdCell<bool>,
    is_const: StdCell<bool>,
    destroyed: StdCell<bool>,
    runs: StdCell<usize>,
    _lease: NodeLease,
}

/// A derived, memoized value.
///
/// # Example
///
/// ```rust
/// use weft_core::Runtime;
///
/// let runtime = Runtime::new();
/// let first = runtime.cell("Ada".to_string());
/// let last = runtime.cell("Lovelace".to_string());
/// let full = runtime.formula({
///     let (first, last) = (first.clone(), last.clone());
///     move || format!("{} {}", first.get(), last.get())
/// });
///
/// assert_eq!(full.get(), "Ada Lovelace");
/// assert_eq!(full.get(), "Ada Lovelace");
/// assert_eq!(full.compute_count(), 1);
/// ```
pub struct Formula<T: 'static> {
    runtime: WeakRuntime,
    id: NodeId,
    slot: Rc<FormulaSlot<T>>,
}

impl Runtime {
    /// Create a memoized formula.
    pub fn formula<T, F>(&self, compute: F) -> Formula<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        self.create_formula(Box::new(compute), None, true)
    }

    pub fn formula_with_label<T, F>(&self, compute: F, label: impl Into<Rc<str>>) -> Formula<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        self.create_formula(Box::new(compute), Some(label.into()), true)
    }

    /// Create a memoized formula destroyed together with `owner`.
    ///
    /// Use this for formulas built inside a row, branch, or mounted root, so
    /// that tearing the component down also drops the formula's edges.
    pub fn formula_in<T, F>(&self, owner: OwnerId, compute: F) -> Formula<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        let formula = self.formula(compute);
        let handle = formula.clone();
        self.on_destroy(owner, move || handle.destroy());
        formula
    }

    /// Create a formula that re-evaluates on every read.
    ///
    /// Dependencies are still tracked, so subscribers are dispatched when a
    /// cell it read changes.
    pub fn formula_unmemoized<T, F>(&self, compute: F) -> Formula<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        self.create_formula(Box::new(compute), None, false)
    }

    fn create_formula<T: 'static>(
        &self,
        compute: Box<dyn Fn() -> T>,
        label: Option<Rc<str>>,
        memoize: bool,
    ) -> Formula<T> {
        let id = NodeId::new();
        self.inner
            .graph
            .borrow_mut()
            .add_node(Node::formula(id, label.clone()));
        Formula {
            runtime: self.downgrade(),
            id,
            slot: Rc::new(FormulaSlot {
                compute,
                cached: RefCell::new(None),
                label,
                memoize,
                evaluated: StdCell::new(false),
                is_const: StdCell::new(false),
                destroyed: StdCell::new(false),
                runs: StdCell::new(0),
                _lease: NodeLease::new(self, id),
            }),
        }
    }
}

impl<T: 'static> Formula<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.slot.label.as_deref()
    }

    /// Read the value, evaluating it if needed.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        let slot = &self.slot;
        if slot.is_const.get() {
            if let Some(value) = slot.cached.borrow().as_ref() {
                return value.clone();
            }
        }

        let runtime = match self.runtime.upgrade() {
            Some(runtime) if !slot.destroyed.get() => runtime,
            _ => return self.evaluate_in_place(),
        };
        if runtime.is_tracking() {
            return self.evaluate_in_place();
        }
        if slot.memoize && runtime.inner.graph.borrow().is_clean(self.id) {
            if let Some(value) = slot.cached.borrow().as_ref() {
                return value.clone();
            }
        }

        let (value, dependencies) = runtime.track_for(Some(self.id), || (slot.compute)());
        slot.runs.set(slot.runs.get() + 1);
        if !slot.evaluated.replace(true) && dependencies.is_empty() {
            slot.is_const.set(true);
            trace!(formula = %self.id, "no dependencies on first evaluation; constant");
        }
        runtime
            .inner
            .graph
            .borrow_mut()
            .replace_dependencies(self.id, &dependencies);
        trace!(formula = %self.id, dependencies = dependencies.len(), "formula evaluated");
        *slot.cached.borrow_mut() = Some(value.clone());
        value
    }

    /// Read the value without recording dependencies in an enclosing frame.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        match self.runtime.upgrade() {
            Some(runtime) => runtime.untrack(|| self.get()),
            None => self.get(),
        }
    }

    fn evaluate_in_place(&self) -> T {
        let value = (self.slot.compute)();
        self.slot.runs.set(self.slot.runs.get() + 1);
        value
    }

    /// Whether the formula read no cells on its first evaluation.
    pub fn is_const(&self) -> bool {
        self.slot.is_const.get()
    }

    pub fn is_memoized(&self) -> bool {
        self.slot.memoize
    }

    /// Number of times the compute function has run.
    pub fn compute_count(&self) -> usize {
        self.slot.runs.get()
    }

    /// Number of cells read during the last tracked evaluation.
    pub fn dependency_count(&self) -> usize {
        let Some(runtime) = self.runtime.upgrade() else {
            return 0;
        };
        let graph = runtime.inner.graph.borrow();
        graph
            .get_node(self.id)
            .map(|node| node.dependencies().len())
            .unwrap_or(0)
    }

    /// Remove the formula from the graph and drop its subscribers.
    ///
    /// Later reads still work but evaluate directly, without caching.
    pub fn destroy(&self) {
        if self.slot.destroyed.replace(true) {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.inner.graph.borrow_mut().remove_node(self.id);
            let dropped = runtime.inner.subscribers.borrow_mut().remove_all(self.id);
            trace!(formula = %self.id, subscribers = dropped, "formula destroyed");
        }
        self.slot.cached.borrow_mut().take();
        self.slot.is_const.set(false);
    }

    pub fn is_destroyed(&self) -> bool {
        self.slot.destroyed.get()
    }
}

impl<T: 'static> Clone for Formula<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            slot: self.slot.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Formula<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("is_const", &self.is_const())
            .field("runs", &self.compute_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_computes_lazily_and_caches() {
        let runtime = Runtime::new();
        let cell = runtime.cell(5);
        let doubled = runtime.formula({
            let cell = cell.clone();
            move || cell.get() * 2
        });
        assert_eq!(doubled.compute_count(), 0);

        assert_eq!(doubled.get(), 10);
        assert_eq!(doubled.get(), 10);
        assert_eq!(doubled.compute_count(), 1);

        cell.set(7);
        assert_eq!(doubled.get(), 14);
        assert_eq!(doubled.compute_count(), 2);
    }

    #[test]
    fn formula_without_dependencies_is_constant() {
        let runtime = Runtime::new();
        let constant = runtime.formula(|| "fixed".to_string());
        assert!(!constant.is_const());

        assert_eq!(constant.get(), "fixed");
        assert!(constant.is_const());
        for _ in 0..5 {
            constant.get();
        }
        assert_eq!(constant.compute_count(), 1);
    }

    #[test]
    fn dependencies_follow_the_last_evaluation() {
        let runtime = Runtime::new();
        let flag = runtime.cell(true);
        let a = runtime.cell(1);
        let b = runtime.cell(2);
        let pick = runtime.formula({
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            move || if flag.get() { a.get() } else { b.get() }
        });

        assert_eq!(pick.get(), 1);
        assert!(runtime.dependents_of(b.id()).is_empty());

        flag.set(false);
        assert_eq!(pick.get(), 2);
        assert!(runtime.dependents_of(a.id()).is_empty());
        assert_eq!(runtime.dependents_of(b.id()), vec![pick.id()]);
        assert_eq!(pick.dependency_count(), 2);
    }

    #[test]
    fn nested_formula_flattens_into_outer_dependencies() {
        let runtime = Runtime::new();
        let cell = runtime.cell(3);
        let inner = runtime.formula({
            let cell = cell.clone();
            move || cell.get() + 1
        });
        let outer = runtime.formula({
            let inner = inner.clone();
            move || inner.get() * 10
        });

        assert_eq!(outer.get(), 40);
        assert_eq!(runtime.dependents_of(cell.id()), vec![outer.id()]);
        assert!(!outer.is_const());
    }

    #[test]
    fn unmemoized_formula_recomputes_each_read() {
        let runtime = Runtime::new();
        let cell = runtime.cell(1);
        let live = runtime.formula_unmemoized({
            let cell = cell.clone();
            move || cell.get()
        });
        live.get();
        live.get();
        assert_eq!(live.compute_count(), 2);
        assert!(!live.is_memoized());
        assert_eq!(runtime.dependents_of(cell.id()), vec![live.id()]);
    }

    #[test]
    fn owned_formula_is_destroyed_with_its_owner() {
        let runtime = Runtime::new();
        let owner = OwnerId::new();
        let cell = runtime.cell(1);
        let formula = runtime.formula_in(owner, {
            let cell = cell.clone();
            move || cell.get() + 1
        });
        assert_eq!(formula.get(), 2);
        assert_eq!(runtime.dependents_of(cell.id()), vec![formula.id()]);

        runtime.destroy_sync(owner);
        assert!(formula.is_destroyed());
        assert!(runtime.dependents_of(cell.id()).is_empty());
        assert_eq!(runtime.node_count(), 1);
    }

    #[test]
    fn dropped_formula_releases_its_edges() {
        let runtime = Runtime::new();
        let cell = runtime.cell(1);
        let formula = runtime.formula({
            let cell = cell.clone();
            move || cell.get()
        });
        formula.get();
        assert_eq!(runtime.dependents_of(cell.id()).len(), 1);

        drop(formula);
        assert!(runtime.dependents_of(cell.id()).is_empty());
        assert_eq!(runtime.node_count(), 1);
    }

    #[test]
    fn destroyed_formula_leaves_the_graph() {
        let runtime = Runtime::new();
        let cell = runtime.cell(1);
        let formula = runtime.formula({
            let cell = cell.clone();
            move || cell.get()
        });
        formula.get();
        let _sub = runtime.subscribe(&formula, |_: &i32| {});

        formula.destroy();
        assert!(formula.is_destroyed());
        assert!(runtime.dependents_of(cell.id()).is_empty());
        assert_eq!(runtime.subscriber_count(formula.id()), 0);

        cell.set(2);
        assert_eq!(formula.get(), 2);
    }
}
