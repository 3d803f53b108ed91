//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs after its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. Internally it is a memoized `Formula<()>` with one subscriber. A write
//!    to a dependency invalidates the formula; the next flush dispatches the
//!    subscriber, which reads the formula and so re-runs the function.
//!
//! 3. Each run replaces the dependency set, like any formula evaluation.
//!
//! # Differences from Formula
//!
//! - Formulas return a value; effects do not.
//! - Formulas are lazy (compute on access); effects run on every flush that
//!   touches them.
//! - Effects belong to an owner and stop when it is destroyed.
//!
//! An effect that reads no cells on its first run is constant: it never runs
//! again and installs no subscriber.

use tracing::trace;

use super::formula::Formula;
use super::runtime::Runtime;
use crate::lifecycle::OwnerId;

/// A side-effecting computation that re-runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use weft_core::{OwnerId, Runtime};
///
/// let runtime = Runtime::new();
/// let owner = OwnerId::new();
/// let count = runtime.cell(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let effect = runtime.effect(owner, {
///     let (count, log) = (count.clone(), log.clone());
///     move || log.borrow_mut().push(count.get())
/// });
///
/// count.set(5);
/// runtime.flush();
/// assert_eq!(*log.borrow(), vec![0, 5]);
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Effect {
    owner: OwnerId,
    formula: Formula<()>,
}

impl Runtime {
    /// Create an effect that lives as long as `owner`.
    pub fn effect(&self, owner: OwnerId, run: impl Fn() + 'static) -> Effect {
        let formula = self.formula_with_label(run, "effect");
        formula.get_untracked();

        if !formula.is_const() {
            let subscription = self.subscribe(&formula, |_: &()| {});
            self.register_destructor(owner, [subscription.into_destructor()]);
        }
        let handle = formula.clone();
        self.on_destroy(owner, move || handle.destroy());

        trace!(
            effect = %formula.id(),
            %owner,
            dependencies = formula.dependency_count(),
            "effect created"
        );
        Effect { owner, formula }
    }
}

impl Effect {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.formula.compute_count()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.formula.dependency_count()
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again. Destroying the owner
    /// disposes it as well.
    pub fn dispose(&self) {
        self.formula.destroy();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.formula.is_destroyed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;
    use std::rc::Rc;

    #[test]
    fn effect_runs_immediately() {
        let runtime = Runtime::new();
        let ran = Rc::new(StdCell::new(false));
        let effect = runtime.effect(OwnerId::new(), {
            let ran = ran.clone();
            move || ran.set(true)
        });

        assert!(ran.get());
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_once_per_flush() {
        let runtime = Runtime::new();
        let a = runtime.cell(1);
        let b = runtime.cell(2);
        let sum = Rc::new(StdCell::new(0));

        let effect = runtime.effect(OwnerId::new(), {
            let (a, b, sum) = (a.clone(), b.clone(), sum.clone());
            move || sum.set(a.get() + b.get())
        });
        assert_eq!(effect.dependency_count(), 2);

        a.set(10);
        b.set(20);
        runtime.flush();
        assert_eq!(sum.get(), 30);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_dispose() {
        let runtime = Runtime::new();
        let cell = runtime.cell(0);
        let effect = runtime.effect(OwnerId::new(), {
            let cell = cell.clone();
            move || {
                cell.get();
            }
        });

        assert!(!effect.is_disposed());
        effect.dispose();
        assert!(effect.is_disposed());

        cell.set(1);
        runtime.flush();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn destroying_the_owner_stops_the_effect() {
        let runtime = Runtime::new();
        let owner = OwnerId::new();
        let cell = runtime.cell(0);
        let effect = runtime.effect(owner, {
            let cell = cell.clone();
            move || {
                cell.get();
            }
        });

        runtime.destroy_sync(owner);
        assert!(effect.is_disposed());
        cell.set(1);
        runtime.flush();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_without_reads_is_constant() {
        let runtime = Runtime::new();
        let effect = runtime.effect(OwnerId::new(), || {});
        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(runtime.node_count(), 1);
    }
}
