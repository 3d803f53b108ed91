//! Subscribers
//!
//! A subscriber is a callback registered on one cell or formula. During a
//! flush it receives the current value of its origin. Subscribers are how
//! rendered output stays in sync with reactive state: the renderer installs
//! one per dynamic text node, attribute, conditional, and list.
//!
//! Each registration is wrapped in an *opcode*: a closure that reads the
//! origin without tracking and hands the value to the user callback. The
//! registry stores opcodes per origin in registration order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::runtime::{Runtime, WeakRuntime};
use super::value::Reactive;
use crate::error::{BoxError, Error, Result};
use crate::graph::NodeId;
use crate::lifecycle::{Destructor, OwnerId};

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

pub(crate) type Opcode = dyn FnMut() -> std::result::Result<(), BoxError>;
pub(crate) type SharedOpcode = Rc<RefCell<Box<Opcode>>>;

/// Per-origin subscriber lists.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    lists: HashMap<NodeId, Vec<(SubscriberId, SharedOpcode)>>,
}

impl SubscriberRegistry {
    pub(crate) fn add(&mut self, origin: NodeId, id: SubscriberId, opcode: Box<Opcode>) {
        self.lists
            .entry(origin)
            .or_default()
            .push((id, Rc::new(RefCell::new(opcode))));
    }

    pub(crate) fn remove(&mut self, origin: NodeId, id: SubscriberId) -> bool {
        let Some(list) = self.lists.get_mut(&origin) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.lists.remove(&origin);
        }
        removed
    }

    pub(crate) fn remove_all(&mut self, origin: NodeId) -> usize {
        self.lists.remove(&origin).map(|list| list.len()).unwrap_or(0)
    }

    pub(crate) fn contains(&self, origin: NodeId, id: SubscriberId) -> bool {
        self.lists
            .get(&origin)
            .is_some_and(|list| list.iter().any(|(existing, _)| *existing == id))
    }

    pub(crate) fn snapshot(&self, origin: NodeId) -> Vec<(SubscriberId, SharedOpcode)> {
        self.lists.get(&origin).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, origin: NodeId) -> usize {
        self.lists.get(&origin).map(Vec::len).unwrap_or(0)
    }
}

/// Handle returned by [`Runtime::subscribe`]. Dropping it does *not*
/// unsubscribe; call [`Unsubscribe::unsubscribe`] or register it as a
/// destructor.
#[derive(Debug)]
#[must_use = "dropping the handle leaves the subscriber registered forever"]
pub struct Unsubscribe {
    runtime: WeakRuntime,
    origin: NodeId,
    id: SubscriberId,
}

impl Unsubscribe {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// Remove the subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(runtime) = self.runtime.upgrade() else {
            return false;
        };
        let removed = runtime
            .inner
            .subscribers
            .borrow_mut()
            .remove(self.origin, self.id);
        if removed {
            trace!(subscriber = %self.id, origin = %self.origin, "unsubscribed");
        }
        removed
    }

    /// Turn the handle into a destructor that unsubscribes when its owner is
    /// destroyed.
    pub fn into_destructor(self) -> Destructor {
        Destructor::new(move || {
            self.unsubscribe();
        })
    }
}

impl Runtime {
    /// Register `callback` on a cell or formula.
    ///
    /// The callback is not invoked now; it runs during each flush that
    /// touches `value`, receiving the current value.
    pub fn subscribe<T, F>(&self, value: impl Into<Reactive<T>>, mut callback: F) -> Unsubscribe
    where
        T: Clone + 'static,
        F: FnMut(&T) + 'static,
    {
        self.try_subscribe(value, move |current: &T| {
            callback(current);
            Ok::<(), BoxError>(())
        })
    }

    /// Like [`Runtime::subscribe`] for callbacks that can fail. A failing
    /// callback is evicted and recorded as a fault; see
    /// [`Runtime::take_faults`].
    pub fn try_subscribe<T, E, F>(&self, value: impl Into<Reactive<T>>, callback: F) -> Unsubscribe
    where
        T: Clone + 'static,
        E: Into<BoxError>,
        F: FnMut(&T) -> std::result::Result<(), E> + 'static,
    {
        let value = value.into();
        if let Reactive::Formula(formula) = &value {
            // A formula has no dependency edges until it has evaluated.
            formula.get_untracked();
        }
        let origin = value.id();
        let id = SubscriberId::new();
        self.register_opcode(id, value, callback);
        Unsubscribe {
            runtime: self.downgrade(),
            origin,
            id,
        }
    }

    /// Bind `value` to a callback for the lifetime of `owner`.
    ///
    /// The callback runs once immediately with the current value, then on
    /// every flush that touches `value`, until `owner` is destroyed. A
    /// constant formula is never subscribed, since it cannot change.
    pub fn bind<T, E, F>(
        &self,
        owner: OwnerId,
        value: impl Into<Reactive<T>>,
        mut callback: F,
    ) -> Result<SubscriberId>
    where
        T: Clone + 'static,
        E: Into<BoxError>,
        F: FnMut(&T) -> std::result::Result<(), E> + 'static,
    {
        let value = value.into();
        let id = SubscriberId::new();
        if let Err(err) = callback(&value.get_untracked()) {
            return Err(Error::OpcodeFailed {
                subscriber: id,
                origin: value.id(),
                message: err.into().to_string(),
            });
        }
        if value.is_const() {
            trace!(origin = %value.id(), "constant value bound without a subscriber");
            return Ok(id);
        }

        let origin = value.id();
        self.register_opcode(id, value, callback);
        let handle = Unsubscribe {
            runtime: self.downgrade(),
            origin,
            id,
        };
        self.register_destructor(owner, [handle.into_destructor()]);
        Ok(id)
    }

    fn register_opcode<T, E, F>(&self, id: SubscriberId, value: Reactive<T>, mut callback: F)
    where
        T: Clone + 'static,
        E: Into<BoxError>,
        F: FnMut(&T) -> std::result::Result<(), E> + 'static,
    {
        let origin = value.id();
        let opcode: Box<Opcode> = Box::new(move || {
            let current = value.get_untracked();
            callback(&current).map_err(Into::into)
        });
        self.inner.subscribers.borrow_mut().add(origin, id, opcode);
        trace!(subscriber = %id, %origin, "subscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("sub#"));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let runtime = Runtime::new();
        let cell = runtime.cell(1);
        let calls = Rc::new(StdCell::new(0));

        let handle = runtime.subscribe(&cell, {
            let calls = calls.clone();
            move |_: &i32| calls.set(calls.get() + 1)
        });
        cell.set(2);
        runtime.flush();
        assert_eq!(calls.get(), 1);

        assert!(handle.unsubscribe());
        cell.set(3);
        runtime.flush();
        assert_eq!(calls.get(), 1);
        assert_eq!(runtime.subscriber_count(cell.id()), 0);
    }

    #[test]
    fn subscriber_removed_mid_pass_is_skipped() {
        let runtime = Runtime::new();
        let cell = runtime.cell(0);
        let second_ran = Rc::new(StdCell::new(false));
        let victim: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));

        let _first = runtime.subscribe(&cell, {
            let victim = victim.clone();
            move |_: &i32| {
                if let Some(handle) = victim.borrow_mut().take() {
                    handle.unsubscribe();
                }
            }
        });
        let second = runtime.subscribe(&cell, {
            let second_ran = second_ran.clone();
            move |_: &i32| second_ran.set(true)
        });
        *victim.borrow_mut() = Some(second);

        cell.set(1);
        runtime.flush();
        assert!(!second_ran.get());
    }

    #[test]
    fn bind_runs_immediately_and_detaches_on_destroy() {
        let runtime = Runtime::new();
        let owner = OwnerId::new();
        let cell = runtime.cell(5);
        let seen = Rc::new(RefCell::new(Vec::new()));

        runtime
            .bind(owner, &cell, {
                let seen = seen.clone();
                move |value: &i32| {
                    seen.borrow_mut().push(*value);
                    Ok::<(), BoxError>(())
                }
            })
            .unwrap();
        assert_eq!(*seen.borrow(), vec![5]);

        cell.set(6);
        runtime.flush();
        assert_eq!(*seen.borrow(), vec![5, 6]);

        runtime.destroy_sync(owner);
        cell.set(7);
        runtime.flush();
        assert_eq!(*seen.borrow(), vec![5, 6]);
        assert_eq!(runtime.subscriber_count(cell.id()), 0);
    }

    #[test]
    fn bind_skips_constant_formulas() {
        let runtime = Runtime::new();
        let owner = OwnerId::new();
        let constant = runtime.formula(|| 42);

        runtime
            .bind(owner, &constant, |_: &i32| Ok::<(), BoxError>(()))
            .unwrap();
        assert!(constant.is_const());
        assert_eq!(runtime.subscriber_count(constant.id()), 0);
    }

    #[test]
    fn bind_reports_initial_failure() {
        let runtime = Runtime::new();
        let cell = runtime.cell(0);
        let err = runtime
            .bind(OwnerId::new(), &cell, |_: &i32| Err("no target"))
            .unwrap_err();
        assert!(matches!(err, Error::OpcodeFailed { message, .. } if message == "no target"));
        assert_eq!(runtime.subscriber_count(cell.id()), 0);
    }
}
