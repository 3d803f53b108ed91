//! Destructors and Teardown
//!
//! Every owner has an ordered list of destructors. Destroying the owner
//! removes the list first, so a destroy that re-enters for the same owner
//! sees nothing to do, then runs the callbacks in registration order.
//!
//! Synchronous callbacks finish before `destroy` returns. Deferred callbacks
//! are invoked synchronously too, but the futures they return may still be
//! pending; the returned [`Teardown`] completes once all of them have. A
//! teardown that is still pending when `destroy` returns is parked on the
//! runtime and polled after every flush, so callers that ignore it still see
//! it finish.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{self, LocalBoxFuture, Shared};
use futures_util::FutureExt;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::OwnerId;
use crate::reactive::Runtime;

/// A callback run when its owner is destroyed.
pub enum Destructor {
    Sync(Box<dyn FnOnce()>),
    Deferred(Box<dyn FnOnce() -> LocalBoxFuture<'static, ()>>),
}

impl Destructor {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Destructor::Sync(Box::new(f))
    }

    /// A destructor whose cleanup completes asynchronously.
    ///
    /// `f` itself runs synchronously during the destroy call. The future it
    /// returns is polled once right away and then until it completes.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        Destructor::Deferred(Box::new(move || f().boxed_local()))
    }

    fn run(self) -> Option<Teardown> {
        match self {
            Destructor::Sync(f) => {
                f();
                None
            }
            Destructor::Deferred(f) => Some(Teardown::from_boxed(f())),
        }
    }
}

impl fmt::Debug for Destructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destructor::Sync(_) => f.write_str("Destructor::Sync"),
            Destructor::Deferred(_) => f.write_str("Destructor::Deferred"),
        }
    }
}

/// Completion handle for a destroy call.
///
/// Cheap to clone; every clone completes together.
#[derive(Clone)]
#[must_use = "a teardown does nothing unless awaited or parked on the runtime"]
pub struct Teardown {
    inner: Shared<LocalBoxFuture<'static, ()>>,
}

impl Teardown {
    /// An already completed teardown.
    pub fn ready() -> Self {
        let teardown = Self::from_boxed(future::ready(()).boxed_local());
        teardown.try_complete();
        teardown
    }

    pub fn from_future(fut: impl Future<Output = ()> + 'static) -> Self {
        Self::from_boxed(fut.boxed_local())
    }

    fn from_boxed(fut: LocalBoxFuture<'static, ()>) -> Self {
        Self { inner: fut.shared() }
    }

    /// Completes when every teardown in `teardowns` has.
    pub fn all(teardowns: impl IntoIterator<Item = Teardown>) -> Self {
        let pending: Vec<Teardown> = teardowns
            .into_iter()
            .filter(|teardown| !teardown.is_complete())
            .collect();
        match pending.len() {
            0 => Self::ready(),
            1 => pending.into_iter().next().unwrap_or_else(Self::ready),
            _ => Self::from_future(future::join_all(pending).map(|_| ())),
        }
    }

    /// Whether the teardown has already completed. Does not poll.
    pub fn is_complete(&self) -> bool {
        self.inner.peek().is_some()
    }

    /// Poll once without a waker. Returns whether the teardown is complete.
    pub fn try_complete(&self) -> bool {
        self.is_complete() || self.inner.clone().now_or_never().is_some()
    }
}

impl Future for Teardown {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// How many recently destroyed owners dev mode remembers for the
/// double-destroy warning.
const DESTROYED_WINDOW: usize = 1024;

#[derive(Default)]
pub(crate) struct DestructorRegistry {
    lists: HashMap<OwnerId, SmallVec<[Destructor; 2]>>,
    /// The most recently destroyed owners, oldest first. Only kept in dev
    /// mode, and never more than `DESTROYED_WINDOW` of them.
    recent: VecDeque<OwnerId>,
    destroyed: HashSet<OwnerId>,
}

impl DestructorRegistry {
    fn register(&mut self, owner: OwnerId, destructors: impl IntoIterator<Item = Destructor>) {
        self.lists.entry(owner).or_default().extend(destructors);
    }

    fn take(&mut self, owner: OwnerId, remember: bool) -> Option<SmallVec<[Destructor; 2]>> {
        let list = self.lists.remove(&owner)?;
        if remember {
            self.remember(owner);
        }
        Some(list)
    }

    fn remember(&mut self, owner: OwnerId) {
        if !self.destroyed.insert(owner) {
            return;
        }
        self.recent.push_back(owner);
        if self.recent.len() > DESTROYED_WINDOW {
            if let Some(oldest) = self.recent.pop_front() {
                self.destroyed.remove(&oldest);
            }
        }
    }

    fn was_destroyed(&self, owner: OwnerId) -> bool {
        self.destroyed.contains(&owner)
    }

    #[cfg(test)]
    fn remembered(&self) -> usize {
        self.destroyed.len()
    }

    fn count(&self, owner: OwnerId) -> usize {
        self.lists.get(&owner).map(SmallVec::len).unwrap_or(0)
    }
}

impl Runtime {
    /// Append destructors to `owner`'s list.
    pub fn register_destructor(
        &self,
        owner: OwnerId,
        destructors: impl IntoIterator<Item = Destructor>,
    ) {
        self.inner
            .destructors
            .borrow_mut()
            .register(owner, destructors);
    }

    /// Register a synchronous destructor on `owner`.
    pub fn on_destroy(&self, owner: OwnerId, f: impl FnOnce() + 'static) {
        self.register_destructor(owner, [Destructor::new(f)]);
    }

    /// Destroy `child` when `parent` is destroyed, and wait for it.
    pub fn destroy_with(&self, parent: OwnerId, child: OwnerId) {
        let runtime = self.downgrade();
        self.register_destructor(
            parent,
            [Destructor::deferred(move || match runtime.upgrade() {
                Some(runtime) => runtime.destroy(child),
                None => Teardown::ready(),
            })],
        );
    }

    /// Number of destructors waiting on `owner`.
    pub fn destructor_count(&self, owner: OwnerId) -> usize {
        self.inner.destructors.borrow().count(owner)
    }

    /// Destroy `owner`: run its destructors once, in registration order.
    ///
    /// Returns a teardown that completes when every deferred destructor has.
    /// Destroying an owner with no destructors, or one destroyed before, is a
    /// no-op; in dev mode the second case logs a warning.
    pub fn destroy(&self, owner: OwnerId) -> Teardown {
        let dev_mode = self.inner.config.dev_mode;
        let taken = self.inner.destructors.borrow_mut().take(owner, dev_mode);
        let Some(destructors) = taken else {
            if dev_mode && self.inner.destructors.borrow().was_destroyed(owner) {
                warn!(runtime = %self.label(), %owner, "owner destroyed twice; ignoring");
            }
            return Teardown::ready();
        };

        debug!(%owner, destructors = destructors.len(), "destroying owner");
        let pending: Vec<Teardown> = destructors
            .into_iter()
            .filter_map(Destructor::run)
            .collect();
        let teardown = Teardown::all(pending);
        if !teardown.try_complete() {
            trace!(%owner, "teardown still pending");
            self.track_teardown(teardown.clone());
        }
        teardown
    }

    /// Destroy `owner` without waiting. Deferred work keeps running on the
    /// runtime and is polled after each flush.
    pub fn destroy_sync(&self, owner: OwnerId) {
        let _ = self.destroy(owner);
    }

    /// Park a pending teardown on the runtime.
    pub(crate) fn track_teardown(&self, teardown: Teardown) {
        self.inner.in_flight.borrow_mut().push(teardown);
    }

    /// Number of parked teardowns that have not completed yet.
    pub fn pending_teardowns(&self) -> usize {
        self.inner
            .in_flight
            .borrow()
            .iter()
            .filter(|teardown| !teardown.is_complete())
            .count()
    }

    /// Poll every parked teardown once and drop the completed ones.
    pub(crate) fn poll_teardowns(&self) {
        let in_flight = std::mem::take(&mut *self.inner.in_flight.borrow_mut());
        if in_flight.is_empty() {
            return;
        }
        let before = in_flight.len();
        let pending: Vec<Teardown> = in_flight
            .into_iter()
            .filter(|teardown| !teardown.try_complete())
            .collect();
        trace!(
            completed = before - pending.len(),
            pending = pending.len(),
            "polled teardowns"
        );
        self.inner.in_flight.borrow_mut().extend(pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::oneshot;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Destructor) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |name: &'static str| {
                let log = log.clone();
                Destructor::new(move || log.borrow_mut().push(name))
            }
        };
        (log, make)
    }

    #[test]
    fn destructors_run_once_in_order() {
        let runtime = Runtime::new();
        let owner = OwnerId::new();
        let (log, make) = recorder();

        runtime.register_destructor(owner, [make("a"), make("b")]);
        runtime.register_destructor(owner, [make("c")]);
        assert_eq!(runtime.destructor_count(owner), 3);

        let teardown = runtime.destroy(owner);
        assert!(teardown.is_complete());
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);

        runtime.destroy_sync(owner);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn destroyed_owner_memory_is_bounded() {
        let mut registry = DestructorRegistry::default();
        let owners: Vec<OwnerId> = (0..DESTROYED_WINDOW * 3).map(|_| OwnerId::new()).collect();
        for &owner in &owners {
            registry.register(owner, [Destructor::new(|| {})]);
            assert!(registry.take(owner, true).is_some());
        }

        assert_eq!(registry.remembered(), DESTROYED_WINDOW);
        assert_eq!(registry.recent.len(), DESTROYED_WINDOW);
        let newest = owners[owners.len() - 1];
        assert!(registry.was_destroyed(newest));
        assert!(registry.take(newest, true).is_none());
        assert!(!registry.was_destroyed(owners[0]));
    }

    #[test]
    fn registry_remembers_nothing_outside_dev_mode() {
        let mut registry = DestructorRegistry::default();
        let owner = OwnerId::new();
        registry.register(owner, [Destructor::new(|| {})]);
        assert!(registry.take(owner, false).is_some());
        assert!(!registry.was_destroyed(owner));
        assert_eq!(registry.remembered(), 0);
    }

    #[test]
    fn destroy_of_unknown_owner_is_a_noop() {
        let runtime = Runtime::new();
        assert!(runtime.destroy(OwnerId::new()).is_complete());
        assert_eq!(runtime.pending_teardowns(), 0);
    }

    #[test]
    fn destroy_with_chains_owners() {
        let runtime = Runtime::new();
        let parent = OwnerId::new();
        let child = OwnerId::new();
        let (log, make) = recorder();

        runtime.register_destructor(child, [make("child")]);
        runtime.register_destructor(parent, [make("parent-before")]);
        runtime.destroy_with(parent, child);
        runtime.register_destructor(parent, [make("parent-after")]);

        runtime.destroy_sync(parent);
        assert_eq!(*log.borrow(), vec!["parent-before", "child", "parent-after"]);
    }

    #[tokio::test]
    async fn deferred_destructor_holds_the_teardown() {
        let runtime = Runtime::new();
        let owner = OwnerId::new();
        let (tx, rx) = oneshot::channel::<()>();
        let finished = Rc::new(RefCell::new(false));

        runtime.register_destructor(
            owner,
            [Destructor::deferred({
                let finished = finished.clone();
                move || async move {
                    let _ = rx.await;
                    *finished.borrow_mut() = true;
                }
            })],
        );

        let teardown = runtime.destroy(owner);
        assert!(!teardown.try_complete());
        assert_eq!(runtime.pending_teardowns(), 1);

        tx.send(()).unwrap();
        teardown.clone().await;
        assert!(teardown.is_complete());
        assert!(*finished.borrow());

        runtime.flush();
        assert_eq!(runtime.pending_teardowns(), 0);
    }

    #[tokio::test]
    async fn settle_waits_for_parked_teardowns() {
        let runtime = Runtime::new();
        let owner = OwnerId::new();
        let (tx, rx) = oneshot::channel::<()>();
        runtime.register_destructor(
            owner,
            [Destructor::deferred(move || async move {
                let _ = rx.await;
            })],
        );
        runtime.destroy_sync(owner);
        assert_eq!(runtime.pending_teardowns(), 1);

        let release = async move {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        };
        tokio::join!(runtime.settle(), release);
        assert_eq!(runtime.pending_teardowns(), 0);
    }

    #[test]
    fn teardown_all_of_nothing_is_ready() {
        assert!(Teardown::all(Vec::new()).is_complete());
        assert!(Teardown::all([Teardown::ready(), Teardown::ready()]).is_complete());
    }
}
