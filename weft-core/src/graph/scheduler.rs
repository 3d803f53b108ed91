//! Revalidation Scheduler
//!
//! Coalesces the cells written during one turn into a single flush.
//!
//! # Algorithm
//!
//! 1. A write adds the cell to the dirty set and requests a flush.
//! 2. The first request of a turn flips the pending flag and fires the host
//!    hook, if one is installed. Later requests in the same turn do nothing.
//! 3. The flush takes the whole dirty set at once and clears the flag, so
//!    writes made by subscribers during the flush land in the next turn.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use super::node::NodeId;

/// Host integration point invoked when a turn first needs a flush.
pub type FlushHook = Rc<dyn Fn()>;

#[derive(Default)]
pub struct RevalidationScheduler {
    dirty: IndexSet<NodeId>,
    pending: bool,
    turn: u64,
    hook: Option<FlushHook>,
}

impl RevalidationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hook(&mut self, hook: Option<FlushHook>) {
        self.hook = hook;
    }

    /// Record a written cell. Returns `true` if it was not already dirty in
    /// this turn.
    pub fn mark(&mut self, cell: NodeId) -> bool {
        self.dirty.insert(cell)
    }

    /// Request a flush for the current turn.
    ///
    /// Returns the hook to call when this request opened the turn. The caller
    /// invokes it after releasing any borrow of the scheduler.
    pub fn request(&mut self) -> Option<FlushHook> {
        if self.pending {
            return None;
        }
        self.pending = true;
        self.hook.clone()
    }

    /// Take the dirty set and close the turn.
    pub fn take(&mut self) -> IndexSet<NodeId> {
        self.pending = false;
        self.turn += 1;
        std::mem::take(&mut self.dirty)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Number of flushes taken so far.
    pub fn turn(&self) -> u64 {
        self.turn
    }
}

impl fmt::Debug for RevalidationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevalidationScheduler")
            .field("dirty", &self.dirty)
            .field("pending", &self.pending)
            .field("turn", &self.turn)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn requests_coalesce_within_a_turn() {
        let calls = Rc::new(Cell::new(0));
        let mut scheduler = RevalidationScheduler::new();
        scheduler.set_hook(Some(Rc::new({
            let calls = calls.clone();
            move || calls.set(calls.get() + 1)
        })));

        for _ in 0..3 {
            scheduler.mark(NodeId::new());
            if let Some(hook) = scheduler.request() {
                hook();
            }
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(scheduler.dirty_count(), 3);

        let taken = scheduler.take();
        assert_eq!(taken.len(), 3);
        assert!(!scheduler.is_pending());
        assert_eq!(scheduler.turn(), 1);

        scheduler.mark(NodeId::new());
        if let Some(hook) = scheduler.request() {
            hook();
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn marking_twice_keeps_one_entry() {
        let mut scheduler = RevalidationScheduler::new();
        let cell = NodeId::new();
        assert!(scheduler.mark(cell));
        assert!(!scheduler.mark(cell));
        assert_eq!(scheduler.take().len(), 1);
    }
}
