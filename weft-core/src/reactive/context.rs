//! Reactive Context
//!
//! The reactive context tracks which computation is currently reading cells.
//! This enables automatic dependency tracking: when a cell is read, it is
//! recorded in the innermost active frame.
//!
//! # Implementation
//!
//! Each runtime keeps a stack of tracking frames. Entering a context pushes
//! a frame and returns a guard; finishing the guard pops the frame and hands
//! back the cells it captured. Dropping an unfinished guard (for example
//! while unwinding from a panicking computation) still pops the frame, so the
//! stack is never left unbalanced.
//!
//! Formulas only open a frame when none is active. A formula read inside
//! another computation evaluates in place, which flattens its cells into the
//! outer frame.

use indexmap::IndexSet;
use tracing::trace;

use super::runtime::Runtime;
use crate::graph::NodeId;

/// An entry in the tracking stack.
#[derive(Debug)]
struct TrackingFrame {
    /// The formula being evaluated, or `None` for an explicit
    /// [`Runtime::track`] call.
    owner: Option<NodeId>,
    /// Cells read during this frame, in first-read order.
    dependencies: IndexSet<NodeId>,
}

#[derive(Debug, Default)]
pub(crate) struct TrackerStack {
    frames: Vec<TrackingFrame>,
}

impl TrackerStack {
    fn push(&mut self, owner: Option<NodeId>) -> usize {
        self.frames.push(TrackingFrame {
            owner,
            dependencies: IndexSet::new(),
        });
        self.frames.len()
    }

    fn pop(&mut self) -> Option<TrackingFrame> {
        self.frames.pop()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    pub(crate) fn current_owner(&self) -> Option<NodeId> {
        self.frames.last().and_then(|frame| frame.owner)
    }

    /// Record a read in the innermost frame. Returns `false` if no frame is
    /// active.
    pub(crate) fn record(&mut self, cell: NodeId) -> bool {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.dependencies.insert(cell);
                true
            }
            None => false,
        }
    }
}

/// Guard for an active tracking frame.
pub(crate) struct ReactiveContext<'a> {
    runtime: &'a Runtime,
    depth: usize,
    finished: bool,
}

impl<'a> ReactiveContext<'a> {
    pub(crate) fn enter(runtime: &'a Runtime, owner: Option<NodeId>) -> Self {
        let depth = runtime.inner.tracker.borrow_mut().push(owner);
        Self {
            runtime,
            depth,
            finished: false,
        }
    }

    /// Pop the frame and return the cells it captured.
    pub(crate) fn finish(mut self) -> IndexSet<NodeId> {
        self.finished = true;
        let mut tracker = self.runtime.inner.tracker.borrow_mut();
        debug_assert_eq!(
            tracker.frames.len(),
            self.depth,
            "tracking frames popped out of order"
        );
        tracker
            .pop()
            .map(|frame| frame.dependencies)
            .unwrap_or_default()
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Ok(mut tracker) = self.runtime.inner.tracker.try_borrow_mut() {
                tracker.pop();
            }
        }
    }
}

/// Guard that parks the whole tracking stack and restores it on drop.
struct Suspended<'a> {
    runtime: &'a Runtime,
    frames: Vec<TrackingFrame>,
}

impl Drop for Suspended<'_> {
    fn drop(&mut self) {
        let frames = std::mem::take(&mut self.frames);
        if let Ok(mut tracker) = self.runtime.inner.tracker.try_borrow_mut() {
            tracker.frames = frames;
        }
    }
}

impl Runtime {
    /// Whether a tracking frame is active.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracker.borrow().is_active()
    }

    /// The formula whose evaluation is currently being tracked, if any.
    pub fn current_formula(&self) -> Option<NodeId> {
        self.inner.tracker.borrow().current_owner()
    }

    /// Run `f` in a fresh tracking frame and return its result together with
    /// every cell it read.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> (R, IndexSet<NodeId>) {
        self.track_for(None, f)
    }

    pub(crate) fn track_for<R>(
        &self,
        owner: Option<NodeId>,
        f: impl FnOnce() -> R,
    ) -> (R, IndexSet<NodeId>) {
        let context = ReactiveContext::enter(self, owner);
        let result = f();
        let dependencies = context.finish();
        (result, dependencies)
    }

    /// Run `f` with tracking suspended: reads inside it are not recorded by
    /// any enclosing frame.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let frames = std::mem::take(&mut self.inner.tracker.borrow_mut().frames);
        let _restore = Suspended {
            runtime: self,
            frames,
        };
        f()
    }

    /// Record a cell read in the active frame.
    pub(crate) fn track_read(&self, cell: NodeId) {
        if self.inner.tracker.borrow_mut().record(cell) {
            trace!(%cell, "dependency recorded");
        }
    }
}
