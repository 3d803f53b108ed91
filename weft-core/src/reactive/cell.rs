//! Cell Implementation
//!
//! A Cell is the basic unit of mutable reactive state. It holds a value and
//! records a dependency whenever it is read inside a tracking frame.
//!
//! # Example
//!
//! ```rust
//! use weft_core::Runtime;
//!
//! let runtime = Runtime::new();
//! let count = runtime.cell(0);
//! let doubled = runtime.formula({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! assert_eq!(doubled.get(), 0);
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! ```
//!
//! # Writes
//!
//! A write invalidates every formula that read the cell and schedules the
//! cell for the next flush. Writes never dispatch subscribers directly; the
//! flush does, once per turn.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::runtime::{NodeLease, Runtime, WeakRuntime};
use crate::graph::{Node, NodeId};
use crate::lifecycle::OwnerId;

struct CellSlot<T> {
    value: RefCell<T>,
    label: Option<Rc<str>>,
    _lease: NodeLease,
}

/// A reactive container for mutable state.
///
/// Cells are cheap to clone; clones share the same value.
pub struct Cell<T: 'static> {
    runtime: WeakRuntime,
    id: NodeId,
    slot: Rc<CellSlot<T>>,
}

impl Runtime {
    /// Create a new cell with the given initial value.
    pub fn cell<T: 'static>(&self, value: T) -> Cell<T> {
        self.create_cell(value, None)
    }

    /// Create a cell with a debug label used in log output.
    pub fn cell_with_label<T: 'static>(&self, value: T, label: impl Into<Rc<str>>) -> Cell<T> {
        self.create_cell(value, Some(label.into()))
    }

    fn create_cell<T: 'static>(&self, value: T, label: Option<Rc<str>>) -> Cell<T> {
        let id = NodeId::new();
        self.inner
            .graph
            .borrow_mut()
            .add_node(Node::cell(id, label.clone()));
        Cell {
            runtime: self.downgrade(),
            id,
            slot: Rc::new(CellSlot {
                value: RefCell::new(value),
                label,
                _lease: NodeLease::new(self, id),
            }),
        }
    }

    /// Return the cell stored under `name` on `owner`, creating it with
    /// `init` on first access.
    ///
    /// Tracked fields give a component stable per-instance state without
    /// threading handles around. The entries are dropped when `owner` is
    /// destroyed. Asking for an existing name with a different type replaces
    /// the old field.
    pub fn field<T: 'static>(
        &self,
        owner: OwnerId,
        name: &'static str,
        init: impl FnOnce() -> T,
    ) -> Cell<T> {
        let existing = self
            .inner
            .fields
            .borrow()
            .get(&owner)
            .and_then(|fields| fields.get(name))
            .cloned();
        if let Some(existing) = existing {
            match existing.downcast::<Cell<T>>() {
                Ok(cell) => return (*cell).clone(),
                Err(_) => warn!(
                    %owner,
                    field = name,
                    "field re-declared with a different type; replacing"
                ),
            }
        }

        let cell = self.cell_with_label(init(), name);
        let first_field = {
            let mut fields = self.inner.fields.borrow_mut();
            let first = !fields.contains_key(&owner);
            fields
                .entry(owner)
                .or_default()
                .insert(name, Rc::new(cell.clone()) as Rc<dyn Any>);
            first
        };
        if first_field {
            let runtime = self.downgrade();
            self.on_destroy(owner, move || {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.inner.fields.borrow_mut().remove(&owner);
                }
            });
        }
        cell
    }
}

impl<T: 'static> Cell<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.slot.label.as_deref()
    }

    /// Read the value, recording a dependency if a frame is active.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.track();
        self.get_untracked()
    }

    /// Read the value without recording a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.slot.value.borrow().clone()
    }

    /// Borrow the value, recording a dependency.
    ///
    /// Writing this cell from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.slot.value.borrow())
    }

    /// Replace the value. Always schedules revalidation, even if the new
    /// value equals the old one.
    pub fn set(&self, value: T) {
        *self.slot.value.borrow_mut() = value;
        self.notify();
    }

    /// Mutate the value in place and schedule revalidation.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.slot.value.borrow_mut());
        self.notify();
    }

    /// Replace the value only if it differs. Returns whether a write
    /// happened.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if *self.slot.value.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }

    /// Drop the cell's graph node ahead of its last handle.
    ///
    /// Used for cells owned by a structural component, whose node must go
    /// when the component is torn down even if a handle outlives it. Reads
    /// and writes keep working on the value; writes just reach nobody.
    pub(crate) fn release(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release_node(self.id);
        }
    }

    fn track(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track_read(self.id);
        }
    }

    fn notify(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.mark_dirty(self.id);
        }
    }
}

impl<T: 'static> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            slot: self.slot.clone(),
        }
    }
}

impl<T: 'static> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: 'static> Eq for Cell<T> {}

impl<T: fmt::Debug + 'static> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Cell");
        out.field("id", &self.id);
        if let Some(label) = self.label() {
            out.field("label", &label);
        }
        match self.slot.value.try_borrow() {
            Ok(value) => out.field("value", &*value),
            Err(_) => out.field("value", &"<borrowed>"),
        };
        out.finish()
    }
}
