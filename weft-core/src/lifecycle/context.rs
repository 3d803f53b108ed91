//! Context Values
//!
//! Typed values an owner provides to its descendants in the structural tree.
//! Lookup starts at the given owner and walks up through its ancestors; the
//! nearest provider wins. Values are keyed by type, so one owner holds at
//! most one value per type.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use super::OwnerId;
use crate::error::{Error, Result};
use crate::reactive::Runtime;

#[derive(Default)]
pub(crate) struct ContextStore {
    values: HashMap<OwnerId, HashMap<TypeId, Rc<dyn Any>>>,
}

impl ContextStore {
    /// Store a value. Returns `true` if this is the owner's first value.
    fn insert<T: 'static>(&mut self, owner: OwnerId, value: T) -> bool {
        let first = !self.values.contains_key(&owner);
        self.values
            .entry(owner)
            .or_default()
            .insert(TypeId::of::<T>(), Rc::new(value));
        first
    }

    fn lookup<T: Clone + 'static>(&self, owner: OwnerId) -> Option<T> {
        self.values
            .get(&owner)?
            .get(&TypeId::of::<T>())?
            .downcast_ref::<T>()
            .cloned()
    }

    fn clear(&mut self, owner: OwnerId) {
        self.values.remove(&owner);
    }
}

impl Runtime {
    /// Make `value` visible to `owner` and its descendants.
    ///
    /// Providing the same type again on the same owner replaces the value.
    /// The values are dropped when `owner` is destroyed.
    pub fn provide_context<T: 'static>(&self, owner: OwnerId, value: T) {
        let first = self.inner.contexts.borrow_mut().insert(owner, value);
        trace!(%owner, context = type_name::<T>(), "context provided");
        if first {
            let runtime = self.downgrade();
            self.on_destroy(owner, move || {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.inner.contexts.borrow_mut().clear(owner);
                }
            });
        }
    }

    /// Find the nearest `T` provided by `owner` or one of its ancestors.
    pub fn use_context<T: Clone + 'static>(&self, owner: OwnerId) -> Option<T> {
        let mut cursor = Some(owner);
        while let Some(id) = cursor {
            if let Some(value) = self.inner.contexts.borrow().lookup::<T>(id) {
                return Some(value);
            }
            cursor = self.tree_parent(id);
        }
        None
    }

    pub fn use_context_or<T: Clone + 'static>(&self, owner: OwnerId, default: T) -> T {
        self.use_context(owner).unwrap_or(default)
    }

    /// Like [`Runtime::use_context`], for values the caller cannot do
    /// without.
    pub fn expect_context<T: Clone + 'static>(&self, owner: OwnerId) -> Result<T> {
        self.use_context(owner).ok_or(Error::MissingContext {
            type_name: type_name::<T>(),
            owner,
        })
    }
}
