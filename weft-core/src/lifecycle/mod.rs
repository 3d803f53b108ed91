//! Lifecycle
//!
//! Owners, destructors, the structural tree, and context values.
//!
//! # Concepts
//!
//! ## Owners
//!
//! An [`OwnerId`] names anything that holds resources: a mounted root, a
//! conditional, a list row, a component. Owners are plain identifiers; the
//! runtime keeps every piece of state attached to them in side tables.
//!
//! ## Destructors
//!
//! Destroying an owner runs the callbacks registered on it, in registration
//! order, exactly once. Callbacks may return futures; the destroy call then
//! returns a [`Teardown`] that completes when all of them have.
//!
//! ## Structural tree
//!
//! Owners added to the tree record their parent. Destroying an owner in the
//! tree destroys its children first, which gives deterministic teardown of
//! whole subtrees.
//!
//! ## Context
//!
//! Owners in the tree can provide typed values to their descendants.

mod context;
mod destructor;
mod tree;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use destructor::{Destructor, Teardown};
pub use tree::TreeNode;

pub(crate) use context::ContextStore;
pub(crate) use destructor::DestructorRegistry;
pub(crate) use tree::TreeIndex;

/// Unique identifier for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Generate a new unique owner ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}
