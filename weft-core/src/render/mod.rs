//! Rendering
//!
//! Connects reactive values to a host tree through a [`TreeAdapter`].
//!
//! # Overview
//!
//! A [`Renderer`] pairs a runtime with an adapter. Rendering code creates
//! host nodes through it and binds reactive values to them: each binding is
//! a subscriber owned by some [`OwnerId`], so destroying the owner detaches
//! every binding it made.
//!
//! Two structural components manage regions of the tree:
//!
//! - [`Conditional`] swaps between two branches on a boolean.
//! - [`KeyedList`] reconciles one row per key against an array.
//!
//! Both mark their region with comment nodes, and both are owners in the
//! structural tree, so their rows and branches are torn down with them.

mod adapter;
mod bind;
mod conditional;
mod list;
mod memory;

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::lifecycle::{OwnerId, Teardown};
use crate::reactive::{Runtime, WeakRuntime};

pub use adapter::{EventHandler, ListenerRemover, PropValue, TreeAdapter};
pub use conditional::{BranchState, Conditional};
pub use list::{by_identity, by_value, KeyedList, TeardownMode};
pub use memory::{MemNode, MemNodeKind, MemoryTree, TreeStats};

/// Renders into one host tree on behalf of one runtime.
pub struct Renderer<A: TreeAdapter> {
    runtime: Runtime,
    adapter: Rc<A>,
}

impl<A: TreeAdapter> Clone for Renderer<A> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            adapter: self.adapter.clone(),
        }
    }
}

impl<A: TreeAdapter> fmt::Debug for Renderer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

/// Renderer handle stored inside subscribers and destructors.
pub(crate) struct WeakRenderer<A: TreeAdapter> {
    runtime: WeakRuntime,
    adapter: Rc<A>,
}

impl<A: TreeAdapter> WeakRenderer<A> {
    pub(crate) fn upgrade(&self) -> Option<Renderer<A>> {
        self.runtime.upgrade().map(|runtime| Renderer {
            runtime,
            adapter: self.adapter.clone(),
        })
    }
}

impl<A: TreeAdapter> Renderer<A> {
    pub fn new(runtime: Runtime, adapter: A) -> Self {
        Self::from_shared(runtime, Rc::new(adapter))
    }

    pub fn from_shared(runtime: Runtime, adapter: Rc<A>) -> Self {
        Self { runtime, adapter }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn adapter(&self) -> &Rc<A> {
        &self.adapter
    }

    pub(crate) fn downgrade(&self) -> WeakRenderer<A> {
        WeakRenderer {
            runtime: self.runtime.downgrade(),
            adapter: self.adapter.clone(),
        }
    }

    pub fn element(&self, tag: &str) -> A::Node {
        self.adapter.create_element(tag)
    }

    pub fn comment(&self, text: &str) -> A::Node {
        self.adapter.create_comment(text)
    }

    /// Append `children` to `parent`, in order.
    pub fn append(&self, parent: &A::Node, children: &[A::Node]) {
        for child in children {
            self.adapter.insert(parent, child, None);
        }
    }

    /// Replace the contents of `container` with the nodes `build` returns.
    ///
    /// `build` receives a fresh root owner; everything it binds should hang
    /// off that owner so [`Mounted::unmount`] can tear it all down. If
    /// `build` fails, the root owner is destroyed and the error returned.
    pub fn mount<F>(&self, container: &A::Node, build: F) -> Result<Mounted<A>>
    where
        F: FnOnce(&Self, OwnerId) -> Result<Vec<A::Node>>,
    {
        let owner = self.runtime.child_owner(None, "root")?;
        self.adapter.clear_children(container);
        let nodes = match build(self, owner) {
            Ok(nodes) => nodes,
            Err(err) => {
                self.runtime.destroy_sync(owner);
                return Err(err);
            }
        };
        self.append(container, &nodes);
        debug!(%owner, nodes = nodes.len(), "mounted");
        Ok(Mounted {
            renderer: self.clone(),
            owner,
            container: container.clone(),
        })
    }
}

/// A mounted root. Dropping it leaves the content in place.
pub struct Mounted<A: TreeAdapter> {
    renderer: Renderer<A>,
    owner: OwnerId,
    container: A::Node,
}

impl<A: TreeAdapter> Mounted<A> {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn container(&self) -> &A::Node {
        &self.container
    }

    /// Destroy the root owner and clear the container.
    pub fn unmount(self) -> Teardown {
        let teardown = self.renderer.runtime.destroy(self.owner);
        self.renderer.adapter.clear_children(&self.container);
        debug!(owner = %self.owner, "unmounted");
        teardown
    }
}

impl<A: TreeAdapter> fmt::Debug for Mounted<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounted")
            .field("owner", &self.owner)
            .field("container", &self.container)
            .finish()
    }
}
