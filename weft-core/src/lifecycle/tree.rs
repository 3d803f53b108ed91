//! Structural Tree
//!
//! Parent/child relationships between owners. The tree is what makes
//! teardown deterministic: destroying an owner destroys its children, which
//! destroy theirs, before the owner's own entry is removed.
//!
//! The index keeps three maps in step: owner to node, owner to parent, and
//! owner to children. Every owner in the tree has an entry in all three.
//!
//! Subtree teardown is not a walk. Inserting an owner registers a deferred
//! destructor on it that destroys each current child and then removes the
//! owner; each child's own destructor does the same. The returned teardown
//! joins the children's teardowns.

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::trace;

use super::destructor::{Destructor, Teardown};
use super::OwnerId;
use crate::error::{Error, Result};
use crate::reactive::Runtime;

/// An owner's entry in the structural tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: OwnerId,
    /// Kind of structure the owner represents, for log output.
    pub label: &'static str,
}

#[derive(Debug, Default)]
pub(crate) struct TreeIndex {
    nodes: HashMap<OwnerId, TreeNode>,
    parents: HashMap<OwnerId, Option<OwnerId>>,
    children: HashMap<OwnerId, IndexSet<OwnerId>>,
}

impl TreeIndex {
    fn insert(&mut self, parent: Option<OwnerId>, node: TreeNode) {
        let id = node.id;
        self.nodes.insert(id, node);
        self.parents.insert(id, parent);
        self.children.entry(id).or_default();
        if let Some(parent) = parent {
            self.children.entry(parent).or_default().insert(id);
        }
    }

    fn remove(&mut self, id: OwnerId) -> bool {
        if self.nodes.remove(&id).is_none() {
            return false;
        }
        if let Some(Some(parent)) = self.parents.remove(&id) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.shift_remove(&id);
            }
        }
        // Children destroyed through the tree are gone already; anything
        // left was inserted during teardown and becomes a root.
        if let Some(orphans) = self.children.remove(&id) {
            for orphan in orphans {
                self.parents.insert(orphan, None);
            }
        }
        true
    }

    pub(crate) fn contains(&self, id: OwnerId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn parent_of(&self, id: OwnerId) -> Option<OwnerId> {
        self.parents.get(&id).copied().flatten()
    }

    fn children_of(&self, id: OwnerId) -> Vec<OwnerId> {
        self.children
            .get(&id)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Runtime {
    /// Insert `child` into the tree under `parent`, or as a root.
    ///
    /// Registers the destructor that tears down `child`'s subtree, so any
    /// destructor the caller wants to run *before* the children go must be
    /// registered before this call.
    pub fn add_to_tree(
        &self,
        parent: Option<OwnerId>,
        child: OwnerId,
        label: &'static str,
    ) -> Result<()> {
        {
            let mut tree = self.inner.tree.borrow_mut();
            if tree.contains(child) {
                return Err(Error::AlreadyInTree(child));
            }
            if let Some(parent) = parent {
                if !tree.contains(parent) {
                    return Err(Error::UnknownOwner(parent));
                }
            }
            tree.insert(parent, TreeNode { id: child, label });
        }
        trace!(owner = %child, parent = ?parent, label, "added to tree");

        let runtime = self.downgrade();
        self.register_destructor(
            child,
            [Destructor::deferred(move || {
                let Some(runtime) = runtime.upgrade() else {
                    return Teardown::ready();
                };
                let children = runtime.inner.tree.borrow().children_of(child);
                let teardowns: Vec<Teardown> = children
                    .into_iter()
                    .map(|grandchild| runtime.destroy(grandchild))
                    .collect();
                runtime.inner.tree.borrow_mut().remove(child);
                trace!(owner = %child, "removed from tree");
                Teardown::all(teardowns)
            })],
        );
        Ok(())
    }

    /// Create a fresh owner and insert it into the tree.
    pub fn child_owner(&self, parent: Option<OwnerId>, label: &'static str) -> Result<OwnerId> {
        let owner = OwnerId::new();
        self.add_to_tree(parent, owner, label)?;
        Ok(owner)
    }

    pub fn in_tree(&self, owner: OwnerId) -> bool {
        self.inner.tree.borrow().contains(owner)
    }

    pub fn tree_node(&self, owner: OwnerId) -> Option<TreeNode> {
        self.inner.tree.borrow().nodes.get(&owner).cloned()
    }

    pub fn tree_parent(&self, owner: OwnerId) -> Option<OwnerId> {
        self.inner.tree.borrow().parent_of(owner)
    }

    /// Children of `owner`, in insertion order.
    pub fn tree_children(&self, owner: OwnerId) -> Vec<OwnerId> {
        self.inner.tree.borrow().children_of(owner)
    }

    /// Ancestors of `owner`, nearest first.
    pub fn ancestors(&self, owner: OwnerId) -> Vec<OwnerId> {
        let tree = self.inner.tree.borrow();
        let mut out = Vec::new();
        let mut cursor = tree.parent_of(owner);
        while let Some(id) = cursor {
            out.push(id);
            cursor = tree.parent_of(id);
        }
        out
    }

    /// Number of owners in the tree.
    pub fn tree_len(&self) -> usize {
        self.inner.tree.borrow().nodes.len()
    }
}
