//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A mutable leaf. Cells have dependents but never dependencies.
    Cell,

    /// A derived value. Its dependencies are always cells: reads of other
    /// formulas during its evaluation are flattened into their cells.
    Formula,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// For a formula, the memoized value is current.
    Clean,

    /// For a formula, a dependency was written since the last evaluation.
    /// For a cell, it was written since the last flush.
    Dirty,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    label: Option<Rc<str>>,
    dirty: DirtyState,

    /// Cells this formula read during its last evaluation.
    dependencies: HashSet<NodeId>,

    /// Formulas that read this cell during their last evaluation, in the
    /// order they first did so.
    dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(id: NodeId, kind: NodeKind, label: Option<Rc<str>>) -> Self {
        Self {
            id,
            kind,
            label,
            dirty: match kind {
                NodeKind::Cell => DirtyState::Clean,
                // Start dirty to ensure the first read evaluates.
                NodeKind::Formula => DirtyState::Dirty,
            },
            dependencies: HashSet::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn cell(id: NodeId, label: Option<Rc<str>>) -> Self {
        Self::new(id, NodeKind::Cell, label)
    }

    pub fn formula(id: NodeId, label: Option<Rc<str>>) -> Self {
        Self::new(id, NodeKind::Formula, label)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.remove(&node_id);
    }

    pub fn dependencies(&self) -> &HashSet<NodeId> {
        &self.dependencies
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub fn take_dependencies(&mut self) -> HashSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }

    /// Human-readable name for log output: the label if present, else the id.
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("{label} ({})", self.id),
            None => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id2.raw() > id1.raw());
    }

    #[test]
    fn cell_node_starts_clean() {
        let node = Node::cell(NodeId::new(), None);
        assert_eq!(node.kind(), NodeKind::Cell);
        assert!(node.is_clean());
    }

    #[test]
    fn formula_node_starts_dirty() {
        let node = Node::formula(NodeId::new(), Some("total".into()));
        assert_eq!(node.kind(), NodeKind::Formula);
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
        assert!(node.describe().starts_with("total (node#"));
    }

    #[test]
    fn dependents_keep_first_read_order() {
        let mut node = Node::cell(NodeId::new(), None);
        let a = NodeId::new();
        let b = NodeId::new();
        let c = NodeId::new();

        node.add_dependent(b);
        node.add_dependent(a);
        node.add_dependent(c);
        node.add_dependent(b);
        node.remove_dependent(a);

        let order: Vec<_> = node.dependents().iter().copied().collect();
        assert_eq!(order, vec![b, c]);
    }
}
