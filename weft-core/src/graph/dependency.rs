//! Dependency Graph
//!
//! Owns every node of one runtime and the edges between them. Edges always
//! run from a cell to a formula: a formula that reads another formula records
//! that formula's cells instead, so invalidation never needs to walk more than
//! one level.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::node::{Node, NodeId, NodeKind};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph, unlinking it from both sides of every
    /// edge it takes part in.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Add a dependency edge: `dependent` read `dependency`.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Replace the dependency set of `formula` after an evaluation and mark it
    /// clean. Only the edges that changed are touched.
    pub fn replace_dependencies(&mut self, formula: NodeId, next: &IndexSet<NodeId>) {
        let Some(node) = self.nodes.get_mut(&formula) else {
            return;
        };
        node.mark_clean();
        let previous = node.take_dependencies();

        for stale in previous.iter().filter(|id| !next.contains(*id)) {
            if let Some(dep) = self.nodes.get_mut(stale) {
                dep.remove_dependent(formula);
            }
        }

        // Re-add everything: `take_dependencies` emptied the formula's side.
        for &dependency in next {
            if dependency != formula {
                self.add_edge(dependency, formula);
            }
        }
    }

    /// Mark every formula that read `cell` as needing re-evaluation.
    ///
    /// Returns the number of formulas that went from clean to dirty.
    pub fn invalidate_dependents(&mut self, cell: NodeId) -> usize {
        let dependents: Vec<NodeId> = match self.nodes.get(&cell) {
            Some(node) => node.dependents().iter().copied().collect(),
            None => return 0,
        };

        let mut flipped = 0;
        for id in dependents {
            if let Some(node) = self.nodes.get_mut(&id) {
                if node.is_clean() {
                    flipped += 1;
                }
                node.mark_dirty();
            }
        }
        flipped
    }

    /// Collect the formulas depending on any of `cells`, deduplicated, in
    /// first-seen order.
    pub fn dependents_of_all<'a>(
        &self,
        cells: impl IntoIterator<Item = &'a NodeId>,
    ) -> IndexSet<NodeId> {
        let mut out = IndexSet::new();
        for cell in cells {
            if let Some(node) = self.nodes.get(cell) {
                out.extend(node.dependents().iter().copied());
            }
        }
        out
    }

    pub fn is_clean(&self, node_id: NodeId) -> bool {
        self.nodes
            .get(&node_id)
            .map(Node::is_clean)
            .unwrap_or(false)
    }

    pub fn describe(&self, node_id: NodeId) -> String {
        self.nodes
            .get(&node_id)
            .map(Node::describe)
            .unwrap_or_else(|| node_id.to_string())
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn formula_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| node.kind() == NodeKind::Formula)
            .count()
    }
}
