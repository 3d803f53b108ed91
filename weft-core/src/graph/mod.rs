//! Dependency Graph
//!
//! This module implements the bookkeeping that connects cells to the formulas
//! that read them, and the scheduler that batches writes into turns.
//!
//! # Overview
//!
//! The graph is bipartite: edges run from a cell to each formula that read it
//! during its last evaluation. When a formula reads another formula, the inner
//! formula's cells are recorded directly on the outer one, so a write only
//! ever needs to look at the cell's direct dependents.
//!
//! # Design Decisions
//!
//! 1. One graph per [`Runtime`](crate::Runtime), indexed by [`NodeId`] for
//!    O(1) lookups. Independent runtimes never share nodes.
//!
//! 2. We maintain both forward (dependencies) and reverse (dependents) edges
//!    so that re-evaluation and destruction can unlink in both directions.
//!
//! 3. Invalidation happens at write time; evaluation happens at read time.
//!    The scheduler only decides when subscribers get to read.

mod dependency;
mod node;
mod scheduler;

pub use dependency::DependencyGraph;
pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::{FlushHook, RevalidationScheduler};
