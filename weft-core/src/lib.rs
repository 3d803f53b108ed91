//! Weft Core
//!
//! This crate provides the core runtime for the Weft fine-grained reactive
//! UI framework. It implements:
//!
//! - Reactive primitives (cells, formulas, effects, subscribers)
//! - A turn scheduler that batches writes and notifies each subscriber once
//! - Owner lifecycles with synchronous and deferred destructors
//! - A structural tree of owners with context lookup
//! - Rendering onto any host tree through an adapter, with conditional and
//!   keyed list regions
//!
//! # Architecture
//!
//! - `reactive`: runtime, cells, formulas, dependency tracking, subscribers
//! - `graph`: dependency graph and dirty-set scheduler behind the runtime
//! - `lifecycle`: owners, destructors, the structural tree, contexts
//! - `render`: tree adapters, bindings, conditionals, keyed lists
//!
//! Everything is single threaded. A [`Runtime`] is a cheap handle; clones
//! share the same state.
//!
//! # Example
//!
//! ```rust
//! use weft_core::Runtime;
//!
//! let runtime = Runtime::new();
//! let count = runtime.cell(1);
//! let doubled = runtime.formula({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let log = seen.clone();
//! let _sub = runtime.subscribe(&doubled, move |value: &i32| log.borrow_mut().push(*value));
//!
//! count.set(2);
//! count.set(5);
//! runtime.flush();
//!
//! // One notification per turn, with the final value.
//! assert_eq!(*seen.borrow(), vec![10]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod reactive;
pub mod render;

pub use config::RuntimeConfig;
pub use error::{BoxError, Error, Result};
pub use lifecycle::{Destructor, OwnerId, Teardown, TreeNode};
pub use reactive::{
    Bindable, Cell, Effect, Formula, Reactive, Runtime, SubscriberId, Unsubscribe, WeakRuntime,
};
pub use render::{
    by_identity, by_value, BranchState, Conditional, KeyedList, MemNode, MemoryTree, Mounted,
    PropValue, Renderer, TeardownMode, TreeAdapter,
};
