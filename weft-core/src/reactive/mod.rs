//! Reactive Primitives
//!
//! This module implements the reactive core: cells, formulas, subscribers,
//! and effects.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for mutable state. Reading a cell while a formula
//! evaluates records the cell as one of the formula's dependencies. Writing
//! it invalidates those formulas and schedules a flush.
//!
//! ## Formulas
//!
//! A Formula is a derived value that caches its result. It re-evaluates only
//! when one of the cells it read changes, and at most once per change no
//! matter how many paths lead to it.
//!
//! ## Subscribers
//!
//! Subscribers are callbacks attached to a cell or formula. They run during
//! a flush, once per turn, with the value current at flush time.
//!
//! ## Effects
//!
//! An Effect is a formula with no value whose subscriber re-runs it. Effects
//! synchronize reactive state with the outside world.
//!
//! # Implementation Notes
//!
//! Every primitive belongs to one [`Runtime`]. The runtime keeps a tracking
//! stack to detect dependencies automatically: when a cell is read, it checks
//! for an active frame and records the read there.

mod cell;
mod context;
mod effect;
mod formula;
mod runtime;
mod subscriber;
mod value;

pub use cell::Cell;
pub use effect::Effect;
pub use formula::Formula;
pub use runtime::{Runtime, WeakRuntime};
pub use subscriber::{SubscriberId, Unsubscribe};
pub use value::{Bindable, Reactive};
