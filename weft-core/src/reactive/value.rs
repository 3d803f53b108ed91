//! Value wrappers accepted by subscription and rendering APIs.

use std::fmt;

use super::cell::Cell;
use super::formula::Formula;
use crate::graph::NodeId;

/// Either kind of reactive value.
pub enum Reactive<T: 'static> {
    Cell(Cell<T>),
    Formula(Formula<T>),
}

impl<T: 'static> Reactive<T> {
    pub fn id(&self) -> NodeId {
        match self {
            Reactive::Cell(cell) => cell.id(),
            Reactive::Formula(formula) => formula.id(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Reactive::Cell(cell) => cell.label(),
            Reactive::Formula(formula) => formula.label(),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match self {
            Reactive::Cell(cell) => cell.get(),
            Reactive::Formula(formula) => formula.get(),
        }
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        match self {
            Reactive::Cell(cell) => cell.get_untracked(),
            Reactive::Formula(formula) => formula.get_untracked(),
        }
    }

    /// Cells are never constant; formulas are once their first evaluation
    /// read nothing.
    pub fn is_const(&self) -> bool {
        match self {
            Reactive::Cell(_) => false,
            Reactive::Formula(formula) => formula.is_const(),
        }
    }
}

impl<T: 'static> Clone for Reactive<T> {
    fn clone(&self) -> Self {
        match self {
            Reactive::Cell(cell) => Reactive::Cell(cell.clone()),
            Reactive::Formula(formula) => Reactive::Formula(formula.clone()),
        }
    }
}

impl<T: 'static> fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reactive::Cell(cell) => write!(f, "Reactive::Cell({})", cell.id()),
            Reactive::Formula(formula) => write!(f, "Reactive::Formula({})", formula.id()),
        }
    }
}

impl<T: 'static> From<Cell<T>> for Reactive<T> {
    fn from(cell: Cell<T>) -> Self {
        Reactive::Cell(cell)
    }
}

impl<T: 'static> From<&Cell<T>> for Reactive<T> {
    fn from(cell: &Cell<T>) -> Self {
        Reactive::Cell(cell.clone())
    }
}

impl<T: 'static> From<Formula<T>> for Reactive<T> {
    fn from(formula: Formula<T>) -> Self {
        Reactive::Formula(formula)
    }
}

impl<T: 'static> From<&Formula<T>> for Reactive<T> {
    fn from(formula: &Formula<T>) -> Self {
        Reactive::Formula(formula.clone())
    }
}

impl<T: 'static> From<&Reactive<T>> for Reactive<T> {
    fn from(value: &Reactive<T>) -> Self {
        value.clone()
    }
}

/// A value that is either fixed or reactive.
///
/// Rendering helpers take `impl Into<Bindable<T>>`, so callers can pass a
/// plain value, a cell, or a formula. Static values are applied once and
/// never subscribed.
pub enum Bindable<T: 'static> {
    Static(T),
    Dynamic(Reactive<T>),
}

impl<T: 'static> Bindable<T> {
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        match self {
            Bindable::Static(value) => value.clone(),
            Bindable::Dynamic(value) => value.get_untracked(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Bindable::Dynamic(_))
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Bindable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bindable::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Bindable::Dynamic(value) => f.debug_tuple("Dynamic").field(value).finish(),
        }
    }
}

impl<T: 'static> From<Reactive<T>> for Bindable<T> {
    fn from(value: Reactive<T>) -> Self {
        Bindable::Dynamic(value)
    }
}

impl<T: 'static> From<Cell<T>> for Bindable<T> {
    fn from(cell: Cell<T>) -> Self {
        Bindable::Dynamic(cell.into())
    }
}

impl<T: 'static> From<&Cell<T>> for Bindable<T> {
    fn from(cell: &Cell<T>) -> Self {
        Bindable::Dynamic(cell.into())
    }
}

impl<T: 'static> From<Formula<T>> for Bindable<T> {
    fn from(formula: Formula<T>) -> Self {
        Bindable::Dynamic(formula.into())
    }
}

impl<T: 'static> From<&Formula<T>> for Bindable<T> {
    fn from(formula: &Formula<T>) -> Self {
        Bindable::Dynamic(formula.into())
    }
}

impl From<&str> for Bindable<String> {
    fn from(value: &str) -> Self {
        Bindable::Static(value.to_string())
    }
}

impl From<String> for Bindable<String> {
    fn from(value: String) -> Self {
        Bindable::Static(value)
    }
}

impl From<bool> for Bindable<bool> {
    fn from(value: bool) -> Self {
        Bindable::Static(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    #[test]
    fn reactive_wraps_both_kinds() {
        let runtime = Runtime::new();
        let cell = runtime.cell(2);
        let formula = runtime.formula(|| 3);

        let a: Reactive<i32> = (&cell).into();
        let b: Reactive<i32> = (&formula).into();
        assert_eq!(a.id(), cell.id());
        assert_eq!(a.get() + b.get(), 5);
        assert!(!a.is_const());
        assert!(b.is_const());
    }

    #[test]
    fn bindable_from_plain_and_reactive_values() {
        let runtime = Runtime::new();
        let name = runtime.cell("x".to_string());

        let fixed: Bindable<String> = "static".into();
        let live: Bindable<String> = (&name).into();
        assert!(!fixed.is_dynamic());
        assert!(live.is_dynamic());

        name.set("y".to_string());
        assert_eq!(fixed.get_untracked(), "static");
        assert_eq!(live.get_untracked(), "y");
    }
}
