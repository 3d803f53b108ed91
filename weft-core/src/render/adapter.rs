//! Host Tree Adapter
//!
//! The renderer never touches a concrete tree. Everything it needs from the
//! host (a browser DOM, a terminal buffer, the in-memory tree used in tests)
//! goes through [`TreeAdapter`].
//!
//! Adapters follow DOM insertion semantics:
//!
//! - inserting a node that already has a parent moves it,
//! - inserting a fragment moves the fragment's children and leaves it empty,
//! - `before: None` appends.
//!
//! Adapters should be lenient: unexpected host state (an anchor that is not a
//! child of the parent, removing a detached node) is logged, not fatal.

use std::fmt;
use std::rc::Rc;

/// Callback attached to a host event.
pub type EventHandler = Rc<dyn Fn()>;

/// Undoes an [`TreeAdapter::add_event_listener`] call.
pub type ListenerRemover = Box<dyn FnOnce()>;

/// A value assigned to a host property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Text(String),
    Bool(bool),
    Number(f64),
    /// Remove the property.
    Unset,
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(text) => f.write_str(text),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Number(value) => write!(f, "{value}"),
            PropValue::Unset => Ok(()),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Number(value)
    }
}

/// Operations the renderer needs from a host tree.
pub trait TreeAdapter: 'static {
    /// Handle to a host node. Cloning must yield a handle to the same node.
    type Node: Clone + PartialEq + fmt::Debug + 'static;

    fn create_element(&self, tag: &str) -> Self::Node;

    fn create_text(&self, text: &str) -> Self::Node;

    fn create_comment(&self, text: &str) -> Self::Node;

    /// A detached container whose children move out when it is inserted.
    fn create_fragment(&self) -> Self::Node;

    /// Insert `node` under `parent` before `before`, or at the end.
    fn insert(&self, parent: &Self::Node, node: &Self::Node, before: Option<&Self::Node>);

    /// Detach `node` from its parent.
    fn remove(&self, node: &Self::Node);

    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);

    /// Set a host property. `"textContent"` on a text node replaces its text.
    fn set_property(&self, node: &Self::Node, name: &str, value: PropValue);

    /// Attach an event handler. Returns a callback that detaches it, if the
    /// host supports detaching.
    fn add_event_listener(
        &self,
        node: &Self::Node,
        event: &str,
        handler: EventHandler,
    ) -> Option<ListenerRemover>;

    fn parent_of(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Detach every child of `node`.
    fn clear_children(&self, node: &Self::Node);
}
