//! In-memory host tree.
//!
//! [`MemoryTree`] implements [`TreeAdapter`] over an arena of nodes. It is
//! what the test-suite renders into, and what server-side hosts can serialize
//! with [`MemoryTree::to_html`]. Nodes are never freed; removed nodes simply
//! become detached, so handles stay valid for assertions.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::warn;

use super::adapter::{EventHandler, ListenerRemover, PropValue, TreeAdapter};

/// Handle to a node in a [`MemoryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemNode(usize);

impl MemNode {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemNodeKind {
    Element(String),
    Text(String),
    Comment(String),
    Fragment,
}

/// Operation counters, for asserting how much work a render did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub created: usize,
    pub inserted: usize,
    pub removed: usize,
}

struct Slot {
    kind: MemNodeKind,
    parent: Option<MemNode>,
    children: Vec<MemNode>,
    attributes: IndexMap<String, String>,
    properties: IndexMap<String, PropValue>,
    listeners: Vec<(u64, String, EventHandler)>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    stats: TreeStats,
    next_listener: u64,
}

impl Arena {
    fn create(&mut self, kind: MemNodeKind) -> MemNode {
        let node = MemNode(self.slots.len());
        self.slots.push(Slot {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
            listeners: Vec::new(),
        });
        self.stats.created += 1;
        node
    }

    fn slot(&self, node: MemNode) -> &Slot {
        &self.slots[node.0]
    }

    fn slot_mut(&mut self, node: MemNode) -> &mut Slot {
        &mut self.slots[node.0]
    }

    fn detach(&mut self, node: MemNode) -> bool {
        match self.slot_mut(node).parent.take() {
            Some(parent) => {
                self.slot_mut(parent).children.retain(|child| *child != node);
                true
            }
            None => false,
        }
    }

    fn attach(&mut self, parent: MemNode, node: MemNode, before: Option<MemNode>) {
        if before == Some(node) {
            return;
        }
        self.detach(node);
        let siblings = &self.slots[parent.0].children;
        let at = match before {
            Some(anchor) => match siblings.iter().position(|child| *child == anchor) {
                Some(at) => at,
                None => {
                    warn!(
                        ?anchor,
                        ?parent,
                        "insert anchor is not a child of the parent; appending"
                    );
                    siblings.len()
                }
            },
            None => siblings.len(),
        };
        self.slot_mut(parent).children.insert(at, node);
        self.slot_mut(node).parent = Some(parent);
        self.stats.inserted += 1;
    }

    fn write_html(&self, node: MemNode, out: &mut String) {
        let slot = self.slot(node);
        match &slot.kind {
            MemNodeKind::Text(text) => out.push_str(&escape(text, false)),
            MemNodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            MemNodeKind::Fragment => {
                for child in &slot.children {
                    self.write_html(*child, out);
                }
            }
            MemNodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &slot.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                for child in &slot.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn write_text(&self, node: MemNode, out: &mut String) {
        let slot = self.slot(node);
        match &slot.kind {
            MemNodeKind::Text(text) => out.push_str(text),
            MemNodeKind::Comment(_) => {}
            MemNodeKind::Element(_) | MemNodeKind::Fragment => {
                for child in &slot.children {
                    self.write_text(*child, out);
                }
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Arena-backed host tree.
#[derive(Default)]
pub struct MemoryTree {
    arena: Rc<RefCell<Arena>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self, node: MemNode) -> MemNodeKind {
        self.arena.borrow().slot(node).kind.clone()
    }

    pub fn children(&self, node: MemNode) -> Vec<MemNode> {
        self.arena.borrow().slot(node).children.clone()
    }

    pub fn attribute(&self, node: MemNode, name: &str) -> Option<String> {
        self.arena.borrow().slot(node).attributes.get(name).cloned()
    }

    pub fn property(&self, node: MemNode, name: &str) -> Option<PropValue> {
        self.arena.borrow().slot(node).properties.get(name).cloned()
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: MemNode) -> String {
        let mut out = String::new();
        self.arena.borrow().write_text(node, &mut out);
        out
    }

    /// Serialize `node` and its descendants. Comments are included, so
    /// markers show up in the output.
    pub fn to_html(&self, node: MemNode) -> String {
        let mut out = String::new();
        self.arena.borrow().write_html(node, &mut out);
        out
    }

    /// Serialize only the children of `node`.
    pub fn inner_html(&self, node: MemNode) -> String {
        let arena = self.arena.borrow();
        let mut out = String::new();
        for child in &arena.slot(node).children {
            arena.write_html(*child, &mut out);
        }
        out
    }

    /// Invoke every handler registered for `event` on `node`. Returns how
    /// many ran.
    pub fn dispatch_event(&self, node: MemNode, event: &str) -> usize {
        let handlers: Vec<EventHandler> = self
            .arena
            .borrow()
            .slot(node)
            .listeners
            .iter()
            .filter(|(_, name, _)| name == event)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    pub fn listener_count(&self, node: MemNode) -> usize {
        self.arena.borrow().slot(node).listeners.len()
    }

    pub fn stats(&self) -> TreeStats {
        self.arena.borrow().stats
    }

    pub fn reset_stats(&self) {
        self.arena.borrow_mut().stats = TreeStats::default();
    }
}

impl fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.borrow();
        f.debug_struct("MemoryTree")
            .field("nodes", &arena.slots.len())
            .field("stats", &arena.stats)
            .finish()
    }
}

impl TreeAdapter for MemoryTree {
    type Node = MemNode;

    fn create_element(&self, tag: &str) -> MemNode {
        self.arena.borrow_mut().create(MemNodeKind::Element(tag.to_string()))
    }

    fn create_text(&self, text: &str) -> MemNode {
        self.arena.borrow_mut().create(MemNodeKind::Text(text.to_string()))
    }

    fn create_comment(&self, text: &str) -> MemNode {
        self.arena.borrow_mut().create(MemNodeKind::Comment(text.to_string()))
    }

    fn create_fragment(&self) -> MemNode {
        self.arena.borrow_mut().create(MemNodeKind::Fragment)
    }

    fn insert(&self, parent: &MemNode, node: &MemNode, before: Option<&MemNode>) {
        let mut arena = self.arena.borrow_mut();
        if arena.slot(*node).kind == MemNodeKind::Fragment {
            let children = std::mem::take(&mut arena.slot_mut(*node).children);
            for child in children {
                arena.slot_mut(child).parent = None;
                arena.attach(*parent, child, before.copied());
            }
        } else {
            arena.attach(*parent, *node, before.copied());
        }
    }

    fn remove(&self, node: &MemNode) {
        let mut arena = self.arena.borrow_mut();
        if arena.detach(*node) {
            arena.stats.removed += 1;
        }
    }

    fn set_attribute(&self, node: &MemNode, name: &str, value: &str) {
        self.arena
            .borrow_mut()
            .slot_mut(*node)
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    fn set_property(&self, node: &MemNode, name: &str, value: PropValue) {
        let mut arena = self.arena.borrow_mut();
        let slot = arena.slot_mut(*node);
        if name == "textContent" {
            if let MemNodeKind::Text(text) = &mut slot.kind {
                *text = value.to_string();
                return;
            }
        }
        match value {
            PropValue::Unset => {
                slot.properties.shift_remove(name);
            }
            value => {
                slot.properties.insert(name.to_string(), value);
            }
        }
    }

    fn add_event_listener(
        &self,
        node: &MemNode,
        event: &str,
        handler: EventHandler,
    ) -> Option<ListenerRemover> {
        let id = {
            let mut arena = self.arena.borrow_mut();
            arena.next_listener += 1;
            let id = arena.next_listener;
            arena
                .slot_mut(*node)
                .listeners
                .push((id, event.to_string(), handler));
            id
        };
        let arena = Rc::downgrade(&self.arena);
        let node = *node;
        Some(Box::new(move || {
            if let Some(arena) = arena.upgrade() {
                arena
                    .borrow_mut()
                    .slot_mut(node)
                    .listeners
                    .retain(|(existing, _, _)| *existing != id);
            }
        }))
    }

    fn parent_of(&self, node: &MemNode) -> Option<MemNode> {
        self.arena.borrow().slot(*node).parent
    }

    fn clear_children(&self, node: &MemNode) {
        let mut arena = self.arena.borrow_mut();
        let children = std::mem::take(&mut arena.slot_mut(*node).children);
        arena.stats.removed += children.len();
        for child in children {
            arena.slot_mut(child).parent = None;
        }
    }
}
