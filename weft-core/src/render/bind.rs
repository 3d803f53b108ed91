//! Node bindings: text, attributes, properties, and events.
//!
//! Static values are written once. Reactive values are written once now and
//! again on every flush that touches them, through a subscriber owned by the
//! given owner.

use std::rc::Rc;

use super::adapter::{PropValue, TreeAdapter};
use super::Renderer;
use crate::error::{BoxError, Result};
use crate::lifecycle::OwnerId;
use crate::reactive::Bindable;

impl<A: TreeAdapter> Renderer<A> {
    /// Create a text node showing `value`.
    pub fn text(&self, owner: OwnerId, value: impl Into<Bindable<String>>) -> Result<A::Node> {
        let node = self.adapter.create_text("");
        self.bind_text(owner, &node, value)?;
        Ok(node)
    }

    pub fn bind_text(
        &self,
        owner: OwnerId,
        node: &A::Node,
        value: impl Into<Bindable<String>>,
    ) -> Result<()> {
        self.bind_with(owner, node, value.into(), |adapter, node, text: &String| {
            adapter.set_property(node, "textContent", PropValue::Text(text.clone()));
        })
    }

    pub fn bind_attribute(
        &self,
        owner: OwnerId,
        node: &A::Node,
        name: &str,
        value: impl Into<Bindable<String>>,
    ) -> Result<()> {
        let name = name.to_string();
        self.bind_with(owner, node, value.into(), move |adapter, node, text: &String| {
            adapter.set_attribute(node, &name, text);
        })
    }

    pub fn bind_property(
        &self,
        owner: OwnerId,
        node: &A::Node,
        name: &str,
        value: impl Into<Bindable<PropValue>>,
    ) -> Result<()> {
        let name = name.to_string();
        self.bind_with(owner, node, value.into(), move |adapter, node, prop: &PropValue| {
            adapter.set_property(node, &name, prop.clone());
        })
    }

    /// Attach an event handler for the lifetime of `owner`.
    pub fn on(&self, owner: OwnerId, node: &A::Node, event: &str, handler: impl Fn() + 'static) {
        if let Some(remove) = self.adapter.add_event_listener(node, event, Rc::new(handler)) {
            self.runtime.on_destroy(owner, remove);
        }
    }

    fn bind_with<T, F>(
        &self,
        owner: OwnerId,
        node: &A::Node,
        value: Bindable<T>,
        apply: F,
    ) -> Result<()>
    where
        T: Clone + 'static,
        F: Fn(&A, &A::Node, &T) + 'static,
    {
        match value {
            Bindable::Static(value) => {
                apply(&self.adapter, node, &value);
                Ok(())
            }
            Bindable::Dynamic(value) => {
                let adapter = self.adapter.clone();
                let node = node.clone();
                self.runtime.bind(owner, value, move |current: &T| {
                    apply(&adapter, &node, current);
                    Ok::<(), BoxError>(())
                })?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MemoryTree;
    use crate::reactive::Runtime;
    use std::cell::Cell as StdCell;

    fn setup() -> (Runtime, Renderer<MemoryTree>, Rc<MemoryTree>) {
        let runtime = Runtime::new();
        let renderer = Renderer::new(runtime.clone(), MemoryTree::new());
        let tree = renderer.adapter().clone();
        (runtime, renderer, tree)
    }

    #[test]
    fn static_text_is_written_once() {
        let (runtime, renderer, tree) = setup();
        let owner = OwnerId::new();
        let node = renderer.text(owner, "fixed").unwrap();
        assert_eq!(tree.text_content(node), "fixed");
        assert_eq!(runtime.destructor_count(owner), 0);
    }

    #[test]
    fn reactive_text_follows_the_cell() {
        let (runtime, renderer, tree) = setup();
        let owner = OwnerId::new();
        let name = runtime.cell("Ada".to_string());
        let greeting = runtime.formula({
            let name = name.clone();
            move || format!("Hello, {}!", name.get())
        });

        let node = renderer.text(owner, &greeting).unwrap();
        assert_eq!(tree.text_content(node), "Hello, Ada!");

        name.set("Grace".to_string());
        runtime.flush();
        assert_eq!(tree.text_content(node), "Hello, Grace!");

        runtime.destroy_sync(owner);
        name.set("Linus".to_string());
        runtime.flush();
        assert_eq!(tree.text_content(node), "Hello, Grace!");
    }

    #[test]
    fn attributes_and_properties_update() {
        let (runtime, renderer, tree) = setup();
        let owner = OwnerId::new();
        let input = renderer.element("input");
        let class = runtime.cell("idle".to_string());
        let checked = runtime.cell(PropValue::Bool(false));

        renderer.bind_attribute(owner, &input, "class", &class).unwrap();
        renderer.bind_property(owner, &input, "checked", &checked).unwrap();
        assert_eq!(tree.attribute(input, "class").as_deref(), Some("idle"));

        class.set("busy".to_string());
        checked.set(PropValue::Bool(true));
        runtime.flush();
        assert_eq!(tree.attribute(input, "class").as_deref(), Some("busy"));
        assert_eq!(tree.property(input, "checked"), Some(PropValue::Bool(true)));
    }

    #[test]
    fn listeners_are_removed_with_their_owner() {
        let (runtime, renderer, tree) = setup();
        let owner = OwnerId::new();
        let button = renderer.element("button");
        let clicks = Rc::new(StdCell::new(0));

        renderer.on(owner, &button, "click", {
            let clicks = clicks.clone();
            move || clicks.set(clicks.get() + 1)
        });
        tree.dispatch_event(button, "click");
        assert_eq!(clicks.get(), 1);

        runtime.destroy_sync(owner);
        assert_eq!(tree.listener_count(button), 0);
    }
}
