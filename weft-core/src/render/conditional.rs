//! Conditional rendering.
//!
//! A [`Conditional`] shows one of two branches depending on a boolean
//! reactive value. Branch nodes sit directly before a placeholder comment,
//! which marks the region even while a branch renders nothing.
//!
//! Each rendered branch gets its own owner, a child of the conditional's
//! owner. Switching branches destroys the old owner (detaching everything
//! the branch bound) and removes its nodes before rendering the new branch.
//! A value that keeps the same truthiness does nothing.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::debug;

use super::adapter::TreeAdapter;
use super::{Renderer, WeakRenderer};
use crate::error::{BoxError, Result};
use crate::lifecycle::{Destructor, OwnerId, Teardown};
use crate::reactive::Reactive;

/// Which branch a [`Conditional`] is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    /// Nothing rendered yet, or the last render failed.
    Pending,
    True,
    False,
    Destroyed,
}

impl BranchState {
    fn shows(self, value: bool) -> bool {
        matches!(
            (self, value),
            (BranchState::True, true) | (BranchState::False, false)
        )
    }
}

type BranchFn<N> = Rc<dyn Fn(OwnerId) -> Result<Vec<N>>>;

struct ConditionalInner<A: TreeAdapter> {
    renderer: WeakRenderer<A>,
    owner: OwnerId,
    container: A::Node,
    placeholder: A::Node,
    state: BranchState,
    branch: Option<OwnerId>,
    nodes: Vec<A::Node>,
    on_true: BranchFn<A::Node>,
    on_false: BranchFn<A::Node>,
}

/// Handle to a conditional region.
pub struct Conditional<A: TreeAdapter> {
    owner: OwnerId,
    inner: Rc<RefCell<ConditionalInner<A>>>,
}

impl<A: TreeAdapter> Conditional<A> {
    /// Render the branch matching `condition` before `placeholder` and keep
    /// it in sync.
    ///
    /// `placeholder` must already be in the tree, normally as a child of
    /// `container`. Branch functions receive the branch owner and return the
    /// nodes to insert.
    pub fn new<T, F>(
        renderer: &Renderer<A>,
        parent: OwnerId,
        condition: impl Into<Reactive<bool>>,
        container: A::Node,
        placeholder: A::Node,
        on_true: T,
        on_false: F,
    ) -> Result<Self>
    where
        T: Fn(OwnerId) -> Result<Vec<A::Node>> + 'static,
        F: Fn(OwnerId) -> Result<Vec<A::Node>> + 'static,
    {
        let runtime = renderer.runtime();
        let owner = OwnerId::new();
        let inner = Rc::new(RefCell::new(ConditionalInner {
            renderer: renderer.downgrade(),
            owner,
            container,
            placeholder,
            state: BranchState::Pending,
            branch: None,
            nodes: Vec::new(),
            on_true: Rc::new(on_true),
            on_false: Rc::new(on_false),
        }));

        // Registered before joining the tree so it runs before the branch
        // owner is destroyed as a child.
        runtime.register_destructor(owner, [Self::teardown(inner.clone())]);
        if let Err(err) = runtime.add_to_tree(Some(parent), owner, "conditional") {
            runtime.destroy_sync(owner);
            return Err(err);
        }

        let condition = condition.into();
        if let Err(err) = Self::apply(&inner, condition.get_untracked()) {
            runtime.destroy_sync(owner);
            return Err(err);
        }
        if !condition.is_const() {
            let weak = Rc::downgrade(&inner);
            let subscription = runtime.try_subscribe(condition, move |value: &bool| {
                match weak.upgrade() {
                    Some(inner) => Self::apply(&inner, *value).map_err(BoxError::from),
                    None => Ok(()),
                }
            });
            runtime.register_destructor(owner, [subscription.into_destructor()]);
        }

        Ok(Self { owner, inner })
    }

    fn apply(inner: &Rc<RefCell<ConditionalInner<A>>>, value: bool) -> Result<()> {
        let (renderer, owner, previous, render) = {
            let mut state = inner.borrow_mut();
            if state.state == BranchState::Destroyed || state.state.shows(value) {
                return Ok(());
            }
            let Some(renderer) = state.renderer.upgrade() else {
                return Ok(());
            };
            let previous = state.branch.take().map(|branch| (branch, mem::take(&mut state.nodes)));
            let render = if value {
                state.on_true.clone()
            } else {
                state.on_false.clone()
            };
            state.state = BranchState::Pending;
            (renderer, state.owner, previous, render)
        };
        let runtime = renderer.runtime();
        let adapter = renderer.adapter();

        if let Some((branch, nodes)) = previous {
            runtime.destroy_sync(branch);
            for node in &nodes {
                adapter.remove(node);
            }
        }

        debug!(%owner, branch = value, "rendering conditional branch");
        let label = if value { "branch-true" } else { "branch-false" };
        let branch = runtime.child_owner(Some(owner), label)?;
        let nodes = match render(branch) {
            Ok(nodes) => nodes,
            Err(err) => {
                runtime.destroy_sync(branch);
                return Err(err);
            }
        };

        let mut state = inner.borrow_mut();
        if state.state == BranchState::Destroyed {
            drop(state);
            runtime.destroy_sync(branch);
            return Ok(());
        }
        let parent = adapter
            .parent_of(&state.placeholder)
            .unwrap_or_else(|| state.container.clone());
        for node in &nodes {
            adapter.insert(&parent, node, Some(&state.placeholder));
        }
        state.branch = Some(branch);
        state.nodes = nodes;
        state.state = if value {
            BranchState::True
        } else {
            BranchState::False
        };
        Ok(())
    }

    fn teardown(inner: Rc<RefCell<ConditionalInner<A>>>) -> Destructor {
        Destructor::deferred(move || {
            let (renderer, branch, nodes, placeholder) = {
                let mut state = inner.borrow_mut();
                state.state = BranchState::Destroyed;
                (
                    state.renderer.upgrade(),
                    state.branch.take(),
                    mem::take(&mut state.nodes),
                    state.placeholder.clone(),
                )
            };
            let Some(renderer) = renderer else {
                return Teardown::ready();
            };
            let teardown = match branch {
                Some(branch) => renderer.runtime().destroy(branch),
                None => Teardown::ready(),
            };
            let adapter = renderer.adapter();
            for node in &nodes {
                adapter.remove(node);
            }
            adapter.remove(&placeholder);
            teardown
        })
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn state(&self) -> BranchState {
        self.inner.borrow().state
    }

    /// Owner of the branch currently shown.
    pub fn branch_owner(&self) -> Option<OwnerId> {
        self.inner.borrow().branch
    }

    pub fn placeholder(&self) -> A::Node {
        self.inner.borrow().placeholder.clone()
    }

    /// Destroy the conditional, its branch, and its nodes.
    pub fn destroy(&self) -> Teardown {
        let renderer = self.inner.borrow().renderer.upgrade();
        match renderer {
            Some(renderer) => renderer.runtime().destroy(self.owner),
            None => Teardown::ready(),
        }
    }
}

impl<A: TreeAdapter> fmt::Debug for Conditional<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditional")
            .field("owner", &self.owner)
            .field("state", &self.state())
            .finish()
    }
}

impl<A: TreeAdapter> Renderer<A> {
    /// Append a placeholder to `container` and render a [`Conditional`]
    /// before it.
    pub fn show<T, F>(
        &self,
        parent: OwnerId,
        container: &A::Node,
        condition: impl Into<Reactive<bool>>,
        on_true: T,
        on_false: F,
    ) -> Result<Conditional<A>>
    where
        T: Fn(OwnerId) -> Result<Vec<A::Node>> + 'static,
        F: Fn(OwnerId) -> Result<Vec<A::Node>> + 'static,
    {
        let placeholder = self.adapter.create_comment("if");
        self.adapter.insert(container, &placeholder, None);
        Conditional::new(self, parent, condition, container.clone(), placeholder, on_true, on_false)
    }
}
