//! Keyed list rendering.
//!
//! A [`KeyedList`] renders one row per item of a reactive array and keeps
//! the rows in step with the array, matching rows to items by key. A row
//! whose key survives an update keeps its owner and its nodes; it is moved,
//! never re-rendered.
//!
//! # Algorithm
//!
//! On every change of the array:
//!
//! 1. Resolve each item's key. When two items share a key the later one
//!    wins, and the earlier is dropped from the render.
//! 2. Rows whose key is gone are destroyed. Their nodes are removed right
//!    away in [`TeardownMode::Blocking`], or once their owner's teardown
//!    completes in [`TeardownMode::Deferred`].
//! 3. Surviving rows' indexes are shifted down past each removed index,
//!    highest removed index first.
//! 4. The new array is walked in order. Rows at a new index are queued for a
//!    move and their index cell is updated. Keys without a row are rendered.
//! 5. Queued and new rows are placed walking backwards from the bottom
//!    marker, each inserted before the first node of the row after it. Rows
//!    that did not move keep their nodes untouched.
//!
//! A list that has no surviving rows renders all of its rows into one
//! fragment and inserts that in a single operation.
//!
//! Step 4 runs inside a flush, so a moved row's index cell is written during
//! the flush and its subscribers see the new index one turn later.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::adapter::TreeAdapter;
use super::{Renderer, WeakRenderer};
use crate::error::{BoxError, Error, Result};
use crate::lifecycle::{Destructor, OwnerId, Teardown};
use crate::reactive::{Cell, Reactive};

/// How removed rows leave the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeardownMode {
    /// Remove row nodes as soon as the row is destroyed.
    #[default]
    Blocking,
    /// Keep row nodes until the row owner's teardown completes, so deferred
    /// destructors (exit animations, for example) can still see them.
    Deferred,
}

/// Key rows by the address of a shared item.
pub fn by_identity<U: ?Sized>() -> impl Fn(&Rc<U>) -> Option<usize> + 'static {
    |item: &Rc<U>| Some(Rc::as_ptr(item).cast::<()>() as usize)
}

/// Key rows by the item value itself.
///
/// Equal values collapse into one row, so debug builds log a warning the
/// first time it is used.
pub fn by_value<T: Clone + 'static>() -> impl Fn(&T) -> Option<T> + 'static {
    let warned = std::cell::Cell::new(!cfg!(debug_assertions));
    move |item: &T| {
        if !warned.replace(true) {
            warn!("list rows keyed by value; duplicate values render once");
        }
        Some(item.clone())
    }
}

type KeyFn<T, K> = Rc<dyn Fn(&T) -> Option<K>>;
type RowFn<T, N> = Rc<dyn Fn(&T, &Cell<usize>, OwnerId) -> Result<Vec<N>>>;

struct Row<T: 'static, N> {
    owner: OwnerId,
    item: T,
    nodes: Vec<N>,
    index: usize,
    index_cell: Cell<usize>,
}

struct ListInner<A: TreeAdapter, T: 'static, K> {
    renderer: WeakRenderer<A>,
    owner: OwnerId,
    container: A::Node,
    bottom: A::Node,
    mode: TeardownMode,
    rows: IndexMap<K, Row<T, A::Node>>,
    key_of: KeyFn<T, K>,
    render: RowFn<T, A::Node>,
    /// Node removals waiting on a deferred row teardown.
    pending: Vec<Teardown>,
    destroyed: bool,
}

/// Handle to a keyed list region.
pub struct KeyedList<A: TreeAdapter, T: 'static, K: 'static> {
    owner: OwnerId,
    inner: Rc<RefCell<ListInner<A, T, K>>>,
}

impl<A, T, K> KeyedList<A, T, K>
where
    A: TreeAdapter,
    T: Clone + 'static,
    K: Hash + Eq + Clone + fmt::Debug + 'static,
{
    /// Render `items` into `container` and keep the rows in sync.
    ///
    /// Rows are placed before `anchor`, or at the end of `container`. `key`
    /// must return a key for every item; `render` receives the item, a cell
    /// tracking the row's index, and the row owner.
    ///
    /// Index cells are updated while the list reconciles, which happens
    /// inside a flush. Anything bound to a row's index therefore catches up
    /// in the next turn, not the one that moved the row.
    #[allow(clippy::too_many_arguments)]
    pub fn new<KF, RF>(
        renderer: &Renderer<A>,
        parent: OwnerId,
        container: A::Node,
        anchor: Option<&A::Node>,
        items: impl Into<Reactive<Vec<T>>>,
        key: KF,
        render: RF,
        mode: TeardownMode,
    ) -> Result<Self>
    where
        KF: Fn(&T) -> Option<K> + 'static,
        RF: Fn(&T, &Cell<usize>, OwnerId) -> Result<Vec<A::Node>> + 'static,
    {
        let runtime = renderer.runtime();
        let adapter = renderer.adapter();
        let owner = OwnerId::new();

        let bottom = adapter.create_comment("list");
        let parent_node = anchor
            .and_then(|anchor| adapter.parent_of(anchor))
            .unwrap_or_else(|| container.clone());
        adapter.insert(&parent_node, &bottom, anchor);

        let inner = Rc::new(RefCell::new(ListInner {
            renderer: renderer.downgrade(),
            owner,
            container,
            bottom,
            mode,
            rows: IndexMap::new(),
            key_of: Rc::new(key),
            render: Rc::new(render),
            pending: Vec::new(),
            destroyed: false,
        }));

        // Registered before joining the tree so rows are torn down by the
        // list itself, in row order, before the tree sweeps the owners.
        runtime.register_destructor(owner, [Self::teardown(inner.clone())]);
        if let Err(err) = runtime.add_to_tree(Some(parent), owner, "list") {
            runtime.destroy_sync(owner);
            return Err(err);
        }

        let items = items.into();
        if let Err(err) = Self::reconcile(&inner, &items.get_untracked()) {
            runtime.destroy_sync(owner);
            return Err(err);
        }
        if !items.is_const() {
            let weak = Rc::downgrade(&inner);
            let subscription =
                runtime.try_subscribe(items, move |items: &Vec<T>| match weak.upgrade() {
                    Some(inner) => Self::reconcile(&inner, items).map_err(BoxError::from),
                    None => Ok(()),
                });
            runtime.register_destructor(owner, [subscription.into_destructor()]);
        }

        Ok(Self { owner, inner })
    }

    fn reconcile(inner: &Rc<RefCell<ListInner<A, T, K>>>, items: &[T]) -> Result<()> {
        let (renderer, key_of, render, mode, list_owner, dev_mode) = {
            let state = inner.borrow();
            if state.destroyed {
                return Ok(());
            }
            let Some(renderer) = state.renderer.upgrade() else {
                return Ok(());
            };
            let dev_mode = renderer.runtime().config().dev_mode;
            (
                renderer,
                state.key_of.clone(),
                state.render.clone(),
                state.mode,
                state.owner,
                dev_mode,
            )
        };
        let runtime = renderer.runtime();
        let adapter = renderer.adapter();

        // 1. keys, last write wins
        let mut winners: HashMap<K, usize> = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key = key_of(item).ok_or(Error::KeyUnresolved { index })?;
            if let Some(previous) = winners.insert(key.clone(), index) {
                if dev_mode {
                    warn!(
                        owner = %list_owner,
                        ?key,
                        previous,
                        index,
                        "duplicate list key; later item wins"
                    );
                }
            }
        }
        let mut order: Vec<(K, usize)> = winners
            .iter()
            .map(|(key, index)| (key.clone(), *index))
            .collect();
        order.sort_unstable_by_key(|(_, index)| *index);

        // 2-3. remove rows whose key is gone, then close the gaps
        let removed: Vec<Row<T, A::Node>> = {
            let mut state = inner.borrow_mut();
            let gone: Vec<K> = state
                .rows
                .keys()
                .filter(|key| !winners.contains_key(*key))
                .cloned()
                .collect();
            let removed: Vec<Row<T, A::Node>> = gone
                .iter()
                .filter_map(|key| state.rows.shift_remove(key))
                .collect();
            let mut gaps: Vec<usize> = removed.iter().map(|row| row.index).collect();
            gaps.sort_unstable_by(|a, b| b.cmp(a));
            for gap in gaps {
                for row in state.rows.values_mut() {
                    if row.index > gap {
                        row.index -= 1;
                    }
                }
            }
            removed
        };
        let removed_count = removed.len();
        for row in removed {
            let teardown = runtime.destroy(row.owner);
            match mode {
                TeardownMode::Blocking => {
                    for node in &row.nodes {
                        adapter.remove(node);
                    }
                }
                TeardownMode::Deferred => {
                    let removal = Self::remove_after(adapter.clone(), teardown, row.nodes);
                    if !removal.try_complete() {
                        inner.borrow_mut().pending.push(removal.clone());
                        runtime.track_teardown(removal);
                    }
                }
            }
        }

        // 4. walk the new array
        let mut moved: HashSet<K> = HashSet::new();
        let mut fresh: HashMap<K, Row<T, A::Node>> = HashMap::new();
        for (position, (key, item_index)) in order.iter().enumerate() {
            let existing = {
                let mut state = inner.borrow_mut();
                state.rows.get_mut(key).map(|row| {
                    if row.index == position {
                        None
                    } else {
                        row.index = position;
                        Some(row.index_cell.clone())
                    }
                })
            };
            match existing {
                Some(Some(index_cell)) => {
                    // Lands in the next turn; this runs inside the flush.
                    index_cell.set(position);
                    moved.insert(key.clone());
                }
                Some(None) => {}
                None => {
                    let item = items[*item_index].clone();
                    match Self::render_row(&renderer, list_owner, &render, item, position) {
                        Ok(row) => {
                            fresh.insert(key.clone(), row);
                        }
                        Err(err) => {
                            for row in fresh.into_values() {
                                runtime.destroy_sync(row.owner);
                            }
                            return Err(err);
                        }
                    }
                }
            }
        }

        // 5. commit the new order and place rows
        let mut state = inner.borrow_mut();
        let survivors = state.rows.len();
        let mut previous = mem::take(&mut state.rows);
        let mut place: Vec<bool> = Vec::with_capacity(order.len());
        for (key, _) in &order {
            if let Some(row) = fresh.remove(key) {
                state.rows.insert(key.clone(), row);
                place.push(true);
            } else if let Some(row) = previous.swap_remove(key) {
                state.rows.insert(key.clone(), row);
                place.push(moved.contains(key));
            }
        }

        let parent = adapter
            .parent_of(&state.bottom)
            .unwrap_or_else(|| state.container.clone());
        if survivors == 0 && !state.rows.is_empty() {
            let fragment = adapter.create_fragment();
            for row in state.rows.values() {
                for node in &row.nodes {
                    adapter.insert(&fragment, node, None);
                }
            }
            adapter.insert(&parent, &fragment, Some(&state.bottom));
        } else {
            let mut anchor = state.bottom.clone();
            for (row, place) in state.rows.values().zip(place).rev() {
                if place {
                    for node in &row.nodes {
                        adapter.insert(&parent, node, Some(&anchor));
                    }
                }
                if let Some(first) = row.nodes.first() {
                    anchor = first.clone();
                }
            }
        }
        state.pending.retain(|removal| !removal.is_complete());

        debug!(
            owner = %list_owner,
            rows = state.rows.len(),
            removed = removed_count,
            moved = moved.len(),
            "list reconciled"
        );
        Ok(())
    }

    fn render_row(
        renderer: &Renderer<A>,
        list_owner: OwnerId,
        render: &RowFn<T, A::Node>,
        item: T,
        index: usize,
    ) -> Result<Row<T, A::Node>> {
        let runtime = renderer.runtime();
        let owner = runtime.child_owner(Some(list_owner), "list-row")?;
        let index_cell = runtime.cell_with_label(index, "row-index");
        runtime.on_destroy(owner, {
            let index_cell = index_cell.clone();
            move || index_cell.release()
        });
        match render(&item, &index_cell, owner) {
            Ok(nodes) => Ok(Row {
                owner,
                item,
                nodes,
                index,
                index_cell,
            }),
            Err(err) => {
                runtime.destroy_sync(owner);
                Err(err)
            }
        }
    }

    /// A teardown that removes `nodes` once `teardown` completes.
    fn remove_after(adapter: Rc<A>, teardown: Teardown, nodes: Vec<A::Node>) -> Teardown {
        Teardown::from_future(async move {
            teardown.await;
            for node in &nodes {
                adapter.remove(node);
            }
        })
    }

    fn teardown(inner: Rc<RefCell<ListInner<A, T, K>>>) -> Destructor {
        Destructor::deferred(move || {
            let (renderer, rows, pending, bottom, mode) = {
                let mut state = inner.borrow_mut();
                state.destroyed = true;
                (
                    state.renderer.upgrade(),
                    mem::take(&mut state.rows),
                    mem::take(&mut state.pending),
                    state.bottom.clone(),
                    state.mode,
                )
            };
            let Some(renderer) = renderer else {
                return Teardown::ready();
            };
            let runtime = renderer.runtime();
            let adapter = renderer.adapter();

            let mut waits = pending;
            for (_, row) in rows {
                let teardown = runtime.destroy(row.owner);
                match mode {
                    TeardownMode::Blocking => {
                        for node in &row.nodes {
                            adapter.remove(node);
                        }
                        waits.push(teardown);
                    }
                    TeardownMode::Deferred => {
                        waits.push(Self::remove_after(adapter.clone(), teardown, row.nodes));
                    }
                }
            }
            adapter.remove(&bottom);
            Teardown::all(waits)
        })
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn mode(&self) -> TeardownMode {
        self.inner.borrow().mode
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().rows.is_empty()
    }

    /// Keys of the current rows, in display order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.borrow().rows.keys().cloned().collect()
    }

    /// Items of the current rows, in display order.
    pub fn items(&self) -> Vec<T> {
        self.inner
            .borrow()
            .rows
            .values()
            .map(|row| row.item.clone())
            .collect()
    }

    pub fn row_owner(&self, key: &K) -> Option<OwnerId> {
        self.inner.borrow().rows.get(key).map(|row| row.owner)
    }

    pub fn row_nodes(&self, key: &K) -> Option<Vec<A::Node>> {
        self.inner.borrow().rows.get(key).map(|row| row.nodes.clone())
    }

    pub fn row_index(&self, key: &K) -> Option<usize> {
        self.inner.borrow().rows.get(key).map(|row| row.index)
    }

    /// Removed rows whose nodes are still waiting on their teardown.
    pub fn pending_removals(&self) -> usize {
        self.inner
            .borrow()
            .pending
            .iter()
            .filter(|removal| !removal.is_complete())
            .count()
    }

    pub fn bottom_marker(&self) -> A::Node {
        self.inner.borrow().bottom.clone()
    }

    /// Destroy the list and every row.
    pub fn destroy(&self) -> Teardown {
        let renderer = self.inner.borrow().renderer.upgrade();
        match renderer {
            Some(renderer) => renderer.runtime().destroy(self.owner),
            None => Teardown::ready(),
        }
    }
}

impl<A: TreeAdapter, T: 'static, K: 'static> fmt::Debug for KeyedList<A, T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("KeyedList")
            .field("owner", &self.owner)
            .field("rows", &state.rows.len())
            .field("mode", &state.mode)
            .finish()
    }
}

impl<A: TreeAdapter> Renderer<A> {
    /// Append a keyed list to `container` that removes rows immediately.
    pub fn each<T, K, KF, RF>(
        &self,
        parent: OwnerId,
        container: &A::Node,
        items: impl Into<Reactive<Vec<T>>>,
        key: KF,
        render: RF,
    ) -> Result<KeyedList<A, T, K>>
    where
        T: Clone + 'static,
        K: Hash + Eq + Clone + fmt::Debug + 'static,
        KF: Fn(&T) -> Option<K> + 'static,
        RF: Fn(&T, &Cell<usize>, OwnerId) -> Result<Vec<A::Node>> + 'static,
    {
        KeyedList::new(
            self,
            parent,
            container.clone(),
            None,
            items,
            key,
            render,
            TeardownMode::Blocking,
        )
    }

    /// Append a keyed list whose removed rows stay until their teardown
    /// completes.
    pub fn each_async<T, K, KF, RF>(
        &self,
        parent: OwnerId,
        container: &A::Node,
        items: impl Into<Reactive<Vec<T>>>,
        key: KF,
        render: RF,
    ) -> Result<KeyedList<A, T, K>>
    where
        T: Clone + 'static,
        K: Hash + Eq + Clone + fmt::Debug + 'static,
        KF: Fn(&T) -> Option<K> + 'static,
        RF: Fn(&T, &Cell<usize>, OwnerId) -> Result<Vec<A::Node>> + 'static,
    {
        KeyedList::new(
            self,
            parent,
            container.clone(),
            None,
            items,
            key,
            render,
            TeardownMode::Deferred,
        )
    }
}
