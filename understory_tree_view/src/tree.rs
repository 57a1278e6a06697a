// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tree façade: one hierarchy, one state manager, and the subscriber bus.

use std::rc::Rc;

use serde_json::Value;

use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::events::{EventKinds, Listeners, SubscriptionId, TreeEvent};
use crate::hierarchy::Hierarchy;
use crate::load::{ChildrenProvider, LoadOutcome, PendingLoad};
use crate::rows::{RowWindow, ScrollAlign};
use crate::snapshot::{StateError, TreeStateSnapshot};
use crate::state::{StashFlags, StateEvent, TreeStateManager};
use crate::types::{Metadata, NodeId, NodeKind};

/// A virtualized tree bound to one children provider.
///
/// Every mutating method drains the engine's event queue before returning:
/// the state manager observes each event first, then subscribers registered
/// with [`Tree::subscribe`] receive the ones matching their filter.
///
/// Async methods borrow the tree mutably for their whole duration. Hosts that
/// need to release the tree while a provider call is in flight use the
/// two-phase forms ([`Tree::begin_load`] / [`Tree::complete_load`] and
/// [`Tree::request_expand`] / [`Tree::finish_expand`]).
#[derive(Debug)]
pub struct Tree {
    hierarchy: Hierarchy,
    state: TreeStateManager,
    listeners: Listeners<TreeEvent>,
}

impl Tree {
    /// Creates a tree whose root is an unloaded, expanded composite.
    pub fn new(provider: impl ChildrenProvider + 'static, config: TreeConfig) -> Self {
        Self {
            hierarchy: Hierarchy::new(Rc::new(provider), &config),
            state: TreeStateManager::new(),
            listeners: Listeners::default(),
        }
    }

    /// Read access to nodes and rows.
    #[must_use]
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Read access to the expansion and scroll state.
    #[must_use]
    pub fn state(&self) -> &TreeStateManager {
        &self.state
    }

    /// The root composite node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.hierarchy.root()
    }

    fn flush(&mut self) {
        while let Some(event) = self.hierarchy.events.pop() {
            self.state.observe(&self.hierarchy, &event);
            self.listeners.emit(&event);
        }
    }

    fn check_alive(&self, id: NodeId) -> Result<(), TreeError> {
        if self.hierarchy.is_alive(id) {
            Ok(())
        } else {
            Err(TreeError::StaleNode(id))
        }
    }

    // --- loading ---

    /// Materializes a composite's children if needed.
    ///
    /// Nodes created with [`Tree::create_node`] and not yet inserted fail with
    /// [`TreeError::Detached`].
    pub async fn ensure_loaded(&mut self, id: NodeId) -> Result<(), TreeError> {
        let result = self.hierarchy.ensure_loaded(id).await;
        self.flush();
        result
    }

    /// Starts (or joins) a provider call for `id` without awaiting it.
    ///
    /// Returns `None` if the children are already loaded.
    pub fn begin_load(&mut self, id: NodeId) -> Result<Option<PendingLoad>, TreeError> {
        self.hierarchy.begin_load(id)
    }

    /// Installs the outcome of a [`PendingLoad`].
    ///
    /// Returns `Ok(false)` if the result was stale and discarded.
    pub fn complete_load(&mut self, outcome: LoadOutcome) -> Result<bool, TreeError> {
        let result = self.hierarchy.complete_load(outcome);
        self.flush();
        result
    }

    /// Re-lists a loaded composite and reconciles its children.
    pub async fn reload(&mut self, id: NodeId) -> Result<(), TreeError> {
        let result = self.hierarchy.reload(id).await;
        self.flush();
        result
    }

    /// Resolves an absolute or root-relative path, loading composites on the
    /// way.
    pub async fn force_load_node_at_path(&mut self, target: &str) -> Result<NodeId, TreeError> {
        let result = self.hierarchy.force_load_node_at_path(target).await;
        self.flush();
        result
    }

    /// Resolves a path relative to `start`, loading composites on the way.
    pub async fn force_load_node_at_path_from(
        &mut self,
        start: NodeId,
        relative: &str,
    ) -> Result<NodeId, TreeError> {
        let result = self
            .hierarchy
            .force_load_node_at_path_from(start, relative)
            .await;
        self.flush();
        result
    }

    // --- expansion ---

    /// Expands a composite, loading its children first if needed.
    ///
    /// With `ensure_visible`, collapsed ancestors are expanded too (outermost
    /// first). Without it, the node expands in place and stays hidden behind
    /// any collapsed ancestor. A [`Tree::set_collapsed`] issued while the load
    /// is pending cancels the expansion.
    pub async fn set_expanded(&mut self, id: NodeId, ensure_visible: bool) -> Result<(), TreeError> {
        let result = self.hierarchy.set_expanded(id, ensure_visible).await;
        self.flush();
        result
    }

    /// Collapses a composite, or cancels its pending expansion.
    pub fn set_collapsed(&mut self, id: NodeId) -> Result<(), TreeError> {
        let result = self.hierarchy.set_collapsed(id);
        self.flush();
        result
    }

    /// First half of a split [`Tree::set_expanded`]: records the intent and
    /// returns the load to await, if any.
    pub fn request_expand(&mut self, id: NodeId) -> Result<Option<PendingLoad>, TreeError> {
        self.hierarchy.request_expand(id)
    }

    /// Second half of a split [`Tree::set_expanded`].
    ///
    /// Returns whether the node ended up expanded; `false` means the intent
    /// was cancelled while the load was pending.
    pub fn finish_expand(
        &mut self,
        id: NodeId,
        outcome: Option<LoadOutcome>,
        ensure_visible: bool,
    ) -> Result<bool, TreeError> {
        let result = self.hierarchy.finish_expand(id, outcome, ensure_visible);
        self.flush();
        result
    }

    // --- structure ---

    /// Creates a detached node for a later [`Tree::insert_item`].
    pub fn create_node(&mut self, kind: NodeKind, name: impl Into<String>, metadata: Metadata) -> NodeId {
        self.hierarchy.create_node(kind, name.into(), metadata)
    }

    /// Links a detached node under `parent` at its sorted position.
    ///
    /// Returns `Ok(false)` if `parent` is not loaded; the node is then
    /// disposed, since the parent's listing will supply it.
    ///
    /// # Panics
    ///
    /// Panics if `child` is the root, is already linked, or would become its
    /// own ancestor.
    pub fn insert_item(&mut self, parent: NodeId, child: NodeId) -> Result<bool, TreeError> {
        self.check_alive(child)?;
        self.hierarchy.branch_of(parent)?;
        let inserted = self.hierarchy.insert_item(parent, child);
        self.flush();
        Ok(inserted)
    }

    /// Unlinks a node and disposes its subtree.
    ///
    /// # Panics
    ///
    /// Panics if `child` is the root.
    pub fn unlink_item(&mut self, child: NodeId) -> Result<(), TreeError> {
        self.check_alive(child)?;
        self.hierarchy.unlink_item(child, false);
        self.flush();
        Ok(())
    }

    /// Reparents and/or renames a node; `None` as the parent disposes it.
    ///
    /// Moving into a composite whose children are not loaded also disposes
    /// the node, since that listing will supply it.
    ///
    /// # Panics
    ///
    /// Panics when moving the root, or moving a node into its own subtree.
    pub fn move_node(
        &mut self,
        id: NodeId,
        new_parent: Option<NodeId>,
        new_name: Option<&str>,
    ) -> Result<(), TreeError> {
        let result = self
            .hierarchy
            .move_node(id, new_parent, new_name.map(str::to_owned));
        self.flush();
        result
    }

    /// Sets a metadata value; an identical value is not reported.
    pub fn add_metadata(&mut self, id: NodeId, key: impl Into<String>, value: Value) -> Result<(), TreeError> {
        self.check_alive(id)?;
        self.hierarchy.add_metadata(id, key.into(), value);
        self.flush();
        Ok(())
    }

    /// Removes a metadata value; an absent key is not reported.
    pub fn remove_metadata(&mut self, id: NodeId, key: &str) -> Result<(), TreeError> {
        self.check_alive(id)?;
        self.hierarchy.remove_metadata(id, key);
        self.flush();
        Ok(())
    }

    // --- subscriptions ---

    /// Receives engine events whose kind intersects `kinds`.
    pub fn subscribe(
        &mut self,
        kinds: EventKinds,
        mut callback: impl FnMut(&TreeEvent) + 'static,
    ) -> SubscriptionId {
        self.listeners.add(Box::new(move |event: &TreeEvent| {
            if kinds.intersects(event.kind()) {
                callback(event);
            }
        }))
    }

    /// Removes a subscription made with [`Tree::subscribe`].
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    /// Receives every state-manager event.
    pub fn on_state_event(&mut self, callback: impl FnMut(&StateEvent) + 'static) -> SubscriptionId {
        self.state.subscribe(callback)
    }

    /// Called once per persisted-state change.
    pub fn on_change(&mut self, mut callback: impl FnMut() + 'static) -> SubscriptionId {
        self.state.subscribe(move |event| {
            if matches!(event, StateEvent::DidChange) {
                callback();
            }
        })
    }

    /// Removes a subscription made with [`Tree::on_state_event`] or
    /// [`Tree::on_change`].
    pub fn unsubscribe_state(&mut self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    // --- persisted state ---

    /// Captures the expansion and scroll state.
    #[must_use]
    pub fn snapshot(&self) -> TreeStateSnapshot {
        self.state.snapshot(&self.hierarchy)
    }

    /// Stores the scroll offset written into the next snapshot.
    pub fn save_scroll_offset(&mut self, offset: f64) {
        self.state.save_scroll_offset(offset);
    }

    /// Re-applies a saved snapshot.
    ///
    /// Buried paths are expanded in place so they stay behind their collapsed
    /// ancestor; surface paths are expanded with their ancestors revealed.
    /// Paths that no longer resolve are logged and skipped.
    pub async fn load_tree_state(&mut self, snapshot: &TreeStateSnapshot) {
        let dirs = &snapshot.expanded_directories;
        for rel in &dirs.buried {
            self.restore_expansion(rel, false).await;
        }
        for rel in &dirs.at_surface {
            self.restore_expansion(rel, true).await;
        }
        if let Some(offset) = snapshot.scroll_position
            && offset >= 0.0
        {
            self.state.save_scroll_offset(offset);
        }
    }

    /// Parses a state document and applies it with [`Tree::load_tree_state`].
    pub async fn load_tree_state_str(&mut self, text: &str) -> Result<(), StateError> {
        let snapshot: TreeStateSnapshot = text.parse()?;
        self.load_tree_state(&snapshot).await;
        Ok(())
    }

    async fn restore_expansion(&mut self, rel: &str, ensure_visible: bool) {
        let result = self.try_restore_expansion(rel, ensure_visible).await;
        self.flush();
        if let Err(err) = result {
            log::warn!("could not restore expansion of '{rel}': {err}");
        }
    }

    async fn try_restore_expansion(&mut self, rel: &str, ensure_visible: bool) -> Result<(), TreeError> {
        let node = self.hierarchy.force_load_node_at_path(rel).await?;
        self.hierarchy.set_expanded(node, ensure_visible).await
    }

    // --- stash ---

    /// Opens a stash window; expansion changes inside it become keyframes.
    ///
    /// Any previous stash is discarded.
    pub fn begin_stash(&mut self) {
        self.state.begin_stash();
    }

    /// Closes the stash window and commits its keyframes to the persisted
    /// state. The keyframes stay available to [`Tree::reverse_stash`].
    pub fn end_stash(&mut self) {
        self.state.end_stash(&self.hierarchy);
    }

    /// Keeps reversal away from `node` and its ancestors.
    pub fn exclude_from_stash(&mut self, node: NodeId) {
        self.state.exclude_from_stash(&self.hierarchy, node);
    }

    /// Drops the stash without reversing it.
    pub fn clear_stash(&mut self) {
        self.state.clear_stash();
    }

    /// Undoes the stashed expansion changes, newest first, skipping disabled
    /// keyframes and disposed nodes. The stash is consumed.
    pub async fn reverse_stash(&mut self) {
        if self.state.is_stashing() {
            self.end_stash();
        }
        for (node, flags) in self.state.take_reversal() {
            if !self.hierarchy.is_alive(node) {
                continue;
            }
            let result = if flags.contains(StashFlags::EXPANDED) {
                self.hierarchy.set_collapsed(node)
            } else {
                self.hierarchy.set_expanded(node, false).await
            };
            self.flush();
            if let Err(err) = result {
                log::warn!("could not reverse stashed change of {node}: {err}");
            }
        }
    }

    // --- viewport ---

    /// Rows to realize for `window` at the saved scroll offset.
    #[must_use]
    pub fn visible_rows(&self, window: &RowWindow) -> &[NodeId] {
        let range = window.visible_range(self.state.scroll_offset(), self.hierarchy.row_count());
        self.hierarchy.rows(range)
    }

    /// Scrolls so that `node`'s row is in view, saving the new offset.
    ///
    /// Returns `false` if `node` is not visible from the root.
    pub fn scroll_to_node(&mut self, window: &RowWindow, node: NodeId, align: ScrollAlign) -> bool {
        let Some(row) = self.hierarchy.row_of(node) else {
            return false;
        };
        let offset = window.offset_to_reveal(row, self.state.scroll_offset(), align);
        let offset = window.clamp_offset(offset, self.hierarchy.row_count());
        self.state.save_scroll_offset(offset);
        true
    }
}
