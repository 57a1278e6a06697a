// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flattened-branch indexing: expand, collapse, insert, unlink, row access.
//!
//! Every visible node sits in exactly one pre-order array, owned by its
//! nearest visibility boundary: the root, a collapsed ancestor, or (while it
//! is being moved) a detached ancestor. Composites between a node and its
//! boundary own no array; they only carry `size`, the number of rows their
//! subtree would occupy if they were expanded.
//!
//! Arrays are never edited in place. Each splice builds a new boxed slice so a
//! reader can not observe a half-applied change.

use core::cmp::Ordering;
use core::ops::Range;

use smallvec::SmallVec;

use crate::error::{InvariantViolation, TreeError};
use crate::events::TreeEvent;
use crate::hierarchy::Hierarchy;
use crate::load::{LoadOutcome, PendingLoad};
use crate::node::{BranchState, Node};
use crate::types::NodeId;

impl Hierarchy {
    /// `branch_size` of a composite; 0 for leaves and stale ids.
    #[must_use]
    pub fn branch_size(&self, id: NodeId) -> usize {
        self.registry
            .get(id)
            .and_then(Node::branch)
            .map_or(0, |b| b.size)
    }

    /// The flattened array owned by `owner`, if `owner` is currently a
    /// loaded visibility boundary.
    ///
    /// Row `i` under `owner` is `flattened_branch(owner)[i]`.
    #[must_use]
    pub fn flattened_branch(&self, owner: NodeId) -> Option<&[NodeId]> {
        self.registry
            .get(owner)
            .and_then(Node::branch)
            .and_then(|b| b.flat.as_deref())
    }

    /// Number of rows visible from the root.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.flattened_branch(self.root).map_or(0, <[NodeId]>::len)
    }

    /// The node shown at row `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<NodeId> {
        self.flattened_branch(self.root)?.get(index).copied()
    }

    /// Row index of a node, if it is visible from the root.
    #[must_use]
    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        self.flattened_branch(self.root)?
            .iter()
            .position(|&row| row == id)
    }

    /// The nodes shown at `range`, clamped to the visible rows.
    #[must_use]
    pub fn rows(&self, range: Range<usize>) -> &[NodeId] {
        let flat = self.flattened_branch(self.root).unwrap_or_default();
        let end = range.end.min(flat.len());
        let start = range.start.min(end);
        &flat[start..end]
    }

    /// Returns `true` if `id` is `owner` itself or appears in the array
    /// `owner` currently owns.
    #[must_use]
    pub fn is_item_visible_at_surface(&self, owner: NodeId, id: NodeId) -> bool {
        id == owner
            || self
                .flattened_branch(owner)
                .is_some_and(|flat| flat.contains(&id))
    }

    /// Checks the ownership and size-conservation invariants over the whole
    /// tree.
    ///
    /// Intended for tests and debugging; it walks every loaded node.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let violation = |node: NodeId, reason: String| -> Result<(), InvariantViolation> {
            Err(InvariantViolation { node, reason })
        };
        for id in self.subtree(self.root) {
            let node = self.registry.node(id);
            if let Some(parent) = node.parent {
                let parent_depth = self.registry.node(parent).depth;
                if node.depth != parent_depth + 1 {
                    return violation(id, format!("depth {} under parent depth {parent_depth}", node.depth));
                }
            }
            let Some(branch) = node.branch() else {
                continue;
            };
            let Some(children) = branch.children.as_deref() else {
                if branch.size != 0 || branch.flat.is_some() {
                    return violation(id, "unloaded composite carries rows".into());
                }
                continue;
            };
            let mut expected = 0;
            for &child in children {
                let child_node = self.registry.node(child);
                if child_node.parent != Some(id) {
                    return violation(child, format!("parent link does not point at {id}"));
                }
                expected += child_node.row_span();
            }
            if branch.size != expected {
                return violation(id, format!("branch size {} but children span {expected}", branch.size));
            }
            let is_boundary = node.parent.is_none() || !branch.is_expanded();
            match (&branch.flat, is_boundary) {
                (Some(flat), true) => {
                    let mut visible = Vec::with_capacity(expected);
                    self.collect_visible(id, &mut visible);
                    if **flat != *visible {
                        return violation(id, "flattened branch out of sync with children".into());
                    }
                }
                (None, true) => return violation(id, "boundary without a flattened branch".into()),
                (Some(_), false) => return violation(id, "expanded node still owns an array".into()),
                (None, false) => {}
            }
        }
        Ok(())
    }

    fn collect_visible(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(id).unwrap_or_default() {
            out.push(child);
            if self.is_expanded(child) {
                self.collect_visible(child, out);
            }
        }
    }

    // --- expansion ---

    /// Records an expansion intent and starts loading children if needed.
    ///
    /// Returns the load to await, if any; pass its outcome to
    /// [`Hierarchy::finish_expand`].
    pub(crate) fn request_expand(&mut self, id: NodeId) -> Result<Option<PendingLoad>, TreeError> {
        let is_root = id == self.root;
        let branch = self.branch_of(id)?;
        if !is_root && branch.is_expanded() {
            return Ok(None);
        }
        let load = if branch.children.is_some() {
            None
        } else {
            Some(self.start_load(id)?)
        };
        if !is_root {
            self.branch_mut_of(id)?
                .state
                .insert(BranchState::EXPAND_PENDING);
        }
        Ok(load)
    }

    /// Installs a finished load and, unless the intent was cancelled by a
    /// collapse in the meantime, expands the node.
    ///
    /// Returns whether the node is expanded afterwards.
    pub(crate) fn finish_expand(
        &mut self,
        id: NodeId,
        outcome: Option<LoadOutcome>,
        ensure_visible: bool,
    ) -> Result<bool, TreeError> {
        if let Some(outcome) = outcome
            && let Err(err) = self.complete_load(outcome)
        {
            if let Ok(branch) = self.branch_mut_of(id) {
                branch.state.remove(BranchState::EXPAND_PENDING);
            }
            return Err(err);
        }
        if id == self.root {
            self.branch_of(id)?;
            return Ok(true);
        }
        let branch = self.branch_mut_of(id)?;
        if !branch.state.contains(BranchState::EXPAND_PENDING) {
            return Ok(branch.is_expanded());
        }
        branch.state.remove(BranchState::EXPAND_PENDING);
        if branch.is_expanded() {
            return Ok(true);
        }
        if branch.children.is_none() {
            log::debug!("expansion of {id} finished without children; leaving it collapsed");
            return Ok(false);
        }
        self.expand_loaded(id, ensure_visible);
        Ok(true)
    }

    /// Expands a composite, loading its children first if needed.
    pub(crate) async fn set_expanded(&mut self, id: NodeId, ensure_visible: bool) -> Result<(), TreeError> {
        let outcome = match self.request_expand(id)? {
            Some(load) => Some(load.await),
            None => None,
        };
        self.finish_expand(id, outcome, ensure_visible)?;
        Ok(())
    }

    /// Collapses a composite; also cancels a pending expansion.
    pub(crate) fn set_collapsed(&mut self, id: NodeId) -> Result<(), TreeError> {
        let branch = self.branch_mut_of(id)?;
        branch.state.remove(BranchState::EXPAND_PENDING);
        if branch.is_expanded() {
            self.collapse_branch(id);
        }
        Ok(())
    }

    /// Expands a loaded node, optionally opening collapsed ancestors first.
    pub(crate) fn expand_loaded(&mut self, id: NodeId, ensure_visible: bool) {
        if ensure_visible {
            let closed: SmallVec<[NodeId; 8]> = self
                .ancestors(id)
                .filter(|&a| !self.is_expanded(a))
                .collect();
            for ancestor in closed.into_iter().rev() {
                self.expand_branch(ancestor);
            }
        }
        self.expand_branch(id);
    }

    fn expand_branch(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let node = self.registry.node_mut(id);
        let parent = node.parent;
        let branch = node.branch_mut().expect("only composites expand");
        if branch.is_expanded() {
            return;
        }
        assert!(branch.children.is_some(), "expanding {id} before its children are loaded");
        branch.state.insert(BranchState::EXPANDED);
        if let Some(parent) = parent {
            let size = branch.size;
            let own = branch.flat.take().unwrap_or_default();
            let boundary = self.adjust_chain(parent, size, Ordering::Greater);
            let at = self.position(boundary, id) + 1;
            log::trace!("expand {id}: splice {size} rows into {boundary} at {at}");
            self.splice_into(boundary, at, &own);
        }
        log::debug!("expanded {id}");
        self.events.publish(TreeEvent::ExpansionChanged {
            node: id,
            expanded: true,
            visible_at_surface: self.is_item_visible_at_surface(self.root, id),
        });
    }

    fn collapse_branch(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let visible_at_surface = self.is_item_visible_at_surface(self.root, id);
        let node = self.registry.node_mut(id);
        let parent = node.parent;
        let branch = node.branch_mut().expect("only composites collapse");
        if !branch.is_expanded() {
            return;
        }
        branch.state.remove(BranchState::EXPANDED);
        if let Some(parent) = parent {
            let size = branch.size;
            let boundary = self.adjust_chain(parent, size, Ordering::Less);
            let at = self.position(boundary, id) + 1;
            log::trace!("collapse {id}: cut {size} rows from {boundary} at {at}");
            let own = self.cut_from(boundary, at, size);
            if let Some(branch) = self.registry.node_mut(id).branch_mut() {
                branch.flat = Some(own);
            }
        }
        log::debug!("collapsed {id}");
        self.events.publish(TreeEvent::ExpansionChanged {
            node: id,
            expanded: false,
            visible_at_surface,
        });
    }

    // --- structure ---

    /// Links a detached node under `parent` at its sorted position.
    ///
    /// If `parent`'s children are not loaded the node is disposed instead (the
    /// parent's listing will supply it) and `false` is returned.
    ///
    /// # Panics
    ///
    /// Panics if `child` is the root, is still linked, or `parent` is `child`
    /// or one of its descendants.
    pub(crate) fn insert_item(&mut self, parent: NodeId, child: NodeId) -> bool {
        assert_ne!(child, self.root, "the root cannot be inserted");
        assert!(
            self.registry.node(child).parent.is_none(),
            "{child} is already linked; unlink it first"
        );
        assert!(
            parent != child && !self.is_descendant_of(parent, child),
            "cannot insert {child} into its own subtree"
        );
        let Some(children) = self.children(parent) else {
            assert!(
                self.registry.node(parent).branch().is_some(),
                "insertion target {parent} is not a composite"
            );
            log::debug!("{parent} is not loaded; disposing inserted {child}");
            self.dispose(child);
            return false;
        };

        let comparator = self.comparator.clone();
        let entry = self.entry_ref(child);
        let pos = children.partition_point(|&c| comparator(&self.entry_ref(c), &entry) != Ordering::Greater);
        let left = pos.checked_sub(1).map(|i| children[i]);

        let depth = self.registry.node(parent).depth + 1;
        self.registry.node_mut(child).parent = Some(parent);
        self.relink_subtree(child, depth);

        let node = self.registry.node_mut(child);
        let span = node.row_span();
        let own = node
            .branch_mut()
            .filter(|b| b.is_expanded())
            .and_then(|b| b.flat.take());
        let mut segment = Vec::with_capacity(span);
        segment.push(child);
        segment.extend_from_slice(own.as_deref().unwrap_or_default());

        let boundary = self.adjust_chain(parent, span, Ordering::Greater);
        let at = match left {
            Some(left) => self.position(boundary, left) + self.registry.node(left).row_span(),
            None if parent == boundary => 0,
            None => self.position(boundary, parent) + 1,
        };
        log::trace!("insert {child} under {parent}: {span} rows into {boundary} at {at}");
        self.splice_into(boundary, at, &segment);
        if let Some(children) = self
            .registry
            .node_mut(parent)
            .branch_mut()
            .and_then(|b| b.children.as_mut())
        {
            children.insert(pos, child);
        }
        true
    }

    /// Unlinks a node from its parent, disposing it unless `reparenting`.
    ///
    /// A detached expanded node takes back ownership of its rows so it can be
    /// re-inserted elsewhere.
    pub(crate) fn unlink_item(&mut self, child: NodeId, reparenting: bool) {
        assert_ne!(child, self.root, "the root cannot be unlinked");
        if let Some(parent) = self.registry.node(child).parent {
            let span = self.registry.node(child).row_span();
            let boundary = self.adjust_chain(parent, span, Ordering::Less);
            let at = self.position(boundary, child);
            log::trace!("unlink {child} from {parent}: cut {span} rows from {boundary} at {at}");
            let removed = self.cut_from(boundary, at, span);
            if let Some(children) = self
                .registry
                .node_mut(parent)
                .branch_mut()
                .and_then(|b| b.children.as_mut())
                && let Some(i) = children.iter().position(|&c| c == child)
            {
                children.remove(i);
            }
            let node = self.registry.node_mut(child);
            node.parent = None;
            if let Some(branch) = node.branch_mut()
                && branch.is_expanded()
            {
                branch.flat = Some(removed[1..].into());
            }
            self.relink_subtree(child, 0);
        }
        if !reparenting {
            self.dispose(child);
        }
    }

    // --- helpers ---

    /// Adds (`Greater`) or subtracts (`Less`) `amount` on every composite from
    /// `from` up to and including its visibility boundary, which is returned.
    fn adjust_chain(&mut self, from: NodeId, amount: usize, direction: Ordering) -> NodeId {
        let mut current = from;
        loop {
            let node = self.registry.node_mut(current);
            let parent = node.parent;
            let branch = node
                .branch_mut()
                .expect("ancestor chains only contain composites");
            match direction {
                Ordering::Greater => branch.size += amount,
                _ => branch.size -= amount,
            }
            match parent {
                Some(parent) if branch.is_expanded() => current = parent,
                _ => return current,
            }
        }
    }

    fn owned(&self, owner: NodeId) -> &[NodeId] {
        self.flattened_branch(owner)
            .expect("visibility boundary without a flattened branch")
    }

    fn position(&self, owner: NodeId, id: NodeId) -> usize {
        self.owned(owner)
            .iter()
            .position(|&row| row == id)
            .expect("node missing from its boundary's flattened branch")
    }

    fn splice_into(&mut self, owner: NodeId, at: usize, rows: &[NodeId]) {
        let old = self.owned(owner);
        let mut next = Vec::with_capacity(old.len() + rows.len());
        next.extend_from_slice(&old[..at]);
        next.extend_from_slice(rows);
        next.extend_from_slice(&old[at..]);
        self.replace_flat(owner, next.into_boxed_slice());
    }

    fn cut_from(&mut self, owner: NodeId, at: usize, len: usize) -> Box<[NodeId]> {
        let old = self.owned(owner);
        assert!(at + len <= old.len(), "cut {at}..{} outside {owner}'s {} rows", at + len, old.len());
        let removed: Box<[NodeId]> = old[at..at + len].into();
        let mut next = Vec::with_capacity(old.len() - len);
        next.extend_from_slice(&old[..at]);
        next.extend_from_slice(&old[at + len..]);
        self.replace_flat(owner, next.into_boxed_slice());
        removed
    }

    fn replace_flat(&mut self, owner: NodeId, flat: Box<[NodeId]>) {
        if let Some(branch) = self.registry.node_mut(owner).branch_mut() {
            branch.flat = Some(flat);
        }
        self.events.publish(TreeEvent::BranchUpdated { owner });
    }
}
