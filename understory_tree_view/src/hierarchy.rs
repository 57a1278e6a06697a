// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The node engine: identity, names, paths, metadata, and moves.
//!
//! Branch indexing lives in `branch.rs` and provider loading in `load.rs`;
//! both extend [`Hierarchy`].

use core::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use serde_json::Value;

use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::events::{EventQueue, MetadataChange, TreeEvent};
use crate::load::{ChildrenProvider, PendingLoad};
use crate::node::{Branch, BranchState, Node};
use crate::path;
use crate::registry::Registry;
use crate::types::{Comparator, EntryRef, Metadata, NodeId, NodeKind};

/// All nodes of one tree plus the flattened-branch index over them.
///
/// Read access is public and goes through [`Tree::hierarchy`](crate::Tree::hierarchy).
/// Mutations go through [`Tree`](crate::Tree) so that every change is observed
/// by the state manager and subscribers.
pub struct Hierarchy {
    pub(crate) registry: Registry,
    pub(crate) root: NodeId,
    pub(crate) comparator: Comparator,
    pub(crate) provider: Rc<dyn ChildrenProvider>,
    pub(crate) pending: HashMap<NodeId, PendingLoad>,
    pub(crate) next_ticket: u64,
    pub(crate) events: EventQueue,
}

impl fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hierarchy")
            .field("root", &self.root)
            .field("nodes_alive", &self.registry.len())
            .field("pending_loads", &self.pending.len())
            .field("rows", &self.row_count())
            .finish_non_exhaustive()
    }
}

impl Hierarchy {
    pub(crate) fn new(provider: Rc<dyn ChildrenProvider>, config: &TreeConfig) -> Self {
        let mut registry = Registry::new();
        let mut root = Node::new(
            NodeKind::Composite,
            config.root_path().to_owned(),
            Metadata::new(),
        );
        if let Some(branch) = root.branch_mut() {
            // The root is always open; it is also always a visibility boundary.
            branch.state.insert(BranchState::EXPANDED);
        }
        let root = registry.insert(root);
        Self {
            registry,
            root,
            comparator: config.comparator().clone(),
            provider,
            pending: HashMap::new(),
            next_ticket: 0,
            events: EventQueue::default(),
        }
    }

    /// The root composite node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, the root and detached nodes included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.registry.contains(id)
    }

    /// Leaf or composite; `None` for stale ids.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.registry.get(id).map(Node::kind)
    }

    /// The node's name. For the root this is its absolute path.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.registry.get(id).map(|n| n.name.as_str())
    }

    /// Distance from the root (the root has depth 0).
    #[must_use]
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.registry.get(id).map(|n| n.depth)
    }

    /// Parent of a node, or `None` for the root, detached nodes, and stale ids.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.registry.get(id).and_then(|n| n.parent)
    }

    /// Sorted children, or `None` for leaves, unloaded composites, and stale ids.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.registry
            .get(id)
            .and_then(Node::branch)
            .and_then(|b| b.children.as_deref())
    }

    /// Returns `true` if the node's children have been materialized.
    #[must_use]
    pub fn is_loaded(&self, id: NodeId) -> bool {
        self.children(id).is_some()
    }

    /// Returns `true` while a provider call for this node is in flight.
    #[must_use]
    pub fn is_loading(&self, id: NodeId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Returns `true` if the node is an expanded composite. The root always is.
    #[must_use]
    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.registry
            .get(id)
            .and_then(Node::branch)
            .is_some_and(Branch::is_expanded)
    }

    /// Reads one metadata value.
    #[must_use]
    pub fn metadata(&self, id: NodeId, key: &str) -> Option<&Value> {
        self.registry.get(id)?.metadata.get(key)
    }

    /// The node's whole metadata dictionary.
    #[must_use]
    pub fn metadata_map(&self, id: NodeId) -> Option<&Metadata> {
        self.registry.get(id).map(|n| &n.metadata)
    }

    /// Absolute path of a node: its parent's path joined with its name.
    ///
    /// Computed on first access and cached until the node or one of its
    /// ancestors moves or is renamed.
    #[must_use]
    pub fn path(&self, id: NodeId) -> Option<&str> {
        let node = self.registry.get(id)?;
        let cached = node.path.get_or_init(|| match node.parent {
            Some(parent) => path::join(self.path(parent).unwrap_or_default(), &node.name),
            None => node.name.clone(),
        });
        Some(cached.as_str())
    }

    /// Path of a node relative to the root; the root maps to `""`.
    ///
    /// `None` for stale nodes and for nodes not linked under the root.
    #[must_use]
    pub fn relative_path(&self, id: NodeId) -> Option<&str> {
        if !self.is_attached(id) {
            return None;
        }
        path::relative(self.path(self.root)?, self.path(id)?)
    }

    /// Returns `true` if `id` is the root or its ancestor chain ends at the
    /// root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_alive(id) && self.ancestors(id).last().unwrap_or(id) == self.root
    }

    /// Iterates the ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Returns `true` if `ancestor` lies on the parent chain of `id`.
    #[must_use]
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Finds a loaded child by name.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)?
            .iter()
            .copied()
            .find(|&c| self.registry.node(c).name == name)
    }

    /// A comparator view of a live node.
    #[must_use]
    pub fn entry(&self, id: NodeId) -> Option<EntryRef<'_>> {
        self.registry.get(id).map(|node| EntryRef {
            id,
            name: &node.name,
            kind: node.kind(),
            metadata: &node.metadata,
        })
    }

    // --- mutations, driven by `Tree` ---

    pub(crate) fn create_node(&mut self, kind: NodeKind, name: String, metadata: Metadata) -> NodeId {
        self.registry.insert(Node::new(kind, name, metadata))
    }

    pub(crate) fn add_metadata(&mut self, id: NodeId, key: String, value: Value) {
        let Some(node) = self.registry.get_mut(id) else {
            return;
        };
        let change = match node.metadata.insert(key.clone(), value.clone()) {
            None => MetadataChange::Added { value },
            Some(old) if old == value => return,
            Some(old) => MetadataChange::Updated { old, new: value },
        };
        self.events.publish(TreeEvent::MetadataChanged {
            node: id,
            key,
            change,
        });
    }

    pub(crate) fn remove_metadata(&mut self, id: NodeId, key: &str) {
        let Some(old) = self
            .registry
            .get_mut(id)
            .and_then(|n| n.metadata.remove(key))
        else {
            return;
        };
        self.events.publish(TreeEvent::MetadataChanged {
            node: id,
            key: key.to_owned(),
            change: MetadataChange::Removed { old },
        });
    }

    /// Reparents and/or renames a node; `None` detaches and disposes it, and
    /// so does a target whose children are not loaded yet.
    ///
    /// # Panics
    ///
    /// Panics when moving the root, or moving a node into its own subtree.
    pub(crate) fn move_node(
        &mut self,
        id: NodeId,
        new_parent: Option<NodeId>,
        new_name: Option<String>,
    ) -> Result<(), TreeError> {
        if !self.is_alive(id) {
            return Err(TreeError::StaleNode(id));
        }
        assert_ne!(id, self.root, "the root cannot be moved");
        let old_parent = self.registry.node(id).parent;

        let Some(target) = new_parent else {
            self.events.publish(TreeEvent::WillChangeParent {
                node: id,
                old: old_parent,
                new: None,
            });
            self.unlink_item(id, true);
            self.events.publish(TreeEvent::DidChangeParent {
                node: id,
                old: old_parent,
                new: None,
            });
            self.dispose(id);
            return Ok(());
        };

        match self.registry.get(target) {
            None => return Err(TreeError::StaleNode(target)),
            Some(node) if node.branch().is_none() => return Err(TreeError::NotComposite(target)),
            Some(_) => {}
        }
        assert!(
            target != id && !self.is_descendant_of(target, id),
            "cannot move {id} into its own subtree"
        );
        if !self.is_loaded(target) {
            // The target's first listing will supply the node.
            log::debug!("{target} is not loaded; disposing moved {id}");
            return self.move_node(id, None, None);
        }

        let parent_changes = old_parent != Some(target);
        let renamed = new_name
            .as_deref()
            .is_some_and(|name| name != self.registry.node(id).name);
        if !parent_changes && !renamed {
            return Ok(());
        }

        let old_path = self.path(id).map(str::to_owned);
        if parent_changes {
            self.events.publish(TreeEvent::WillChangeParent {
                node: id,
                old: old_parent,
                new: Some(target),
            });
        }
        self.unlink_item(id, true);
        if let Some(name) = new_name {
            self.registry.node_mut(id).name = name;
        }
        self.insert_item(target, id);
        if parent_changes {
            self.events.publish(TreeEvent::DidChangeParent {
                node: id,
                old: old_parent,
                new: Some(target),
            });
        }
        let new_path = self.path(id).map(str::to_owned);
        if let (Some(old), Some(new)) = (old_path, new_path)
            && old != new
        {
            self.events
                .publish(TreeEvent::DidChangePath { node: id, old, new });
        }
        Ok(())
    }

    /// Removes a node and its subtree from the registry, children first.
    pub(crate) fn dispose(&mut self, id: NodeId) {
        let doomed = self.subtree(id);
        for node in doomed.into_iter().rev() {
            self.pending.remove(&node);
            self.registry.remove(node);
            self.events.publish(TreeEvent::Disposed { node });
        }
    }

    /// Pre-order list of a node and its loaded descendants.
    pub(crate) fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(children) = self.children(current) {
                stack.extend(children.iter().rev().copied());
            }
        }
        out
    }

    /// Re-bases depths under `id` and drops cached paths of the subtree.
    pub(crate) fn relink_subtree(&mut self, id: NodeId, depth: usize) {
        let mut stack = vec![(id, depth)];
        while let Some((current, depth)) = stack.pop() {
            let node = self.registry.node_mut(current);
            node.depth = depth;
            node.path.take();
            if let Some(children) = node.branch().and_then(|b| b.children.as_ref()) {
                stack.extend(children.iter().map(|&c| (c, depth + 1)));
            }
        }
    }

    pub(crate) fn branch_of(&self, id: NodeId) -> Result<&Branch, TreeError> {
        self.registry
            .get(id)
            .ok_or(TreeError::StaleNode(id))?
            .branch()
            .ok_or(TreeError::NotComposite(id))
    }

    pub(crate) fn branch_mut_of(&mut self, id: NodeId) -> Result<&mut Branch, TreeError> {
        self.registry
            .get_mut(id)
            .ok_or(TreeError::StaleNode(id))?
            .branch_mut()
            .ok_or(TreeError::NotComposite(id))
    }

    pub(crate) fn entry_ref(&self, id: NodeId) -> EntryRef<'_> {
        let node = self.registry.node(id);
        EntryRef {
            id,
            name: &node.name,
            kind: node.kind(),
            metadata: &node.metadata,
        }
    }
}
