// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity registry: the arena that owns every live node of one tree.

use hashbrown::HashMap;

use crate::node::Node;
use crate::types::NodeId;

/// Maps handles to live nodes.
///
/// Handles increase monotonically and are never recycled, so lookups of a
/// disposed node fail instead of aliasing a newer one.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its freshly minted handle.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .expect("NodeId space exhausted");
        self.nodes.insert(id, node);
        id
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Access a node; panics if `id` is stale.
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(&id).expect("dangling NodeId")
    }

    /// Access a node mutably; panics if `id` is stale.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).expect("dangling NodeId")
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, NodeKind};

    #[test]
    fn handles_are_never_reused() {
        let mut registry = Registry::new();
        let a = registry.insert(Node::new(NodeKind::Leaf, "a".into(), Metadata::new()));
        assert!(registry.remove(a).is_some());
        let b = registry.insert(Node::new(NodeKind::Leaf, "b".into(), Metadata::new()));
        assert_ne!(a, b);
        assert!(b > a, "handles increase monotonically");
        assert!(!registry.contains(a));
        assert_eq!(registry.len(), 1);
    }
}
