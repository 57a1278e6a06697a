// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node storage held by the registry.

use core::cell::OnceCell;

use crate::types::{Metadata, NodeId, NodeKind};

bitflags::bitflags! {
    /// Expansion state of a composite node.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub(crate) struct BranchState: u8 {
        /// The node's descendants are spliced into its boundary's array.
        const EXPANDED       = 0b0000_0001;
        /// An expansion was requested and is waiting on the children provider.
        /// Collapsing the node clears it, which cancels the expansion.
        const EXPAND_PENDING = 0b0000_0010;
    }
}

/// Child bookkeeping for a composite node.
#[derive(Clone, Debug, Default)]
pub(crate) struct Branch {
    /// Sorted children, or `None` until the provider listing is installed.
    pub(crate) children: Option<Vec<NodeId>>,
    pub(crate) state: BranchState,
    /// `Σ (1 + (child expanded ? child.size : 0))` over the children.
    pub(crate) size: usize,
    /// Pre-order ids of the descendants this node covers, present only while
    /// this node is a visibility boundary (root, collapsed, or detached).
    pub(crate) flat: Option<Box<[NodeId]>>,
}

impl Branch {
    pub(crate) fn is_expanded(&self) -> bool {
        self.state.contains(BranchState::EXPANDED)
    }

    /// Number of rows this branch adds below itself in its boundary's array.
    pub(crate) fn visible_size(&self) -> usize {
        if self.is_expanded() { self.size } else { 0 }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Body {
    Leaf,
    Composite(Branch),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) name: String,
    pub(crate) depth: usize,
    pub(crate) metadata: Metadata,
    /// Absolute path, filled on first read and cleared when the node or an
    /// ancestor is renamed or moved.
    pub(crate) path: OnceCell<String>,
    pub(crate) body: Body,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, name: String, metadata: Metadata) -> Self {
        Self {
            parent: None,
            name,
            depth: 0,
            metadata,
            path: OnceCell::new(),
            body: match kind {
                NodeKind::Leaf => Body::Leaf,
                NodeKind::Composite => Body::Composite(Branch::default()),
            },
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        match self.body {
            Body::Leaf => NodeKind::Leaf,
            Body::Composite(_) => NodeKind::Composite,
        }
    }

    pub(crate) fn branch(&self) -> Option<&Branch> {
        match &self.body {
            Body::Leaf => None,
            Body::Composite(branch) => Some(branch),
        }
    }

    pub(crate) fn branch_mut(&mut self) -> Option<&mut Branch> {
        match &mut self.body {
            Body::Leaf => None,
            Body::Composite(branch) => Some(branch),
        }
    }

    /// Rows this node occupies in its boundary's array, itself included.
    pub(crate) fn row_span(&self) -> usize {
        1 + self.branch().map_or(0, Branch::visible_size)
    }
}
