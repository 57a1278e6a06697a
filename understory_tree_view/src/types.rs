// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the tree view: node identifiers, kinds, and entry views.

use core::cmp::Ordering;
use core::fmt;

use std::rc::Rc;

use hashbrown::HashMap;
use serde_json::Value;

/// Identifier for a node in a [`Tree`](crate::Tree).
///
/// Identifiers are handed out in increasing order and are never reused within
/// one tree, so a stale `NodeId` can never alias a newer node. The flattened
/// branch arrays store these directly; the type is a transparent `u32`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw integer value of this identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a node can own children.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    /// A terminal entry (a file, for example).
    Leaf,
    /// An entry that can own children (a directory, for example).
    Composite,
}

impl NodeKind {
    /// Returns `true` for [`NodeKind::Composite`].
    #[must_use]
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::Composite)
    }
}

/// Per-node metadata dictionary.
pub type Metadata = HashMap<String, Value>;

/// A read-only view of a node, handed to comparators.
#[derive(Clone, Copy, Debug)]
pub struct EntryRef<'a> {
    /// The node being compared.
    pub id: NodeId,
    /// The node's name (last path segment).
    pub name: &'a str,
    /// Leaf or composite.
    pub kind: NodeKind,
    /// The node's metadata.
    pub metadata: &'a Metadata,
}

/// Ordering applied to siblings whenever children are loaded or inserted.
pub type Comparator = Rc<dyn Fn(&EntryRef<'_>, &EntryRef<'_>) -> Ordering>;

/// Default sibling order: composites before leaves, then by name ascending.
pub fn default_comparator(a: &EntryRef<'_>, b: &EntryRef<'_>) -> Ordering {
    match (a.kind, b.kind) {
        (NodeKind::Composite, NodeKind::Leaf) => Ordering::Less,
        (NodeKind::Leaf, NodeKind::Composite) => Ordering::Greater,
        _ => a.name.cmp(b.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composites_sort_before_leaves() {
        let meta = Metadata::new();
        let dir = EntryRef {
            id: NodeId(1),
            name: "zeta",
            kind: NodeKind::Composite,
            metadata: &meta,
        };
        let file = EntryRef {
            id: NodeId(2),
            name: "alpha",
            kind: NodeKind::Leaf,
            metadata: &meta,
        };
        assert_eq!(default_comparator(&dir, &file), Ordering::Less);
        assert_eq!(default_comparator(&file, &dir), Ordering::Greater);
        let other = EntryRef {
            name: "beta",
            ..file
        };
        assert_eq!(default_comparator(&file, &other), Ordering::Less);
    }
}
