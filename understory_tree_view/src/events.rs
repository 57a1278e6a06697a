// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change notifications.
//!
//! Every structural change made by the engine is published into one queue as a
//! [`TreeEvent`]. The [`Tree`](crate::Tree) drains that queue after each
//! operation, lets its state manager observe each event, and then fans the
//! event out to subscribers whose [`EventKinds`] filter matches.
//!
//! Events are delivered after the operation that produced them has finished,
//! so subscribers always observe a consistent tree.

use std::collections::VecDeque;
use std::fmt;

use serde_json::Value;

use crate::types::NodeId;

bitflags::bitflags! {
    /// Categories of [`TreeEvent`], used to filter subscriptions.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EventKinds: u8 {
        /// [`TreeEvent::ExpansionChanged`].
        const EXPANSION = 0b0000_0001;
        /// [`TreeEvent::WillChangeParent`] and [`TreeEvent::DidChangeParent`].
        const PARENT    = 0b0000_0010;
        /// [`TreeEvent::DidChangePath`].
        const PATH      = 0b0000_0100;
        /// [`TreeEvent::MetadataChanged`].
        const METADATA  = 0b0000_1000;
        /// [`TreeEvent::BranchUpdated`].
        const BRANCH    = 0b0001_0000;
        /// [`TreeEvent::ChildrenLoaded`] and [`TreeEvent::Disposed`].
        const LIFECYCLE = 0b0010_0000;
    }
}

/// How a metadata entry changed.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataChange {
    /// The key was not present before.
    Added {
        /// The new value.
        value: Value,
    },
    /// The key existed with a different value.
    Updated {
        /// The replaced value.
        old: Value,
        /// The new value.
        new: Value,
    },
    /// The key was removed.
    Removed {
        /// The removed value.
        old: Value,
    },
}

/// A structural change published by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum TreeEvent {
    /// A composite node was expanded or collapsed.
    ExpansionChanged {
        /// The composite node.
        node: NodeId,
        /// New expansion state.
        expanded: bool,
        /// Whether the node is reachable from the root without passing a
        /// collapsed ancestor.
        visible_at_surface: bool,
    },
    /// A node is about to move to a different parent.
    WillChangeParent {
        /// The moving node.
        node: NodeId,
        /// Current parent.
        old: Option<NodeId>,
        /// Parent after the move; `None` when the node is being disposed.
        new: Option<NodeId>,
    },
    /// A node moved to a different parent.
    DidChangeParent {
        /// The moved node.
        node: NodeId,
        /// Previous parent.
        old: Option<NodeId>,
        /// Current parent.
        new: Option<NodeId>,
    },
    /// The absolute path of a node changed through a move or a rename.
    ///
    /// Published once for the moved node; descendants' paths change
    /// implicitly.
    DidChangePath {
        /// The moved or renamed node.
        node: NodeId,
        /// Absolute path before the change.
        old: String,
        /// Absolute path after the change.
        new: String,
    },
    /// A metadata entry of a node changed.
    MetadataChanged {
        /// The node.
        node: NodeId,
        /// The metadata key.
        key: String,
        /// What happened to the key.
        change: MetadataChange,
    },
    /// The flattened array owned by `owner` was replaced.
    BranchUpdated {
        /// The visibility boundary whose array changed.
        owner: NodeId,
    },
    /// A composite node's children were materialized.
    ChildrenLoaded {
        /// The composite node.
        node: NodeId,
    },
    /// A node was removed from the registry.
    Disposed {
        /// The disposed handle; it is stale from now on.
        node: NodeId,
    },
}

impl TreeEvent {
    /// Returns the category of this event.
    #[must_use]
    pub fn kind(&self) -> EventKinds {
        match self {
            Self::ExpansionChanged { .. } => EventKinds::EXPANSION,
            Self::WillChangeParent { .. } | Self::DidChangeParent { .. } => EventKinds::PARENT,
            Self::DidChangePath { .. } => EventKinds::PATH,
            Self::MetadataChanged { .. } => EventKinds::METADATA,
            Self::BranchUpdated { .. } => EventKinds::BRANCH,
            Self::ChildrenLoaded { .. } | Self::Disposed { .. } => EventKinds::LIFECYCLE,
        }
    }
}

/// Engine-side fan-in queue.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    pending: VecDeque<TreeEvent>,
}

impl EventQueue {
    pub(crate) fn publish(&mut self, event: TreeEvent) {
        log::trace!("publish {event:?}");
        self.pending.push_back(event);
    }

    pub(crate) fn pop(&mut self) -> Option<TreeEvent> {
        self.pending.pop_front()
    }
}

/// Handle returned by subscriptions, used to unsubscribe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Box<dyn FnMut(&E)>;

/// A list of callbacks for one event type.
pub(crate) struct Listeners<E> {
    next: u64,
    entries: Vec<(SubscriptionId, Callback<E>)>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            next: 0,
            entries: Vec::new(),
        }
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<E> Listeners<E> {
    pub(crate) fn add(&mut self, callback: Callback<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.entries.push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&mut self, event: &E) {
        for (_, callback) in &mut self.entries {
            callback(event);
        }
    }
}
