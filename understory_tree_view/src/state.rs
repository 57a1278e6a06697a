// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Expansion and scroll state that outlives a session.
//!
//! [`TreeStateManager`] watches the engine's expansion, path, and lifecycle
//! events and keeps a map from expanded nodes to their root-relative paths.
//! That map becomes a [`TreeStateSnapshot`] on save.
//!
//! A *stash* records expansion changes made during a bulk refresh so they can
//! be undone afterwards:
//!
//! - [`begin_stash`](crate::Tree::begin_stash) opens a recording window. Each
//!   expansion change inside it becomes a keyframe instead of touching the
//!   persisted map.
//! - [`end_stash`](crate::Tree::end_stash) closes the window and folds the
//!   keyframes into the map. The keyframes are kept.
//! - [`reverse_stash`](crate::Tree::reverse_stash) replays the keyframes
//!   backwards, skipping disabled ones, and discards the stash.
//!
//! A node the user expands after the window closed, while keyframes still
//! exist, takes a *lock*: its own keyframe and its ancestors' are disabled so
//! a reversal does not hide it. Collapsing it again releases the lock and
//! re-enables every keyframe on its ancestor chain that no other lock sits
//! beneath.

use core::fmt;

use hashbrown::{HashMap, HashSet};

use crate::events::{Listeners, SubscriptionId, TreeEvent};
use crate::hierarchy::Hierarchy;
use crate::path;
use crate::snapshot::{ExpandedDirectories, TreeStateSnapshot};
use crate::types::NodeId;

bitflags::bitflags! {
    /// A stash keyframe.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StashFlags: u8 {
        /// The node was expanded inside the window.
        const EXPANDED  = 0b0000_0001;
        /// The node was collapsed inside the window.
        const COLLAPSED = 0b0000_0010;
        /// Reversal leaves this node alone.
        const DISABLED  = 0b0000_0100;
    }
}

impl StashFlags {
    const DIRECTION: Self = Self::EXPANDED.union(Self::COLLAPSED);

    fn for_expansion(expanded: bool) -> Self {
        if expanded {
            Self::EXPANDED
        } else {
            Self::COLLAPSED
        }
    }
}

/// Notifications emitted by [`TreeStateManager`].
///
/// Every other variant is followed by a [`StateEvent::DidChange`].
#[derive(Clone, Debug, PartialEq)]
pub enum StateEvent {
    /// A tracked node was expanded or collapsed.
    DidChangeExpansionState {
        /// Root-relative path of the node.
        path: String,
        /// New expansion state.
        expanded: bool,
        /// Whether the node is reachable from the root through expanded
        /// ancestors only.
        visible_at_surface: bool,
    },
    /// A tracked node moved or was renamed.
    DidChangeRelativePath {
        /// Root-relative path before the change.
        old: String,
        /// Root-relative path after the change.
        new: String,
    },
    /// [`TreeStateManager::save_scroll_offset`] stored a new offset.
    DidChangeScrollOffset(f64),
    /// Something in the persisted state changed.
    DidChange,
}

#[derive(Debug, Default)]
struct Stash {
    recording: bool,
    order: Vec<NodeId>,
    keyframes: HashMap<NodeId, StashFlags>,
    locks: HashSet<NodeId>,
}

impl Stash {
    fn record(&mut self, node: NodeId, expanded: bool) {
        let flags = self.keyframes.entry(node).or_default();
        let opposite = StashFlags::for_expansion(!expanded);
        if flags.contains(opposite) {
            // Expanding then collapsing inside one window is a no-op.
            flags.remove(StashFlags::DIRECTION);
            if flags.is_empty() {
                self.keyframes.remove(&node);
            }
            self.order.retain(|&n| n != node);
        } else if !flags.intersects(StashFlags::DIRECTION) {
            flags.insert(StashFlags::for_expansion(expanded));
            self.order.push(node);
        }
    }

    fn set_disabled(&mut self, node: NodeId, disabled: bool) {
        if let Some(flags) = self.keyframes.get_mut(&node) {
            flags.set(StashFlags::DISABLED, disabled);
        }
    }

    fn forget(&mut self, node: NodeId) {
        if self.keyframes.remove(&node).is_some() {
            self.order.retain(|&n| n != node);
        }
        self.locks.remove(&node);
    }
}

/// Tracks which nodes are expanded and the last scroll offset.
#[derive(Default)]
pub struct TreeStateManager {
    expanded: HashMap<NodeId, String>,
    scroll_offset: f64,
    stash: Option<Stash>,
    listeners: Listeners<StateEvent>,
}

impl fmt::Debug for TreeStateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeStateManager")
            .field("expanded", &self.expanded.len())
            .field("scroll_offset", &self.scroll_offset)
            .field("stash", &self.stash)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl TreeStateManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Root-relative paths of every tracked expanded node, in no order.
    pub fn expanded_paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.expanded.values().map(String::as_str)
    }

    /// The stored path of an expanded node.
    #[must_use]
    pub fn tracked_path(&self, node: NodeId) -> Option<&str> {
        self.expanded.get(&node).map(String::as_str)
    }

    /// The last offset passed to [`TreeStateManager::save_scroll_offset`].
    #[must_use]
    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    /// Stores a scroll offset to be written into the next snapshot.
    pub fn save_scroll_offset(&mut self, offset: f64) {
        if offset == self.scroll_offset {
            return;
        }
        self.scroll_offset = offset;
        self.emit(StateEvent::DidChangeScrollOffset(offset));
    }

    /// Returns `true` while a stash window is recording.
    #[must_use]
    pub fn is_stashing(&self) -> bool {
        self.stash.as_ref().is_some_and(|s| s.recording)
    }

    /// Returns `true` if keyframes from a stash are waiting to be reversed.
    #[must_use]
    pub fn has_stash(&self) -> bool {
        self.stash.as_ref().is_some_and(|s| !s.keyframes.is_empty())
    }

    /// The keyframe recorded for `node`, if any.
    #[must_use]
    pub fn keyframe(&self, node: NodeId) -> Option<StashFlags> {
        self.stash.as_ref()?.keyframes.get(&node).copied()
    }

    /// Subscribes to state events.
    pub fn subscribe(&mut self, callback: impl FnMut(&StateEvent) + 'static) -> SubscriptionId {
        self.listeners.add(Box::new(callback))
    }

    /// Removes a subscription made with [`TreeStateManager::subscribe`].
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    /// Builds the persisted-state document. Paths are sorted.
    #[must_use]
    pub fn snapshot(&self, hierarchy: &Hierarchy) -> TreeStateSnapshot {
        let mut dirs = ExpandedDirectories::default();
        for (&node, rel) in &self.expanded {
            if !hierarchy.is_alive(node) {
                continue;
            }
            if hierarchy.is_item_visible_at_surface(hierarchy.root(), node) {
                dirs.at_surface.push(rel.clone());
            } else {
                dirs.buried.push(rel.clone());
            }
        }
        dirs.at_surface.sort();
        dirs.buried.sort();
        TreeStateSnapshot {
            expanded_directories: dirs,
            scroll_position: Some(self.scroll_offset),
        }
    }

    // --- stash ---

    pub(crate) fn begin_stash(&mut self) {
        if self.stash.is_some() {
            log::debug!("discarding previous stash");
        }
        self.stash = Some(Stash {
            recording: true,
            ..Stash::default()
        });
    }

    pub(crate) fn end_stash(&mut self, hierarchy: &Hierarchy) {
        let Some(stash) = self.stash.as_mut().filter(|s| s.recording) else {
            return;
        };
        stash.recording = false;
        for &node in &stash.order {
            let Some(flags) = stash.keyframes.get(&node) else {
                continue;
            };
            if flags.contains(StashFlags::EXPANDED) {
                if let Some(rel) = hierarchy.relative_path(node) {
                    self.expanded.insert(node, rel.to_owned());
                }
            } else {
                self.expanded.remove(&node);
            }
        }
        log::debug!("stash closed with {} keyframes", stash.keyframes.len());
        if !stash.order.is_empty() {
            self.emit(StateEvent::DidChange);
        }
    }

    pub(crate) fn exclude_from_stash(&mut self, hierarchy: &Hierarchy, node: NodeId) {
        let Some(stash) = self.stash.as_mut() else {
            return;
        };
        for id in core::iter::once(node).chain(hierarchy.ancestors(node)) {
            stash.set_disabled(id, true);
        }
    }

    pub(crate) fn clear_stash(&mut self) {
        self.stash = None;
    }

    /// Removes the stash and returns its enabled keyframes, newest first.
    pub(crate) fn take_reversal(&mut self) -> Vec<(NodeId, StashFlags)> {
        let Some(stash) = self.stash.take() else {
            return Vec::new();
        };
        stash
            .order
            .iter()
            .rev()
            .filter_map(|node| Some((*node, *stash.keyframes.get(node)?)))
            .filter(|(_, flags)| !flags.contains(StashFlags::DISABLED))
            .collect()
    }

    // --- engine events ---

    pub(crate) fn observe(&mut self, hierarchy: &Hierarchy, event: &TreeEvent) {
        match *event {
            TreeEvent::ExpansionChanged {
                node,
                expanded,
                visible_at_surface,
            } => self.on_expansion(hierarchy, node, expanded, visible_at_surface),
            TreeEvent::DidChangePath { node, ref old, .. } => {
                self.on_path_change(hierarchy, node, old);
            }
            TreeEvent::Disposed { node } => {
                self.expanded.remove(&node);
                if let Some(stash) = self.stash.as_mut() {
                    stash.forget(node);
                }
            }
            _ => {}
        }
    }

    fn on_expansion(&mut self, hierarchy: &Hierarchy, node: NodeId, expanded: bool, visible_at_surface: bool) {
        let Some(rel) = hierarchy.relative_path(node).map(str::to_owned) else {
            return;
        };
        match self.stash.as_mut() {
            Some(stash) if stash.recording => stash.record(node, expanded),
            stash => {
                if let Some(stash) = stash.filter(|s| !s.keyframes.is_empty()) {
                    Self::update_locks(stash, hierarchy, node, expanded);
                }
                if expanded {
                    self.expanded.insert(node, rel.clone());
                } else {
                    self.expanded.remove(&node);
                }
            }
        }
        self.emit(StateEvent::DidChangeExpansionState {
            path: rel,
            expanded,
            visible_at_surface,
        });
    }

    fn update_locks(stash: &mut Stash, hierarchy: &Hierarchy, node: NodeId, expanded: bool) {
        let chain = core::iter::once(node).chain(hierarchy.ancestors(node));
        if expanded {
            stash.locks.insert(node);
            for id in chain {
                stash.set_disabled(id, true);
            }
        } else if stash.locks.remove(&node) {
            for id in chain {
                let still_locked = stash
                    .locks
                    .iter()
                    .any(|&lock| lock == id || hierarchy.is_descendant_of(lock, id));
                if !still_locked {
                    stash.set_disabled(id, false);
                }
            }
        }
    }

    fn on_path_change(&mut self, hierarchy: &Hierarchy, node: NodeId, old: &str) {
        let root_path = hierarchy.path(hierarchy.root()).unwrap_or_default();
        let Some(old_rel) = path::relative(root_path, old) else {
            return;
        };
        let mut renamed = Vec::new();
        for (&id, rel) in &mut self.expanded {
            if id != node && !hierarchy.is_descendant_of(id, node) {
                continue;
            }
            let Some(fresh) = hierarchy.relative_path(id) else {
                continue;
            };
            if fresh != rel.as_str() {
                renamed.push((core::mem::replace(rel, fresh.to_owned()), fresh.to_owned()));
            }
        }
        log::trace!("{old_rel}: rewrote {} tracked paths", renamed.len());
        renamed.sort();
        for (old, new) in renamed {
            self.emit(StateEvent::DidChangeRelativePath { old, new });
        }
    }

    fn emit(&mut self, event: StateEvent) {
        let aggregate = !matches!(event, StateEvent::DidChange);
        self.listeners.emit(&event);
        if aggregate {
            self.listeners.emit(&StateEvent::DidChange);
        }
    }
}
