// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_tree_view --heading-base-level=0

//! Understory Tree View: the backing store of a virtualized tree widget.
//!
//! A file explorer or outline view shows a hierarchy as a flat list of rows.
//! This crate keeps that list current while nodes are loaded lazily, expanded,
//! collapsed, inserted, moved, and disposed, without ever rebuilding it from
//! scratch.
//!
//! - Children are materialized on demand by an async [`ChildrenProvider`].
//!   Concurrent requests for one node share a single provider call.
//! - Each visible node's id lives in exactly one pre-order array, owned by its
//!   nearest *visibility boundary* (the root or a collapsed ancestor). Row `i`
//!   of the view is an array lookup; expanding or collapsing splices a slice
//!   between a node and its boundary.
//! - A [`TreeStateManager`] tracks which nodes are expanded, so the expansion
//!   and scroll state can be saved as a small JSON document and restored
//!   later, and can record a *stash* of changes to undo after a bulk refresh.
//!
//! ## Not a widget
//!
//! Nothing here draws, measures text, or handles input. Hosts read rows with
//! [`Hierarchy::rows`] or [`Tree::visible_rows`], realize widgets for them,
//! and call back into the [`Tree`] when the user expands a row.
//!
//! ## API overview
//!
//! - [`Tree`]: façade owning one [`Hierarchy`] and one [`TreeStateManager`].
//!   All mutations go through it.
//! - [`Hierarchy`]: read access to nodes ([`NodeId`], names, paths, metadata)
//!   and rows.
//! - [`ChildrenProvider`] / [`ChildDescriptor`]: the loading seam.
//!   [`MemoryProvider`] is an in-memory implementation.
//! - [`TreeEvent`] / [`EventKinds`]: engine notifications, filtered per
//!   subscriber.
//! - [`TreeStateSnapshot`]: the persisted-state document.
//! - [`RowWindow`] / [`ScrollAlign`]: uniform-height viewport math.
//!
//! Key operations:
//! - [`Tree::ensure_loaded`], [`Tree::reload`], [`Tree::force_load_node_at_path`]
//! - [`Tree::set_expanded`] / [`Tree::set_collapsed`]
//! - [`Tree::insert_item`] / [`Tree::unlink_item`] / [`Tree::move_node`]
//! - [`Tree::add_metadata`] / [`Tree::remove_metadata`]
//! - [`Tree::snapshot`] / [`Tree::load_tree_state`]
//! - [`Tree::begin_stash`] / [`Tree::end_stash`] / [`Tree::reverse_stash`]
//!
//! ## Example
//!
//! ```rust
//! use understory_tree_view::{MemoryProvider, Tree, TreeConfig};
//!
//! let provider = MemoryProvider::from_paths(["b", "a", "dir1/x", "dir1/y"]);
//! let mut tree = Tree::new(provider, TreeConfig::new("/ws"));
//! let root = tree.root();
//!
//! pollster::block_on(tree.ensure_loaded(root)).unwrap();
//! let dir1 = tree.hierarchy().find_child(root, "dir1").unwrap();
//! pollster::block_on(tree.set_expanded(dir1, true)).unwrap();
//!
//! let h = tree.hierarchy();
//! let rows: Vec<&str> = h.rows(0..h.row_count()).iter().map(|&id| h.name(id).unwrap()).collect();
//! assert_eq!(rows, ["dir1", "x", "y", "a", "b"]);
//!
//! let saved = tree.snapshot().to_string();
//! assert!(saved.contains(r#""atSurface":["dir1"]"#));
//! ```
//!
//! Async operations are plain futures over `Rc` state; drive them with any
//! single-threaded executor.

mod branch;
mod config;
mod error;
mod events;
mod hierarchy;
mod load;
mod memory;
mod node;
pub mod path;
mod registry;
mod rows;
mod snapshot;
mod state;
mod tree;
mod types;

pub use config::TreeConfig;
pub use error::{InvariantViolation, ProviderError, TreeError};
pub use events::{EventKinds, MetadataChange, SubscriptionId, TreeEvent};
pub use hierarchy::Hierarchy;
pub use load::{ChildDescriptor, ChildrenProvider, ChildrenRequest, LoadOutcome, LoadResult, PendingLoad};
pub use memory::MemoryProvider;
pub use rows::{RowWindow, ScrollAlign};
pub use snapshot::{ExpandedDirectories, StateError, TreeStateSnapshot};
pub use state::{StashFlags, StateEvent, TreeStateManager};
pub use tree::Tree;
pub use types::{Comparator, EntryRef, Metadata, NodeId, NodeKind, default_comparator};
