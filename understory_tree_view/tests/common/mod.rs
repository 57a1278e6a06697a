// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for tree view integration tests.

#![allow(
    missing_docs,
    reason = "Integration-test helper module; not part of the public API."
)]

use std::cell::RefCell;
use std::rc::Rc;

use understory_tree_view::{
    EventKinds, MemoryProvider, NodeId, StateEvent, Tree, TreeConfig, TreeEvent,
};

pub(crate) const ROOT: &str = "/workspace";

/// A tree over `paths` with its root already loaded.
pub(crate) fn loaded_tree(paths: &[&str]) -> (MemoryProvider, Tree) {
    let provider = MemoryProvider::from_paths(paths.iter().copied());
    let mut tree = Tree::new(provider.clone(), TreeConfig::new(ROOT));
    pollster::block_on(tree.ensure_loaded(tree.root())).expect("root listing");
    (provider, tree)
}

/// Resolves a root-relative path, loading along the way.
pub(crate) fn node(tree: &mut Tree, rel: &str) -> NodeId {
    pollster::block_on(tree.force_load_node_at_path(rel))
        .unwrap_or_else(|err| panic!("resolving {rel}: {err}"))
}

pub(crate) fn expand(tree: &mut Tree, rel: &str) -> NodeId {
    let id = node(tree, rel);
    pollster::block_on(tree.set_expanded(id, true)).expect("expand");
    id
}

/// Names of the rows visible from the root, in order.
pub(crate) fn rows(tree: &Tree) -> Vec<String> {
    let h = tree.hierarchy();
    h.rows(0..h.row_count())
        .iter()
        .map(|&id| h.name(id).expect("live row").to_owned())
        .collect()
}

#[allow(dead_code, reason = "Not every test file records engine events.")]
pub(crate) fn record_events(tree: &mut Tree, kinds: EventKinds) -> Rc<RefCell<Vec<TreeEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    tree.subscribe(kinds, move |e| sink.borrow_mut().push(e.clone()));
    seen
}

#[allow(dead_code, reason = "Not every test file records state events.")]
pub(crate) fn record_state_events(tree: &mut Tree) -> Rc<RefCell<Vec<StateEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    tree.on_state_event(move |e| sink.borrow_mut().push(e.clone()));
    seen
}
