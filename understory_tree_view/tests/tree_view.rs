// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for loading, expansion, and structural edits through [`Tree`].

mod common;

use common::{ROOT, expand, loaded_tree, node, record_events, rows};
use serde_json::json;
use understory_tree_view::{
    EventKinds, MemoryProvider, Metadata, MetadataChange, NodeKind, Tree, TreeConfig, TreeError,
    TreeEvent,
};

#[test]
fn expanding_a_directory_splices_its_rows() {
    let (_, mut tree) = loaded_tree(&["b", "a", "dir1/x", "dir1/y"]);
    let root = tree.root();
    assert_eq!(rows(&tree), ["dir1", "a", "b"]);
    assert_eq!(tree.hierarchy().branch_size(root), 3);

    let dir1 = expand(&mut tree, "dir1");
    assert_eq!(rows(&tree), ["dir1", "x", "y", "a", "b"]);
    assert_eq!(tree.hierarchy().branch_size(root), 5);
    assert_eq!(tree.hierarchy().flattened_branch(dir1), None);

    tree.set_collapsed(dir1).unwrap();
    assert_eq!(rows(&tree), ["dir1", "a", "b"]);
    assert_eq!(tree.hierarchy().branch_size(dir1), 2);
    tree.hierarchy().validate().unwrap();
}

#[test]
fn root_leaves_load_sorted() {
    let (_, tree) = loaded_tree(&["b", "a"]);
    assert_eq!(rows(&tree), ["a", "b"]);
}

#[test]
fn expand_then_collapse_restores_every_array() {
    let (_, mut tree) = loaded_tree(&["a/b/c/d", "a/b/e", "a/f", "g/h", "i"]);
    expand(&mut tree, "a/b/c");
    let before = rows(&tree);
    let a = node(&mut tree, "a");
    let own_root = tree.hierarchy().flattened_branch(tree.root()).unwrap().to_vec();

    tree.set_collapsed(a).unwrap();
    tree.hierarchy().validate().unwrap();
    assert_eq!(rows(&tree), ["a", "g", "i"]);

    pollster::block_on(tree.set_expanded(a, true)).unwrap();
    assert_eq!(rows(&tree), before);
    assert_eq!(tree.hierarchy().flattened_branch(tree.root()).unwrap(), own_root.as_slice());
    tree.hierarchy().validate().unwrap();
}

#[test]
fn rows_and_row_lookup_agree() {
    let (_, mut tree) = loaded_tree(&["a/b/c", "a/d", "e/f", "g"]);
    expand(&mut tree, "a/b");
    expand(&mut tree, "e");
    let h = tree.hierarchy();
    for index in 0..h.row_count() {
        let id = h.row(index).unwrap();
        assert_eq!(h.row_of(id), Some(index));
        assert!(h.is_item_visible_at_surface(h.root(), id));
    }
    assert_eq!(h.row(h.row_count()), None);
}

#[test]
fn paths_round_trip_through_resolution() {
    let (_, mut tree) = loaded_tree(&["a/b/c", "a/d", "e"]);
    expand(&mut tree, "a/b");
    let ids: Vec<_> = tree.hierarchy().rows(0..usize::MAX).to_vec();
    for id in ids {
        let absolute = tree.hierarchy().path(id).unwrap().to_owned();
        let relative = tree.hierarchy().relative_path(id).unwrap().to_owned();
        assert!(absolute.starts_with(ROOT));
        assert_eq!(node(&mut tree, &absolute), id);
        assert_eq!(node(&mut tree, &relative), id);
    }
}

#[test]
fn missing_segments_report_the_requested_path() {
    let (_, mut tree) = loaded_tree(&["a/b"]);
    let err = pollster::block_on(tree.force_load_node_at_path("a/nope/deeper")).unwrap_err();
    assert_eq!(
        err,
        TreeError::PathNotFound {
            path: "a/nope/deeper".into()
        }
    );
    let a = node(&mut tree, "a");
    let b = pollster::block_on(tree.force_load_node_at_path_from(a, "b")).unwrap();
    assert_eq!(tree.hierarchy().name(b), Some("b"));
}

#[test]
fn rename_fires_only_a_path_change() {
    let (_, mut tree) = loaded_tree(&["src/a.rs", "src/b.rs", "docs/"]);
    let src = expand(&mut tree, "src");
    let a = node(&mut tree, "src/a.rs");
    let seen = record_events(&mut tree, EventKinds::PARENT | EventKinds::PATH);

    tree.move_node(a, Some(src), Some("z.rs")).unwrap();
    assert_eq!(
        *seen.borrow(),
        [TreeEvent::DidChangePath {
            node: a,
            old: format!("{ROOT}/src/a.rs"),
            new: format!("{ROOT}/src/z.rs"),
        }]
    );
    assert_eq!(rows(&tree), ["docs", "src", "b.rs", "z.rs"]);

    // Same parent, same name: nothing happens.
    seen.borrow_mut().clear();
    tree.move_node(a, Some(src), Some("z.rs")).unwrap();
    assert!(seen.borrow().is_empty());
    tree.hierarchy().validate().unwrap();
}

#[test]
fn reparenting_moves_the_visible_subtree() {
    let (_, mut tree) = loaded_tree(&["src/a.rs", "src/b.rs", "docs/"]);
    let root = tree.root();
    let src = expand(&mut tree, "src");
    let docs = node(&mut tree, "docs");
    let a = node(&mut tree, "src/a.rs");
    pollster::block_on(tree.ensure_loaded(docs)).unwrap();
    let seen = record_events(&mut tree, EventKinds::PARENT | EventKinds::PATH);

    tree.move_node(src, Some(docs), None).unwrap();
    assert_eq!(
        *seen.borrow(),
        [
            TreeEvent::WillChangeParent {
                node: src,
                old: Some(root),
                new: Some(docs)
            },
            TreeEvent::DidChangeParent {
                node: src,
                old: Some(root),
                new: Some(docs)
            },
            TreeEvent::DidChangePath {
                node: src,
                old: format!("{ROOT}/src"),
                new: format!("{ROOT}/docs/src"),
            },
        ]
    );
    // `docs` is collapsed, so it now owns the moved rows.
    assert_eq!(rows(&tree), ["docs"]);
    assert_eq!(tree.hierarchy().branch_size(docs), 3);
    assert_eq!(tree.hierarchy().path(a), Some("/workspace/docs/src/a.rs"));
    assert_eq!(tree.hierarchy().depth(a), Some(3));

    pollster::block_on(tree.set_expanded(docs, true)).unwrap();
    assert_eq!(rows(&tree), ["docs", "src", "a.rs", "b.rs"]);
    tree.hierarchy().validate().unwrap();
}

#[test]
fn moving_into_an_unloaded_directory_disposes_the_node() {
    let (_, mut tree) = loaded_tree(&["a/x", "b/y"]);
    let x = node(&mut tree, "a/x");
    let a = tree.hierarchy().parent(x).unwrap();
    let b = node(&mut tree, "b");
    assert!(!tree.hierarchy().is_loaded(b));
    let seen = record_events(&mut tree, EventKinds::PARENT | EventKinds::LIFECYCLE);

    tree.move_node(x, Some(b), None).unwrap();
    // Reported as a removal; no parent change names a disposed handle.
    assert_eq!(
        *seen.borrow(),
        [
            TreeEvent::WillChangeParent {
                node: x,
                old: Some(a),
                new: None
            },
            TreeEvent::DidChangeParent {
                node: x,
                old: Some(a),
                new: None
            },
            TreeEvent::Disposed { node: x },
        ]
    );
    assert!(!tree.hierarchy().is_alive(x));
    assert!(!tree.hierarchy().is_loaded(b));
    tree.hierarchy().validate().unwrap();
}

#[test]
fn moving_to_nowhere_disposes_the_subtree() {
    let (_, mut tree) = loaded_tree(&["a/x", "b"]);
    let a = expand(&mut tree, "a");
    let x = node(&mut tree, "a/x");
    let seen = record_events(&mut tree, EventKinds::PARENT | EventKinds::LIFECYCLE);

    tree.move_node(a, None, None).unwrap();
    let root = tree.root();
    assert_eq!(
        *seen.borrow(),
        [
            TreeEvent::WillChangeParent {
                node: a,
                old: Some(root),
                new: None
            },
            TreeEvent::DidChangeParent {
                node: a,
                old: Some(root),
                new: None
            },
            TreeEvent::Disposed { node: x },
            TreeEvent::Disposed { node: a },
        ]
    );
    assert_eq!(rows(&tree), ["b"]);
    assert_eq!(tree.move_node(a, None, None), Err(TreeError::StaleNode(a)));
}

#[test]
#[should_panic(expected = "into its own subtree")]
fn moving_under_a_descendant_panics() {
    let (_, mut tree) = loaded_tree(&["a/b/c"]);
    let a = node(&mut tree, "a");
    let b = node(&mut tree, "a/b");
    let _ = tree.move_node(a, Some(b), None);
}

#[test]
fn host_created_nodes_insert_sorted() {
    let (_, mut tree) = loaded_tree(&["a/", "c"]);
    let root = tree.root();
    let b = tree.create_node(NodeKind::Leaf, "b", Metadata::new());
    assert!(tree.insert_item(root, b).unwrap());
    assert_eq!(rows(&tree), ["a", "b", "c"]);

    let a = node(&mut tree, "a");
    let orphan = tree.create_node(NodeKind::Leaf, "late", Metadata::new());
    assert!(!tree.insert_item(a, orphan).unwrap(), "a is not loaded yet");
    assert!(!tree.hierarchy().is_alive(orphan));

    let leaf = node(&mut tree, "c");
    let other = tree.create_node(NodeKind::Leaf, "d", Metadata::new());
    assert_eq!(tree.insert_item(leaf, other), Err(TreeError::NotComposite(leaf)));
}

#[test]
fn metadata_changes_are_classified() {
    let (_, mut tree) = loaded_tree(&["a"]);
    let a = node(&mut tree, "a");
    let seen = record_events(&mut tree, EventKinds::METADATA);

    tree.add_metadata(a, "size", json!(1)).unwrap();
    tree.add_metadata(a, "size", json!(1)).unwrap();
    tree.add_metadata(a, "size", json!(2)).unwrap();
    tree.remove_metadata(a, "size").unwrap();
    tree.remove_metadata(a, "size").unwrap();

    let changes: Vec<MetadataChange> = seen
        .borrow()
        .iter()
        .map(|e| match e {
            TreeEvent::MetadataChanged { change, .. } => change.clone(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(
        changes,
        [
            MetadataChange::Added { value: json!(1) },
            MetadataChange::Updated {
                old: json!(1),
                new: json!(2)
            },
            MetadataChange::Removed { old: json!(2) },
        ]
    );
    assert_eq!(tree.hierarchy().metadata(a, "size"), None);
}

#[test]
fn concurrent_loads_share_one_provider_call() {
    let provider = MemoryProvider::from_paths(["a", "b"]);
    let mut tree = Tree::new(provider.clone(), TreeConfig::default());
    let root = tree.root();
    let first = tree.begin_load(root).unwrap().unwrap();
    let second = tree.begin_load(root).unwrap().unwrap();
    assert_eq!(provider.call_count(), 1);

    let outcome = pollster::block_on(second);
    assert!(tree.complete_load(outcome).unwrap());
    let outcome = pollster::block_on(first);
    assert!(!tree.complete_load(outcome).unwrap());
    assert_eq!(rows(&tree), ["a", "b"]);
}

#[test]
fn reload_joins_a_load_already_in_flight() {
    let provider = MemoryProvider::from_paths(["a", "b"]);
    let mut tree = Tree::new(provider.clone(), TreeConfig::new(ROOT));
    let root = tree.root();
    let pending = tree.begin_load(root).unwrap().unwrap();

    pollster::block_on(tree.reload(root)).unwrap();
    assert_eq!(provider.call_count(), 1);
    assert!(!tree.hierarchy().is_loading(root));
    assert_eq!(rows(&tree), ["a", "b"]);

    let outcome = pollster::block_on(pending);
    assert!(!tree.complete_load(outcome).unwrap());
    assert_eq!(rows(&tree), ["a", "b"]);
    tree.hierarchy().validate().unwrap();
}

#[test]
fn detached_composites_cannot_be_listed() {
    let (provider, mut tree) = loaded_tree(&["a/x", "b"]);
    let calls = provider.call_count();
    let z = tree.create_node(NodeKind::Composite, "z", Metadata::new());
    assert!(!tree.hierarchy().is_attached(z));
    assert_eq!(tree.hierarchy().relative_path(z), None);

    assert_eq!(
        pollster::block_on(tree.ensure_loaded(z)),
        Err(TreeError::Detached(z))
    );
    assert_eq!(tree.begin_load(z).unwrap_err(), TreeError::Detached(z));
    assert_eq!(
        pollster::block_on(tree.set_expanded(z, true)),
        Err(TreeError::Detached(z))
    );
    assert_eq!(
        pollster::block_on(tree.reload(z)),
        Err(TreeError::Detached(z))
    );
    assert_eq!(provider.call_count(), calls);
    assert!(!tree.hierarchy().is_loaded(z));
    assert!(!tree.hierarchy().is_expanded(z));

    // Once linked it lists like any other directory.
    let root = tree.root();
    assert!(tree.insert_item(root, z).unwrap());
    assert!(tree.hierarchy().is_attached(z));
    provider.add_path("z/");
    pollster::block_on(tree.ensure_loaded(z)).unwrap();
    assert_eq!(tree.hierarchy().children(z), Some(&[][..]));
}

#[test]
fn provider_failure_is_retryable() {
    let (provider, mut tree) = loaded_tree(&["a/x"]);
    let a = node(&mut tree, "a");
    provider.fail_path("a", true);
    let err = pollster::block_on(tree.set_expanded(a, true)).unwrap_err();
    assert!(matches!(err, TreeError::Provider(_)));
    assert!(!tree.hierarchy().is_loaded(a));
    assert!(!tree.hierarchy().is_expanded(a));

    provider.fail_path("a", false);
    pollster::block_on(tree.set_expanded(a, true)).unwrap();
    assert_eq!(rows(&tree), ["a", "x"]);
}

#[test]
fn collapse_during_load_cancels_the_expansion() {
    let (_, mut tree) = loaded_tree(&["a/x"]);
    let a = node(&mut tree, "a");
    let load = tree.request_expand(a).unwrap().expect("a is not loaded");
    tree.set_collapsed(a).unwrap();

    let outcome = pollster::block_on(load);
    assert_eq!(tree.finish_expand(a, Some(outcome), true), Ok(false));
    assert!(tree.hierarchy().is_loaded(a));
    assert!(!tree.hierarchy().is_expanded(a));
    assert_eq!(rows(&tree), ["a"]);
}

#[test]
fn reload_reconciles_children() {
    let (provider, mut tree) = loaded_tree(&["a/x", "b", "c"]);
    let a = expand(&mut tree, "a");
    let c = node(&mut tree, "c");
    provider.remove_path("b");
    provider.add_path("bb/");
    pollster::block_on(tree.reload(tree.root())).unwrap();

    assert_eq!(node(&mut tree, "a"), a);
    assert_eq!(node(&mut tree, "c"), c);
    assert_eq!(rows(&tree), ["a", "x", "bb", "c"]);
    tree.hierarchy().validate().unwrap();
}
