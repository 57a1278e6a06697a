// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-memory [`ChildrenProvider`] for tests, demos, and benchmarks.

use core::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use hashbrown::{HashMap, HashSet};
use serde_json::Value;

use crate::error::ProviderError;
use crate::load::{ChildDescriptor, ChildrenProvider, ChildrenRequest};
use crate::path::{self, SEPARATOR};
use crate::types::{Metadata, NodeKind};

#[derive(Debug, Default)]
struct Listing {
    dirs: HashMap<String, Vec<ChildDescriptor>>,
    failing: HashSet<String>,
}

/// A directory tree held in memory, keyed by paths relative to the root.
///
/// A path with a trailing `/` names an empty directory; intermediate
/// directories are created on demand. Listings are returned in insertion
/// order, so the tree's comparator does the sorting. Clones share state, which
/// lets a test keep a handle after giving one to a [`Tree`](crate::Tree).
///
/// ```rust
/// use understory_tree_view::{MemoryProvider, Tree, TreeConfig};
///
/// let provider = MemoryProvider::from_paths(["src/lib.rs", "src/main.rs", "README.md"]);
/// let mut tree = Tree::new(provider, TreeConfig::new("/project"));
/// let src = pollster::block_on(tree.force_load_node_at_path("/project/src")).unwrap();
/// assert_eq!(tree.hierarchy().children(src).map(<[_]>::len), Some(2));
/// ```
#[derive(Clone, Debug)]
pub struct MemoryProvider {
    inner: Rc<RefCell<Listing>>,
    calls: Rc<Cell<usize>>,
}

impl MemoryProvider {
    /// An empty tree: the root lists no children.
    pub fn new() -> Self {
        let mut listing = Listing::default();
        listing.dirs.insert(String::new(), Vec::new());
        Self {
            inner: Rc::new(RefCell::new(listing)),
            calls: Rc::default(),
        }
    }

    /// Builds a tree from a list of paths.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let provider = Self::new();
        for p in paths {
            provider.add_path(p.as_ref());
        }
        provider
    }

    /// Adds a leaf, or a directory when `target` ends with `/`.
    pub fn add_path(&self, target: &str) {
        let is_dir = target.ends_with(SEPARATOR);
        let segments: Vec<&str> = path::segments(target).collect();
        let mut inner = self.inner.borrow_mut();
        let mut dir = String::new();
        for (i, segment) in segments.iter().enumerate() {
            let kind = if is_dir || i + 1 < segments.len() {
                NodeKind::Composite
            } else {
                NodeKind::Leaf
            };
            let listing = inner.dirs.entry(dir.clone()).or_default();
            match listing.iter_mut().find(|d| d.name == *segment) {
                Some(existing) if kind.is_composite() => existing.kind = NodeKind::Composite,
                Some(_) => {}
                None => listing.push(ChildDescriptor {
                    name: (*segment).to_owned(),
                    kind,
                    metadata: Metadata::new(),
                }),
            }
            dir = path::join(&dir, segment);
            if kind.is_composite() {
                inner.dirs.entry(dir.clone()).or_default();
            }
        }
    }

    /// Removes an entry and everything below it.
    pub fn remove_path(&self, target: &str) {
        let (parent, name) = split(target);
        let mut inner = self.inner.borrow_mut();
        if let Some(listing) = inner.dirs.get_mut(&parent) {
            listing.retain(|d| d.name != name);
        }
        let full = path::join(&parent, &name);
        inner
            .dirs
            .retain(|dir, _| path::relative(&full, dir).is_none());
    }

    /// Sets a metadata value on an existing entry.
    pub fn set_metadata(&self, target: &str, key: impl Into<String>, value: Value) {
        let (parent, name) = split(target);
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner
            .dirs
            .get_mut(&parent)
            .and_then(|l| l.iter_mut().find(|d| d.name == name))
        {
            entry.metadata.insert(key.into(), value);
        }
    }

    /// Makes listings of directory `target` fail until called with `false`.
    pub fn fail_path(&self, target: &str, fail: bool) {
        let key = normalize(target);
        let mut inner = self.inner.borrow_mut();
        if fail {
            inner.failing.insert(key);
        } else {
            inner.failing.remove(&key);
        }
    }

    /// How many listings have been requested so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.get()
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildrenProvider for MemoryProvider {
    fn children(
        &self,
        request: ChildrenRequest,
    ) -> LocalBoxFuture<'static, Result<Vec<ChildDescriptor>, ProviderError>> {
        self.calls.set(self.calls.get() + 1);
        let inner = self.inner.borrow();
        let key = normalize(&request.relative_path);
        let result = if inner.failing.contains(&key) {
            Err(ProviderError::new(format!("cannot list '{}'", request.path)))
        } else {
            inner
                .dirs
                .get(&key)
                .cloned()
                .ok_or_else(|| ProviderError::new(format!("no such directory '{}'", request.path)))
        };
        future::ready(result).boxed_local()
    }
}

fn normalize(target: &str) -> String {
    path::segments(target).collect::<Vec<_>>().join("/")
}

fn split(target: &str) -> (String, String) {
    let normalized = normalize(target);
    match normalized.rsplit_once(SEPARATOR) {
        Some((parent, name)) => (parent.to_owned(), name.to_owned()),
        None => (String::new(), normalized),
    }
}
