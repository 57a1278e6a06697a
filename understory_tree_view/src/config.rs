// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-tree configuration.

use core::cmp::Ordering;
use core::fmt;
use std::rc::Rc;

use crate::types::{Comparator, EntryRef, default_comparator};

/// Settings fixed when a [`Tree`](crate::Tree) is created.
///
/// ```rust
/// use understory_tree_view::TreeConfig;
///
/// // Case-insensitive ordering, no directories-first rule.
/// let config = TreeConfig::new("/workspace")
///     .with_comparator(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
/// assert_eq!(config.root_path(), "/workspace");
/// ```
#[derive(Clone)]
pub struct TreeConfig {
    root_path: String,
    comparator: Comparator,
}

impl fmt::Debug for TreeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeConfig")
            .field("root_path", &self.root_path)
            .finish_non_exhaustive()
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new("/")
    }
}

impl TreeConfig {
    /// Creates a configuration whose root node has the given absolute path.
    pub fn new(root_path: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            comparator: Rc::new(default_comparator),
        }
    }

    /// Replaces the sibling ordering.
    #[must_use]
    pub fn with_comparator(
        mut self,
        comparator: impl Fn(&EntryRef<'_>, &EntryRef<'_>) -> Ordering + 'static,
    ) -> Self {
        self.comparator = Rc::new(comparator);
        self
    }

    /// Absolute path of the root node.
    #[must_use]
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub(crate) fn comparator(&self) -> &Comparator {
        &self.comparator
    }
}
