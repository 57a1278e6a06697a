// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use crate::types::NodeId;

/// Failure reported by a [`ChildrenProvider`](crate::ChildrenProvider).
///
/// Cloneable so one failed listing can be handed to every caller that was
/// waiting on the same load.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("children provider failed: {message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    /// Creates an error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message passed to [`ProviderError::new`].
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors returned by tree operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The children provider rejected a listing. Nothing was installed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A path segment did not resolve, or resolved to a leaf with segments
    /// remaining.
    #[error("'{path}' not found")]
    PathNotFound {
        /// The path as it was requested.
        path: String,
    },
    /// The handle refers to a node that has been disposed.
    #[error("node {0} is not live")]
    StaleNode(NodeId),
    /// The operation needs a composite node.
    #[error("node {0} is not a composite")]
    NotComposite(NodeId),
    /// The node is not linked under the root, so it has no path to list.
    #[error("node {0} is detached from the tree")]
    Detached(NodeId),
}

/// A broken structural invariant, reported by
/// [`Hierarchy::validate`](crate::Hierarchy::validate).
///
/// Operations never return this: a broken invariant is a bug, and the
/// engine panics where it detects one during a mutation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invariant violated at {node}: {reason}")]
pub struct InvariantViolation {
    /// Where the problem was found.
    pub node: NodeId,
    /// What is wrong.
    pub reason: String,
}
