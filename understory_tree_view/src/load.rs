// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Children loading: the provider seam, shared in-flight loads, reloads, and
//! path resolution.
//!
//! A load has two halves. [`Hierarchy::begin_load`] asks the provider for a
//! listing and hands back a [`PendingLoad`]; awaiting it needs no access to the
//! tree. The outcome is then given back to [`Hierarchy::complete_load`], which
//! installs the children. Concurrent requests for the same node share one
//! provider call.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, ready};
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::error::{ProviderError, TreeError};
use crate::events::TreeEvent;
use crate::hierarchy::Hierarchy;
use crate::node::Node;
use crate::path;
use crate::types::{Metadata, NodeId, NodeKind};

/// What the provider is asked to list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildrenRequest {
    /// The composite whose children are wanted.
    pub node: NodeId,
    /// Its absolute path.
    pub path: String,
    /// Its path relative to the root (`""` for the root).
    pub relative_path: String,
    /// Its depth below the root.
    pub depth: usize,
}

/// One entry of a provider listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildDescriptor {
    /// Last path segment.
    pub name: String,
    /// Leaf or composite.
    pub kind: NodeKind,
    /// Initial metadata.
    pub metadata: Metadata,
}

impl ChildDescriptor {
    /// A leaf entry without metadata.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Leaf,
            metadata: Metadata::new(),
        }
    }

    /// A composite entry without metadata.
    pub fn composite(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Composite,
            metadata: Metadata::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Supplies the children of composite nodes.
///
/// The returned future may complete at any time; the tree never holds a
/// borrow of itself across it.
pub trait ChildrenProvider {
    /// Lists the children of `request.node`, in any order.
    fn children(
        &self,
        request: ChildrenRequest,
    ) -> LocalBoxFuture<'static, Result<Vec<ChildDescriptor>, ProviderError>>;
}

/// Result of one provider call, shared by everyone awaiting it.
pub type LoadResult = Result<Rc<[ChildDescriptor]>, ProviderError>;

/// An in-flight provider call for one node.
///
/// Cloning is cheap; every clone resolves to the same [`LoadOutcome`].
#[derive(Clone)]
#[must_use = "a pending load does nothing unless awaited and completed"]
pub struct PendingLoad {
    node: NodeId,
    ticket: u64,
    inner: Shared<LocalBoxFuture<'static, LoadResult>>,
}

impl core::fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingLoad")
            .field("node", &self.node)
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

impl PendingLoad {
    /// The node being loaded.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Future for PendingLoad {
    type Output = LoadOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<LoadOutcome> {
        let result = ready!(self.inner.poll_unpin(cx));
        Poll::Ready(LoadOutcome {
            node: self.node,
            ticket: self.ticket,
            result,
        })
    }
}

/// A finished provider call, to be handed to
/// [`Tree::complete_load`](crate::Tree::complete_load).
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    node: NodeId,
    ticket: u64,
    result: LoadResult,
}

impl LoadOutcome {
    /// The node that was loaded.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The provider's listing or failure.
    #[must_use]
    pub fn result(&self) -> &LoadResult {
        &self.result
    }
}

impl Hierarchy {
    /// Starts a provider call, or joins the one already in flight.
    ///
    /// Fails with [`TreeError::Detached`] for nodes not linked under the root.
    pub(crate) fn start_load(&mut self, id: NodeId) -> Result<PendingLoad, TreeError> {
        if let Some(pending) = self.pending.get(&id) {
            log::trace!("joining in-flight load of {id}");
            return Ok(pending.clone());
        }
        let load = self.spawn_load(id)?;
        self.pending.insert(id, load.clone());
        Ok(load)
    }

    fn children_request(&self, id: NodeId) -> Result<ChildrenRequest, TreeError> {
        let node = self.registry.get(id).ok_or(TreeError::StaleNode(id))?;
        let relative_path = self.relative_path(id).ok_or(TreeError::Detached(id))?;
        Ok(ChildrenRequest {
            node: id,
            path: self.path(id).unwrap_or_default().to_owned(),
            relative_path: relative_path.to_owned(),
            depth: node.depth,
        })
    }

    fn spawn_load(&mut self, id: NodeId) -> Result<PendingLoad, TreeError> {
        let request = self.children_request(id)?;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        log::debug!("loading children of {id} ({})", request.path);
        let inner = self
            .provider
            .children(request)
            .map(|result| result.map(Rc::<[ChildDescriptor]>::from))
            .boxed_local()
            .shared();
        Ok(PendingLoad {
            node: id,
            ticket,
            inner,
        })
    }

    /// Returns the load to await, or `None` if the children are already
    /// materialized.
    pub(crate) fn begin_load(&mut self, id: NodeId) -> Result<Option<PendingLoad>, TreeError> {
        if self.branch_of(id)?.children.is_some() {
            return Ok(None);
        }
        self.start_load(id).map(Some)
    }

    /// Releases the in-flight guard, unless a newer load has replaced it.
    fn settle(&mut self, outcome: &LoadOutcome) {
        if self
            .pending
            .get(&outcome.node)
            .is_some_and(|p| p.ticket() == outcome.ticket)
        {
            self.pending.remove(&outcome.node);
        }
    }

    /// Installs a finished listing.
    ///
    /// Returns `Ok(false)` when the result was discarded because the node is
    /// gone or already loaded. A provider failure installs nothing, so the
    /// next request retries.
    pub(crate) fn complete_load(&mut self, outcome: LoadOutcome) -> Result<bool, TreeError> {
        self.settle(&outcome);
        let listing = match outcome.result {
            Ok(listing) => listing,
            Err(err) => {
                log::debug!("loading children of {} failed: {err}", outcome.node);
                return Err(err.into());
            }
        };
        let loaded = self
            .registry
            .get(outcome.node)
            .and_then(Node::branch)
            .map(|b| b.children.is_some());
        match loaded {
            Some(false) => {
                self.install_children(outcome.node, &listing);
                Ok(true)
            }
            Some(true) => {
                log::trace!("discarding duplicate listing for {}", outcome.node);
                Ok(false)
            }
            None => {
                log::trace!("discarding listing for disposed {}", outcome.node);
                Ok(false)
            }
        }
    }

    /// Loads a node's children if they are not loaded yet.
    pub(crate) async fn ensure_loaded(&mut self, id: NodeId) -> Result<(), TreeError> {
        if let Some(load) = self.begin_load(id)? {
            let outcome = load.await;
            self.complete_load(outcome)?;
        }
        Ok(())
    }

    /// Fetches a fresh listing and reconciles it with the loaded children.
    ///
    /// Children whose name and kind still appear keep their handles and
    /// expansion state; vanished ones are disposed and new ones inserted.
    /// A listing already in flight for the node is joined rather than
    /// requested twice.
    pub(crate) async fn reload(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.branch_of(id)?;
        let load = self.start_load(id)?;
        let outcome = load.await;
        self.settle(&outcome);
        let listing = outcome.result?;
        let loaded = self
            .registry
            .get(id)
            .and_then(Node::branch)
            .map(|b| b.children.is_some());
        match loaded {
            None => return Err(TreeError::StaleNode(id)),
            Some(false) => self.install_children(id, &listing),
            Some(true) => self.reconcile(id, &listing),
        }
        Ok(())
    }

    fn install_children(&mut self, id: NodeId, listing: &[ChildDescriptor]) {
        let depth = self.registry.node(id).depth + 1;
        let mut children: Vec<NodeId> = listing
            .iter()
            .map(|d| {
                let mut node = Node::new(d.kind, d.name.clone(), d.metadata.clone());
                node.parent = Some(id);
                node.depth = depth;
                self.registry.insert(node)
            })
            .collect();
        let comparator = self.comparator.clone();
        children.sort_by(|&a, &b| comparator(&self.entry_ref(a), &self.entry_ref(b)));

        let node = self.registry.node_mut(id);
        let is_boundary = node.parent.is_none();
        let branch = node.branch_mut().expect("children are only installed on composites");
        let is_boundary = is_boundary || !branch.is_expanded();
        debug_assert!(is_boundary, "unloaded composites are never expanded below a boundary");
        branch.size = children.len();
        branch.flat = Some(children.as_slice().into());
        branch.children = Some(children);
        log::debug!("installed {} children under {id}", listing.len());
        self.events.publish(TreeEvent::ChildrenLoaded { node: id });
        self.events.publish(TreeEvent::BranchUpdated { owner: id });
    }

    fn reconcile(&mut self, id: NodeId, listing: &[ChildDescriptor]) {
        let wanted: HashMap<(&str, NodeKind), &ChildDescriptor> = listing
            .iter()
            .map(|d| ((d.name.as_str(), d.kind), d))
            .collect();
        let current = self.children(id).unwrap_or_default().to_vec();
        let mut kept: HashSet<(String, NodeKind)> = HashSet::new();
        for child in current {
            let node = self.registry.node(child);
            let key = (node.name.clone(), node.kind());
            match wanted.get(&(key.0.as_str(), key.1)) {
                Some(descriptor) => {
                    self.refresh_metadata(child, &descriptor.metadata);
                    kept.insert(key);
                }
                None => {
                    log::debug!("{} vanished from {id}", key.0);
                    self.unlink_item(child, false);
                }
            }
        }
        for descriptor in listing {
            if kept.contains(&(descriptor.name.clone(), descriptor.kind)) {
                continue;
            }
            let child = self.create_node(
                descriptor.kind,
                descriptor.name.clone(),
                descriptor.metadata.clone(),
            );
            self.insert_item(id, child);
        }
    }

    fn refresh_metadata(&mut self, id: NodeId, fresh: &Metadata) {
        let stale: Vec<String> = self
            .registry
            .node(id)
            .metadata
            .keys()
            .filter(|k| !fresh.contains_key(*k))
            .cloned()
            .collect();
        for key in stale {
            self.remove_metadata(id, &key);
        }
        for (key, value) in fresh {
            self.add_metadata(id, key.clone(), value.clone());
        }
    }

    /// Resolves a path, loading every composite along the way.
    ///
    /// Absolute paths must lie under the root; relative paths are resolved
    /// from the root.
    pub(crate) async fn force_load_node_at_path(&mut self, target: &str) -> Result<NodeId, TreeError> {
        let not_found = || TreeError::PathNotFound {
            path: target.to_owned(),
        };
        let relative = if path::is_absolute(target) {
            let root_path = self.path(self.root).unwrap_or_default();
            path::relative(root_path, target).ok_or_else(not_found)?.to_owned()
        } else {
            target.to_owned()
        };
        self.force_load_node_at_path_from(self.root, &relative)
            .await
            .map_err(|err| match err {
                TreeError::PathNotFound { .. } => not_found(),
                other => other,
            })
    }

    /// Resolves a path relative to `start`, loading every composite along
    /// the way.
    pub(crate) async fn force_load_node_at_path_from(
        &mut self,
        start: NodeId,
        relative: &str,
    ) -> Result<NodeId, TreeError> {
        if !self.is_alive(start) {
            return Err(TreeError::StaleNode(start));
        }
        let not_found = || TreeError::PathNotFound {
            path: relative.to_owned(),
        };
        let segments: SmallVec<[&str; 8]> = path::segments(relative).collect();
        let mut current = start;
        for segment in segments {
            if self.kind(current) != Some(NodeKind::Composite) {
                return Err(not_found());
            }
            self.ensure_loaded(current).await?;
            current = self.find_child(current, segment).ok_or_else(not_found)?;
        }
        Ok(current)
    }
}
