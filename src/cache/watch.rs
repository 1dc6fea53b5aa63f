use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use super::snapshot_cache::NodeEntry;
use crate::Resource;
use crate::ResourceType;
use crate::VersionToken;

pub type WatchId = u64;

/// Channel a watch delivers its single response into.
///
/// The channel is unbounded so resolution never waits while the node lock is
/// held. Its depth is bounded in practice: a connection keeps at most one
/// outstanding watch per resource type.
pub type ResponseSink = mpsc::UnboundedSender<WatchResponse>;

/// What a subscriber asks the cache for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub node_key: String,
    pub resource_type: ResourceType,
    /// Restricts the response to these names; empty means all resources.
    pub resource_names: Vec<String>,
    /// Version the subscriber already holds; `None` on first subscription.
    pub version_known: Option<VersionToken>,
}

impl WatchRequest {
    pub fn new(
        node_key: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            node_key: node_key.into(),
            resource_type,
            resource_names: Vec::new(),
            version_known: None,
        }
    }

    pub fn with_version(
        mut self,
        version: impl Into<VersionToken>,
    ) -> Self {
        self.version_known = Some(version.into());
        self
    }

    pub fn with_names<I, S>(
        mut self,
        names: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Applies the name filter. Names that do not exist are skipped.
    pub(crate) fn filter(
        &self,
        resources: Arc<[Resource]>,
    ) -> Arc<[Resource]> {
        if self.resource_names.is_empty() {
            return resources;
        }
        resources
            .iter()
            .filter(|r| self.resource_names.iter().any(|n| n == r.name()))
            .cloned()
            .collect()
    }

    /// True when every requested name exists in `resources`.
    pub(crate) fn is_satisfied_by(
        &self,
        resources: &[Resource],
    ) -> bool {
        self.resource_names
            .iter()
            .all(|n| resources.iter().any(|r| r.name() == n))
    }
}

/// The single response a watch resolves into.
#[derive(Debug, Clone)]
pub struct WatchResponse {
    pub watch_id: WatchId,
    pub node_key: String,
    pub resource_type: ResourceType,
    pub version: VersionToken,
    pub resources: Arc<[Resource]>,
}

/// Result of [`SnapshotCache::create_watch`](crate::SnapshotCache::create_watch).
#[derive(Debug)]
pub enum WatchOutcome {
    /// The response was delivered to the sink right away; nothing was
    /// registered.
    Resolved(WatchId),
    /// The watch is registered and will be resolved by a future snapshot.
    Pending(WatchHandle),
}

impl WatchOutcome {
    pub fn id(&self) -> WatchId {
        match self {
            WatchOutcome::Resolved(id) => *id,
            WatchOutcome::Pending(handle) => handle.id(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, WatchOutcome::Pending(_))
    }
}

/// Handle for a pending watch
///
/// When dropped, the watch is removed from the registry. Removal happens under
/// the node lock, so once the handle is gone the watch can no longer be
/// resolved.
pub struct WatchHandle {
    id: WatchId,
    resource_type: ResourceType,
    node: Arc<NodeEntry>,
}

impl WatchHandle {
    pub(super) fn new(
        id: WatchId,
        resource_type: ResourceType,
        node: Arc<NodeEntry>,
    ) -> Self {
        Self {
            id,
            resource_type,
            node,
        }
    }

    pub fn id(&self) -> WatchId {
        self.id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn node_key(&self) -> &str {
        self.node.key()
    }

    /// Cancels the watch. Equivalent to dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id)
            .field("resource_type", &self.resource_type)
            .field("node", &self.node.key())
            .finish()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.node.remove_watch(self.resource_type, self.id) {
            trace!(
                watch_id = self.id,
                node = self.node.key(),
                resource_type = %self.resource_type,
                "Watch cancelled"
            );
        }
    }
}
