//! Snapshot store and watch registry.
//!
//! Every node key owns one [`NodeEntry`]: the current snapshot, published
//! through an atomic pointer so readers never block, and the pending watches
//! of that node grouped by resource type. Installing a snapshot, creating a
//! watch, resolving and cancelling watches all happen under the node's mutex,
//! which gives the ordering guarantees the discovery streams rely on:
//!
//! - a watch created concurrently with `set_snapshot` either sees the new
//!   version right away or is resolved by it, never neither;
//! - a watch is resolved at most once;
//! - once a watch is cancelled it can no longer be resolved.
//!
//! Resolution only enqueues into the subscriber's channel. The network send
//! happens later on the connection task, outside of any lock.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::watch::ResponseSink;
use super::watch::WatchHandle;
use super::watch::WatchId;
use super::watch::WatchOutcome;
use super::watch::WatchRequest;
use super::watch::WatchResponse;
use crate::metrics::PENDING_WATCHES;
use crate::metrics::SNAPSHOT_UPDATES;
use crate::metrics::WATCHES_RESOLVED;
use crate::CacheConfig;
use crate::CacheError;
use crate::Resource;
use crate::ResourceType;
use crate::Result;
use crate::Snapshot;
use crate::VersionToken;

/// A watch waiting for a newer version than the one its subscriber holds.
struct PendingWatch {
    request: WatchRequest,
    sink: ResponseSink,
}

#[derive(Default)]
struct NodeWatches {
    watches: HashMap<ResourceType, HashMap<WatchId, PendingWatch>>,
    last_watch_request: Option<Instant>,
}

/// Per-node state of the cache.
pub(crate) struct NodeEntry {
    key: String,
    snapshot: ArcSwapOption<Snapshot>,
    state: Mutex<NodeWatches>,
}

impl NodeEntry {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            snapshot: ArcSwapOption::empty(),
            state: Mutex::new(NodeWatches::default()),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Removes a pending watch. Returns false if it was already resolved or
    /// removed.
    pub(crate) fn remove_watch(
        &self,
        resource_type: ResourceType,
        id: WatchId,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(bucket) = state.watches.get_mut(&resource_type) else {
            return false;
        };
        let removed = bucket.remove(&id).is_some();
        if bucket.is_empty() {
            state.watches.remove(&resource_type);
        }
        if removed {
            PENDING_WATCHES.with_label_values(&[resource_type.as_str()]).dec();
        }
        removed
    }
}

/// Current resources of one type, returned by [`SnapshotCache::fetch`].
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub resource_type: ResourceType,
    pub version: VersionToken,
    pub resources: Arc<[Resource]>,
}

/// Introspection data for one node key.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub node_key: String,
    /// Versions of the installed snapshot, empty if none was ever set
    pub versions: BTreeMap<ResourceType, VersionToken>,
    pub pending_watches: BTreeMap<ResourceType, usize>,
    /// When a subscriber of this node last asked for a watch
    pub last_watch_request: Option<Instant>,
}

/// Process-local store of node snapshots and their pending watches.
///
/// The cache is an ordinary value: create as many as needed and share them
/// through `Arc`.
pub struct SnapshotCache {
    nodes: DashMap<String, Arc<NodeEntry>>,
    next_watch_id: AtomicU64,
    /// Hold responses until every requested resource name is present
    ads: bool,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("nodes", &self.nodes.len())
            .field("ads", &self.ads)
            .finish_non_exhaustive()
    }
}

impl SnapshotCache {
    /// Creates an empty cache.
    ///
    /// With `ads` set, a subscription that names specific resources is only
    /// answered once the snapshot contains all of them, so a proxy never
    /// receives a partial set of endpoints or routes over an aggregated
    /// stream.
    pub fn new(ads: bool) -> Self {
        Self {
            nodes: DashMap::new(),
            next_watch_id: AtomicU64::new(1),
            ads,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ads)
    }

    pub fn is_ads(&self) -> bool {
        self.ads
    }

    /// Installs `snapshot` as the state of `node_key` and resolves every
    /// pending watch of a type whose version changed.
    ///
    /// An invalid snapshot is rejected with
    /// [`CacheError::SnapshotInvariantViolation`]; the previous snapshot stays
    /// in place and no watch is touched.
    pub fn set_snapshot(
        &self,
        node_key: &str,
        snapshot: Snapshot,
    ) -> Result<()> {
        if let Err(violation) = snapshot.validate() {
            warn!(node = node_key, %violation, "Rejected snapshot");
            return Err(CacheError::SnapshotInvariantViolation(violation).into());
        }

        let node = self.node_entry(node_key);
        let snapshot = Arc::new(snapshot);
        let mut resolved = 0usize;
        {
            let mut state = node.state.lock();
            let previous = node.snapshot.swap(Some(snapshot.clone()));

            for resource_type in snapshot.resource_types() {
                let version = snapshot.version(resource_type);
                if previous.as_ref().and_then(|p| p.version(resource_type)) == version {
                    continue;
                }
                let Some(bucket) = state.watches.get_mut(&resource_type) else {
                    continue;
                };

                bucket.retain(|id, watch| {
                    if !self.should_respond(&watch.request, &snapshot) {
                        return true;
                    }
                    respond(*id, &watch.request, &snapshot, &watch.sink);
                    resolved += 1;
                    PENDING_WATCHES.with_label_values(&[resource_type.as_str()]).dec();
                    false
                });
                if bucket.is_empty() {
                    state.watches.remove(&resource_type);
                }
            }
        }

        SNAPSHOT_UPDATES.inc();
        info!(node = node_key, resolved_watches = resolved, "Snapshot installed");
        Ok(())
    }

    /// Returns the current snapshot of `node_key`.
    pub fn get_snapshot(
        &self,
        node_key: &str,
    ) -> Result<Arc<Snapshot>> {
        self.nodes
            .get(node_key)
            .and_then(|node| node.snapshot.load_full())
            .ok_or_else(|| CacheError::UnknownNode(node_key.to_string()).into())
    }

    /// Subscribes to changes of `request.resource_type` for
    /// `request.node_key`.
    ///
    /// If the current version differs from `request.version_known` the
    /// current resources are sent to `sink` immediately and nothing is
    /// registered. Otherwise the watch waits for a future
    /// [`set_snapshot`](Self::set_snapshot); this includes nodes that have
    /// no snapshot yet.
    pub fn create_watch(
        &self,
        request: WatchRequest,
        sink: ResponseSink,
    ) -> WatchOutcome {
        let id = self.next_watch_id.fetch_add(1, Ordering::Relaxed);
        let resource_type = request.resource_type;
        let node = self.node_entry(&request.node_key);

        {
            let mut state = node.state.lock();
            state.last_watch_request = Some(Instant::now());

            match node.snapshot.load_full() {
                Some(snapshot) if self.should_respond(&request, &snapshot) => {
                    respond(id, &request, &snapshot, &sink);
                    return WatchOutcome::Resolved(id);
                }
                Some(_) => {}
                None => debug!(
                    node = %request.node_key,
                    resource_type = %resource_type,
                    "No snapshot for node yet, deferring response"
                ),
            }

            trace!(
                watch_id = id,
                node = %request.node_key,
                resource_type = %resource_type,
                version = ?request.version_known,
                "Watch registered"
            );
            state
                .watches
                .entry(resource_type)
                .or_default()
                .insert(id, PendingWatch { request, sink });
            PENDING_WATCHES.with_label_values(&[resource_type.as_str()]).inc();
        }

        WatchOutcome::Pending(WatchHandle::new(id, resource_type, node))
    }

    /// Removes a pending watch without a response.
    pub fn cancel_watch(
        &self,
        handle: WatchHandle,
    ) {
        handle.cancel();
    }

    /// Returns the current resources of a type without registering a watch.
    pub fn fetch(
        &self,
        request: &WatchRequest,
    ) -> Result<FetchResponse> {
        let snapshot = self.get_snapshot(&request.node_key)?;
        let resource_type = request.resource_type;
        let Some(version) = snapshot.version(resource_type) else {
            return Err(CacheError::ResourceTypeAbsent {
                node_key: request.node_key.clone(),
                resource_type,
            }
            .into());
        };

        if request.version_known.as_ref() == Some(version) {
            return Err(CacheError::VersionUpToDate {
                node_key: request.node_key.clone(),
                resource_type,
                version: version.to_string(),
            }
            .into());
        }

        Ok(FetchResponse {
            resource_type,
            version: version.clone(),
            resources: request.filter(snapshot.shared_resources(resource_type)),
        })
    }

    /// All node keys the cache has seen, through a snapshot or a watch.
    pub fn node_keys(&self) -> Vec<String> {
        self.nodes.iter().map(|e| e.key().clone()).collect()
    }

    pub fn node_status(
        &self,
        node_key: &str,
    ) -> Option<NodeStatus> {
        let node = self.nodes.get(node_key)?.clone();
        let state = node.state.lock();
        let versions = node
            .snapshot
            .load_full()
            .map(|s| {
                s.resource_types()
                    .filter_map(|t| s.version(t).map(|v| (t, v.clone())))
                    .collect()
            })
            .unwrap_or_default();

        Some(NodeStatus {
            node_key: node_key.to_string(),
            versions,
            pending_watches: state.watches.iter().map(|(t, w)| (*t, w.len())).collect(),
            last_watch_request: state.last_watch_request,
        })
    }

    /// Number of pending watches for one node and type.
    pub fn pending_watch_count(
        &self,
        node_key: &str,
        resource_type: ResourceType,
    ) -> usize {
        self.nodes
            .get(node_key)
            .map(|node| node.state.lock().watches.get(&resource_type).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    fn node_entry(
        &self,
        node_key: &str,
    ) -> Arc<NodeEntry> {
        if let Some(node) = self.nodes.get(node_key) {
            return node.clone();
        }
        self.nodes
            .entry(node_key.to_string())
            .or_insert_with(|| Arc::new(NodeEntry::new(node_key)))
            .clone()
    }

    /// Whether `snapshot` carries something `request` does not hold yet.
    fn should_respond(
        &self,
        request: &WatchRequest,
        snapshot: &Snapshot,
    ) -> bool {
        let resource_type = request.resource_type;
        let Some(version) = snapshot.version(resource_type) else {
            return false;
        };
        if request.version_known.as_ref() == Some(version) {
            return false;
        }
        if self.ads && !request.is_satisfied_by(snapshot.resources(resource_type)) {
            debug!(
                node = %request.node_key,
                resource_type = %resource_type,
                requested = ?request.resource_names,
                "Holding response until all requested resources are present"
            );
            return false;
        }
        true
    }
}

/// Delivers the resources of `snapshot` that `request` asks for.
fn respond(
    watch_id: WatchId,
    request: &WatchRequest,
    snapshot: &Snapshot,
    sink: &ResponseSink,
) {
    let resource_type = request.resource_type;
    let Some(version) = snapshot.version(resource_type) else {
        return;
    };

    let response = WatchResponse {
        watch_id,
        node_key: request.node_key.clone(),
        resource_type,
        version: version.clone(),
        resources: request.filter(snapshot.shared_resources(resource_type)),
    };

    trace!(
        watch_id,
        node = %request.node_key,
        resource_type = %resource_type,
        version = %version,
        resources = response.resources.len(),
        "Watch resolved"
    );
    WATCHES_RESOLVED.with_label_values(&[resource_type.as_str()]).inc();

    if sink.send(response).is_err() {
        // The owning stream is gone; its handle drop will clean up.
        trace!(watch_id, "Watch sink closed");
    }
}
