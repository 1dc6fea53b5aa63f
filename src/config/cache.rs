use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::ClusterHash;
use crate::IdHash;
use crate::NodeHash;

/// Which node field snapshots are keyed by.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeHashKind {
    /// One snapshot per proxy (`Node.id`)
    #[default]
    Id,
    /// One snapshot per service cluster (`Node.cluster`)
    Cluster,
}

impl NodeHashKind {
    pub fn build(self) -> Arc<dyn NodeHash> {
        match self {
            NodeHashKind::Id => Arc::new(IdHash),
            NodeHashKind::Cluster => Arc::new(ClusterHash),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Answer named subscriptions only once every requested resource exists
    /// Default: false
    #[serde(default)]
    pub ads: bool,

    #[serde(default)]
    pub node_hash: NodeHashKind,
}
