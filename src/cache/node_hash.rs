use crate::constants::UNKNOWN_NODE_KEY;
use crate::proto::Node;

/// Maps the identity a proxy presents to the key its snapshot is stored
/// under.
///
/// Implementations must be deterministic and must never fail: a proxy without
/// usable metadata is mapped to a fallback key.
pub trait NodeHash: Send + Sync + 'static {
    fn id(
        &self,
        node: Option<&Node>,
    ) -> String;
}

/// Keys nodes by `Node.id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdHash;

impl NodeHash for IdHash {
    fn id(
        &self,
        node: Option<&Node>,
    ) -> String {
        match node {
            Some(node) if !node.id.is_empty() => node.id.clone(),
            _ => UNKNOWN_NODE_KEY.to_string(),
        }
    }
}

/// Keys nodes by `Node.cluster`, so every proxy of a service cluster shares
/// one snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterHash;

impl NodeHash for ClusterHash {
    fn id(
        &self,
        node: Option<&Node>,
    ) -> String {
        match node {
            Some(node) if !node.cluster.is_empty() => node.cluster.clone(),
            _ => UNKNOWN_NODE_KEY.to_string(),
        }
    }
}
