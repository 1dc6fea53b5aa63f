//! Discovery stream reconciliation.
//!
//! A [`StreamReconciler`] owns one proxy connection. It keeps one small state
//! machine per resource type and multiplexes all of them over the same
//! transport stream when the proxy uses aggregated discovery:
//!
//! ```text
//!                  request                 watch resolved
//! AwaitingRequest ---------> WatchPending ----------------> ResponseSent
//!        ^                        |  (or resolved at once)        |
//!        |                        +-------------------------------+
//!        +------------------ ACK / NACK request -----------------+
//!
//! Closed: terminal, entered by every type once the connection closes
//! ```

mod callbacks;
mod reconciler;

pub use callbacks::*;
pub use reconciler::*;


use crate::proto::DiscoveryResponse;
use crate::Resource;
use crate::ResourceType;
use crate::VersionToken;

/// Server-assigned identifier of one discovery stream.
pub type StreamId = u64;

/// Which resource types a stream may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// All types over one stream; every request names its type URL.
    Aggregated,
    /// One type only (the per-type discovery services).
    Single(ResourceType),
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Aggregated => "aggregated",
            StreamMode::Single(t) => t.as_str(),
        }
    }
}

/// State of one resource type on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubStreamState {
    #[default]
    AwaitingRequest,
    WatchPending,
    ResponseSent,
    Closed,
}

pub(crate) fn encode_response(
    resource_type: ResourceType,
    version: &VersionToken,
    resources: &[Resource],
    nonce: String,
) -> DiscoveryResponse {
    DiscoveryResponse {
        version_info: version.to_string(),
        resources: resources.iter().map(Resource::to_proto).collect(),
        type_url: resource_type.type_url().to_string(),
        nonce,
    }
}
