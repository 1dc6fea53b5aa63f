// -
// Node identity

/// Node key used when a proxy sends no node metadata or an empty id
pub const UNKNOWN_NODE_KEY: &str = "unknown";

// -
// Resource type URLs

pub const ENDPOINT_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment";
pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.Listener";

// -
// Versions

/// Length of generated version tokens
pub(crate) const VERSION_TOKEN_LEN: usize = 12;
