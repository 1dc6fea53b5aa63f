//! Resource model shared by the snapshot cache and the discovery streams.
//!
//! A [`Resource`] is an opaque, named blob tagged with a [`ResourceType`]. The
//! control plane never looks inside the payload; it only needs the name for
//! uniqueness checks and subscription filters, and the type to route the blob
//! to the right subscribers.
//!
//! ## Dependency order
//! Listeners reference routes, routes reference clusters and clusters
//! reference endpoints. Proxies are expected to apply updates in
//! [`ResourceType::ALL`] order (endpoints first). The control plane documents
//! this order but does not enforce it.


use std::fmt;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CLUSTER_TYPE_URL;
use crate::constants::ENDPOINT_TYPE_URL;
use crate::constants::LISTENER_TYPE_URL;
use crate::constants::ROUTE_TYPE_URL;
use crate::proto;
use crate::SnapshotInvariantViolation;

/// Category of configuration served by the control plane.
///
/// Variants are declared in dependency order, so the derived `Ord` sorts
/// endpoints before clusters before routes before listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Endpoint,
    Cluster,
    Route,
    Listener,
}

impl ResourceType {
    /// All resource types in the order a proxy should apply them.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Endpoint,
        ResourceType::Cluster,
        ResourceType::Route,
        ResourceType::Listener,
    ];

    pub const fn type_url(self) -> &'static str {
        match self {
            ResourceType::Endpoint => ENDPOINT_TYPE_URL,
            ResourceType::Cluster => CLUSTER_TYPE_URL,
            ResourceType::Route => ROUTE_TYPE_URL,
            ResourceType::Listener => LISTENER_TYPE_URL,
        }
    }

    /// Resolves a wire type URL. Returns `None` for types this control plane
    /// does not serve.
    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_url() == type_url)
    }

    /// Short plural name used in logs and metric labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceType::Endpoint => "endpoints",
            ResourceType::Cluster => "clusters",
            ResourceType::Route => "routes",
            ResourceType::Listener => "listeners",
        }
    }

    /// The type whose names resources of this type refer to.
    pub const fn depends_on(self) -> Option<ResourceType> {
        match self {
            ResourceType::Endpoint => None,
            ResourceType::Cluster => Some(ResourceType::Endpoint),
            ResourceType::Route => Some(ResourceType::Cluster),
            ResourceType::Listener => Some(ResourceType::Route),
        }
    }

    /// Whether proxies subscribe to this type by explicit resource names.
    ///
    /// Endpoints and routes are requested by name (the names come from the
    /// clusters and listeners that reference them); clusters and listeners are
    /// usually requested as a wildcard.
    pub const fn is_named_subscription(self) -> bool {
        matches!(self, ResourceType::Endpoint | ResourceType::Route)
    }

    /// Checks a blob before it may be placed in a snapshot list of this type.
    pub(crate) fn validate(
        self,
        resource: &Resource,
    ) -> Result<(), SnapshotInvariantViolation> {
        if resource.resource_type != self {
            return Err(SnapshotInvariantViolation::MisplacedResource {
                expected: self,
                actual: resource.resource_type,
                name: resource.name.clone(),
            });
        }
        if resource.name.trim().is_empty() {
            return Err(SnapshotInvariantViolation::EmptyName(self));
        }
        Ok(())
    }

    /// Encodes a blob of this type for the wire.
    pub(crate) fn encode(
        self,
        resource: &Resource,
    ) -> proto::Resource {
        proto::Resource {
            name: resource.name.clone(),
            type_url: self.type_url().to_string(),
            payload: resource.payload.clone(),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque, immutable configuration object.
///
/// Cloning is cheap: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    resource_type: ResourceType,
    name: String,
    payload: Bytes,
}

impl Resource {
    pub fn new(
        resource_type: ResourceType,
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            resource_type,
            name: name.into(),
            payload: payload.into(),
        }
    }

    pub fn endpoint(
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(ResourceType::Endpoint, name, payload)
    }

    pub fn cluster(
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(ResourceType::Cluster, name, payload)
    }

    pub fn route(
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(ResourceType::Route, name, payload)
    }

    pub fn listener(
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(ResourceType::Listener, name, payload)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Wire representation of this blob.
    pub fn to_proto(&self) -> proto::Resource {
        self.resource_type.encode(self)
    }
}
