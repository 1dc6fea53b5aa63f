//! Control Plane Error Hierarchy
//!
//! Defines the error types of the snapshot cache and the discovery streams,
//! categorized by the layer that raises them.

use config::ConfigError;
use tokio::task::JoinError;
use tonic::Status;

use crate::ResourceType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (transport, TLS material, tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Snapshot store and watch registry failures
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Per-connection discovery stream failures
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No snapshot has ever been set for the node key
    #[error("No snapshot found for node {0}")]
    UnknownNode(String),

    /// The snapshot breaks one of its own invariants and was not installed
    #[error("Snapshot rejected: {0}")]
    SnapshotInvariantViolation(#[from] SnapshotInvariantViolation),

    /// The node's snapshot does not publish the requested type
    #[error("Snapshot of node {node_key} publishes no {resource_type}")]
    ResourceTypeAbsent {
        node_key: String,
        resource_type: ResourceType,
    },

    /// A fetch carried the version that is already current
    #[error("{resource_type} for node {node_key} already at version {version}")]
    VersionUpToDate {
        node_key: String,
        resource_type: ResourceType,
        version: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotInvariantViolation {
    #[error("duplicate {resource_type} resource name {name:?}")]
    DuplicateResource { resource_type: ResourceType, name: String },

    #[error("{actual} resource {name:?} placed in the {expected} list")]
    MisplacedResource {
        expected: ResourceType,
        actual: ResourceType,
        name: String,
    },

    #[error("{0} resource with an empty name")]
    EmptyName(ResourceType),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The proxy sent a request the stream cannot interpret
    #[error(transparent)]
    Malformed(#[from] MalformedRequest),

    /// A stream callback refused the stream or the request
    #[error("Rejected by callback: {0}")]
    Rejected(String),

    /// The stream has already been closed
    #[error("Stream closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRequest {
    #[error("aggregated request without a type url")]
    MissingTypeUrl,

    #[error("unknown resource type {0:?}")]
    UnknownResourceType(String),

    #[error("{actual} request on a {expected} stream")]
    TypeMismatch {
        expected: ResourceType,
        actual: ResourceType,
    },

    #[error("{resource_type} request acknowledges nonce {nonce:?} that was never sent")]
    UnknownNonce {
        resource_type: ResourceType,
        nonce: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Failed to send shutdown signal: {0}")]
    SignalSendFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error")]
    ServerUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Malformed listen or peer addresses
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<SnapshotInvariantViolation> for Error {
    fn from(e: SnapshotInvariantViolation) -> Self {
        Error::Cache(CacheError::SnapshotInvariantViolation(e))
    }
}

impl From<MalformedRequest> for Error {
    fn from(e: MalformedRequest) -> Self {
        Error::Stream(StreamError::Malformed(e))
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        NetworkError::TonicError(Box::new(err)).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::System(SystemError::Io(err))
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}

// ============== gRPC status mapping ============== //
impl From<CacheError> for Status {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::UnknownNode(_) | CacheError::ResourceTypeAbsent { .. } => {
                Status::not_found(e.to_string())
            }
            CacheError::VersionUpToDate { .. } => Status::unavailable(e.to_string()),
            CacheError::SnapshotInvariantViolation(_) => Status::failed_precondition(e.to_string()),
        }
    }
}

impl From<StreamError> for Status {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Malformed(_) => Status::invalid_argument(e.to_string()),
            StreamError::Rejected(_) => Status::permission_denied(e.to_string()),
            StreamError::Closed => Status::cancelled(e.to_string()),
        }
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        match e {
            Error::Cache(e) => e.into(),
            Error::Stream(e) => e.into(),
            Error::System(SystemError::Network(NetworkError::TonicStatusError(status))) => *status,
            other => Status::internal(other.to_string()),
        }
    }
}
