//! gRPC bindings of the discovery services.
//!
//! Every streaming RPC gets its own [`StreamReconciler`] running on a
//! dedicated task; responses reach tonic through a bounded channel. Unary
//! fetches read the cache directly and never register a watch.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;

use crate::discovery::encode_response;
use crate::proto::aggregated_discovery_service_server::AggregatedDiscoveryService;
use crate::proto::cluster_discovery_service_server::ClusterDiscoveryService;
use crate::proto::endpoint_discovery_service_server::EndpointDiscoveryService;
use crate::proto::listener_discovery_service_server::ListenerDiscoveryService;
use crate::proto::route_discovery_service_server::RouteDiscoveryService;
use crate::proto::DiscoveryRequest;
use crate::proto::DiscoveryResponse;
use crate::LoggingCallbacks;
use crate::MalformedRequest;
use crate::NodeHash;
use crate::ResourceType;
use crate::SnapshotCache;
use crate::StreamCallbacks;
use crate::StreamError;
use crate::StreamMode;
use crate::StreamReconciler;
use crate::VersionToken;
use crate::WatchRequest;

/// Outbound half of a discovery stream.
pub type ResponseStream = ReceiverStream<Result<DiscoveryResponse, Status>>;

const DEFAULT_RESPONSE_BUFFER_SIZE: usize = 64;

/// Serves one [`SnapshotCache`] over the aggregated and the per-type
/// discovery services.
#[derive(Clone)]
pub struct DiscoveryServer {
    cache: Arc<SnapshotCache>,
    node_hash: Arc<dyn NodeHash>,
    callbacks: Arc<dyn StreamCallbacks>,
    next_stream_id: Arc<AtomicU64>,
    response_buffer_size: usize,
    /// Parent of every stream's cancellation token
    streams: CancellationToken,
}

impl std::fmt::Debug for DiscoveryServer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DiscoveryServer")
            .field("cache", &self.cache)
            .field("response_buffer_size", &self.response_buffer_size)
            .finish_non_exhaustive()
    }
}

impl DiscoveryServer {
    pub fn new(
        cache: Arc<SnapshotCache>,
        node_hash: Arc<dyn NodeHash>,
    ) -> Self {
        Self {
            cache,
            node_hash,
            callbacks: Arc::new(LoggingCallbacks),
            next_stream_id: Arc::new(AtomicU64::new(1)),
            response_buffer_size: DEFAULT_RESPONSE_BUFFER_SIZE,
            streams: CancellationToken::new(),
        }
    }

    pub fn with_callbacks(
        mut self,
        callbacks: Arc<dyn StreamCallbacks>,
    ) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_response_buffer_size(
        mut self,
        size: usize,
    ) -> Self {
        self.response_buffer_size = size.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Closes every open discovery stream. Streams opened afterwards are
    /// closed immediately.
    pub fn close_streams(&self) {
        self.streams.cancel();
    }

    fn open_stream<S>(
        &self,
        mode: StreamMode,
        requests: S,
    ) -> Result<Response<ResponseStream>, Status>
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Unpin + Send + 'static,
    {
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let reconciler = StreamReconciler::open(
            id,
            mode,
            self.cache.clone(),
            self.node_hash.clone(),
            self.callbacks.clone(),
        )?;

        let (tx, rx) = mpsc::channel(self.response_buffer_size);
        tokio::spawn(reconciler.run(requests, tx, self.streams.child_token()));

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    fn fetch(
        &self,
        resource_type: ResourceType,
        request: DiscoveryRequest,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.callbacks.on_fetch_request(&request)?;

        if !request.type_url.is_empty() {
            match ResourceType::from_type_url(&request.type_url) {
                Some(actual) if actual == resource_type => {}
                Some(actual) => {
                    return Err(StreamError::from(MalformedRequest::TypeMismatch {
                        expected: resource_type,
                        actual,
                    })
                    .into());
                }
                None => {
                    return Err(StreamError::from(MalformedRequest::UnknownResourceType(
                        request.type_url.clone(),
                    ))
                    .into());
                }
            }
        }

        let watch_request = WatchRequest {
            node_key: self.node_hash.id(request.node.as_ref()),
            resource_type,
            resource_names: request.resource_names.clone(),
            version_known: (!request.version_info.is_empty())
                .then(|| VersionToken::from(request.version_info.as_str())),
        };
        let fetched = self.cache.fetch(&watch_request).map_err(|e| {
            debug!(node = %watch_request.node_key, resource_type = %resource_type, "Fetch failed: {}", e);
            Status::from(e)
        })?;

        let response = encode_response(
            resource_type,
            &fetched.version,
            &fetched.resources,
            String::new(),
        );
        self.callbacks.on_fetch_response(&request, &response);
        Ok(Response::new(response))
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for DiscoveryServer {
    type StreamAggregatedResourcesStream = ResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        self.open_stream(StreamMode::Aggregated, request.into_inner())
    }
}

#[tonic::async_trait]
impl EndpointDiscoveryService for DiscoveryServer {
    type StreamEndpointsStream = ResponseStream;

    async fn stream_endpoints(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamEndpointsStream>, Status> {
        self.open_stream(StreamMode::Single(ResourceType::Endpoint), request.into_inner())
    }

    async fn fetch_endpoints(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(ResourceType::Endpoint, request.into_inner())
    }
}

#[tonic::async_trait]
impl ClusterDiscoveryService for DiscoveryServer {
    type StreamClustersStream = ResponseStream;

    async fn stream_clusters(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamClustersStream>, Status> {
        self.open_stream(StreamMode::Single(ResourceType::Cluster), request.into_inner())
    }

    async fn fetch_clusters(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(ResourceType::Cluster, request.into_inner())
    }
}

#[tonic::async_trait]
impl RouteDiscoveryService for DiscoveryServer {
    type StreamRoutesStream = ResponseStream;

    async fn stream_routes(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamRoutesStream>, Status> {
        self.open_stream(StreamMode::Single(ResourceType::Route), request.into_inner())
    }

    async fn fetch_routes(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(ResourceType::Route, request.into_inner())
    }
}

#[tonic::async_trait]
impl ListenerDiscoveryService for DiscoveryServer {
    type StreamListenersStream = ResponseStream;

    async fn stream_listeners(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamListenersStream>, Status> {
        self.open_stream(StreamMode::Single(ResourceType::Listener), request.into_inner())
    }

    async fn fetch_listeners(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        self.fetch(ResourceType::Listener, request.into_inner())
    }
}
