use std::collections::BTreeMap;
use std::sync::Arc;

use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::encode_response;
use super::StreamCallbacks;
use super::StreamId;
use super::StreamMode;
use super::SubStreamState;
use crate::metrics::ACTIVE_STREAMS;
use crate::metrics::NACKS_RECEIVED;
use crate::metrics::RESPONSES_SENT;
use crate::metrics::RESPONSE_RESOURCES_METRIC;
use crate::metrics::STREAM_ERRORS;
use crate::proto::DiscoveryRequest;
use crate::proto::DiscoveryResponse;
use crate::MalformedRequest;
use crate::NodeHash;
use crate::ResourceType;
use crate::SnapshotCache;
use crate::StreamError;
use crate::VersionToken;
use crate::WatchHandle;
use crate::WatchId;
use crate::WatchOutcome;
use crate::WatchRequest;
use crate::WatchResponse;

/// Per-type bookkeeping of one connection.
#[derive(Debug, Default)]
struct SubStream {
    state: SubStreamState,
    /// Latest watch created for this type; responses of any other watch are
    /// superseded.
    current_watch: Option<WatchId>,
    /// Registration of `current_watch` while it is pending.
    pending: Option<WatchHandle>,
    /// Nonce of the last response sent for this type
    last_nonce: Option<u64>,
    /// Version of the last response sent for this type
    version_sent: Option<VersionToken>,
}

impl SubStream {
    fn cancel_watch(&mut self) {
        self.current_watch = None;
        self.pending = None;
    }
}

/// How a request relates to the responses already sent for its type.
enum NonceCheck {
    NewSubscription,
    /// Nothing was sent for the type on this connection yet; the nonce
    /// belongs to an earlier connection.
    Resumed,
    Acknowledgement,
    Stale(u64),
    Unknown,
}

/// State machine of one discovery stream.
///
/// The reconciler is driven by two inputs: requests read from the proxy
/// ([`handle_request`](Self::handle_request)) and responses produced by
/// resolved watches ([`handle_watch_response`](Self::handle_watch_response)).
/// [`run`](Self::run) wires both to a transport; tests can drive them
/// directly.
pub struct StreamReconciler {
    id: StreamId,
    mode: StreamMode,
    cache: Arc<SnapshotCache>,
    node_hash: Arc<dyn NodeHash>,
    callbacks: Arc<dyn StreamCallbacks>,
    /// Resolved from the first request and reused afterwards
    node_key: Option<String>,
    sub_streams: BTreeMap<ResourceType, SubStream>,
    /// Last nonce handed out on this connection
    nonce: u64,
    sink: mpsc::UnboundedSender<WatchResponse>,
    responses: mpsc::UnboundedReceiver<WatchResponse>,
    closed: bool,
}

impl std::fmt::Debug for StreamReconciler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StreamReconciler")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("node_key", &self.node_key)
            .field("sub_streams", &self.sub_streams)
            .field("nonce", &self.nonce)
            .field("closed", &self.closed)
            .finish()
    }
}

impl StreamReconciler {
    /// Opens a stream, giving the callbacks a chance to refuse it.
    pub fn open(
        id: StreamId,
        mode: StreamMode,
        cache: Arc<SnapshotCache>,
        node_hash: Arc<dyn NodeHash>,
        callbacks: Arc<dyn StreamCallbacks>,
    ) -> Result<Self, StreamError> {
        callbacks.on_stream_open(id, mode)?;

        let (sink, responses) = mpsc::unbounded_channel();
        ACTIVE_STREAMS.with_label_values(&[mode.as_str()]).inc();
        debug!(stream_id = id, mode = mode.as_str(), "Discovery stream opened");

        Ok(Self {
            id,
            mode,
            cache,
            node_hash,
            callbacks,
            node_key: None,
            sub_streams: BTreeMap::new(),
            nonce: 0,
            sink,
            responses,
            closed: false,
        })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn node_key(&self) -> Option<&str> {
        self.node_key.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// State of `resource_type` on this connection.
    pub fn state(
        &self,
        resource_type: ResourceType,
    ) -> SubStreamState {
        if self.closed {
            return SubStreamState::Closed;
        }
        self.sub_streams
            .get(&resource_type)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Processes one request from the proxy.
    ///
    /// An `Err` is terminal: the caller must report it to the proxy and close
    /// the stream.
    pub fn handle_request(
        &mut self,
        request: DiscoveryRequest,
    ) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }

        let resource_type = self.resolve_type(&request.type_url)?;
        let node_key = match &self.node_key {
            Some(key) => key.clone(),
            None => {
                let key = self.node_hash.id(request.node.as_ref());
                debug!(stream_id = self.id, node = %key, "Node identified");
                self.node_key = Some(key.clone());
                key
            }
        };

        self.callbacks.on_stream_request(self.id, &request)?;

        let sub = self.sub_streams.entry(resource_type).or_default();
        let version_known = match check_nonce(&request.response_nonce, sub.last_nonce, self.nonce) {
            NonceCheck::NewSubscription => non_empty_version(&request.version_info),
            NonceCheck::Resumed => {
                debug!(
                    stream_id = self.id,
                    resource_type = %resource_type,
                    nonce = %request.response_nonce,
                    "Nonce from an earlier connection, subscribing afresh"
                );
                non_empty_version(&request.version_info)
            }
            NonceCheck::Stale(nonce) => {
                trace!(
                    stream_id = self.id,
                    resource_type = %resource_type,
                    nonce,
                    "Ignoring request with stale nonce"
                );
                return Ok(());
            }
            NonceCheck::Unknown => {
                return Err(MalformedRequest::UnknownNonce {
                    resource_type,
                    nonce: request.response_nonce,
                }
                .into());
            }
            NonceCheck::Acknowledgement if request.is_nack() => {
                let detail = request.error_detail.as_ref().map(|d| d.message.as_str()).unwrap_or_default();
                warn!(
                    stream_id = self.id,
                    node = %node_key,
                    resource_type = %resource_type,
                    rejected_version = ?sub.version_sent,
                    detail,
                    "Proxy rejected configuration"
                );
                NACKS_RECEIVED.with_label_values(&[resource_type.as_str()]).inc();
                sub.version_sent.clone()
            }
            NonceCheck::Acknowledgement => non_empty_version(&request.version_info),
        };

        // Replacing the watch drops the previous registration.
        sub.cancel_watch();

        let watch_request = WatchRequest {
            node_key,
            resource_type,
            resource_names: request.resource_names,
            version_known,
        };
        let outcome = self.cache.create_watch(watch_request, self.sink.clone());
        sub.current_watch = Some(outcome.id());
        match outcome {
            WatchOutcome::Resolved(_) => sub.state = SubStreamState::ResponseSent,
            WatchOutcome::Pending(handle) => {
                sub.pending = Some(handle);
                sub.state = SubStreamState::WatchPending;
            }
        }
        Ok(())
    }

    /// Turns a resolved watch into the response to transmit. Returns `None`
    /// when the watch was superseded by a newer request or the stream is
    /// closed.
    pub fn handle_watch_response(
        &mut self,
        response: WatchResponse,
    ) -> Option<DiscoveryResponse> {
        if self.closed {
            return None;
        }
        let sub = self.sub_streams.get_mut(&response.resource_type)?;
        if sub.current_watch != Some(response.watch_id) {
            trace!(
                stream_id = self.id,
                watch_id = response.watch_id,
                resource_type = %response.resource_type,
                "Dropping superseded watch response"
            );
            return None;
        }

        self.nonce += 1;
        sub.current_watch = None;
        sub.pending = None;
        sub.last_nonce = Some(self.nonce);
        sub.version_sent = Some(response.version.clone());
        sub.state = SubStreamState::ResponseSent;

        let resource_type = response.resource_type;
        let out = encode_response(
            resource_type,
            &response.version,
            &response.resources,
            self.nonce.to_string(),
        );

        debug!(
            stream_id = self.id,
            node = %response.node_key,
            resource_type = %resource_type,
            version = %response.version,
            nonce = self.nonce,
            resources = out.resources.len(),
            "Sending discovery response"
        );
        RESPONSES_SENT.with_label_values(&[resource_type.as_str()]).inc();
        RESPONSE_RESOURCES_METRIC
            .with_label_values(&[resource_type.as_str()])
            .observe(out.resources.len() as f64);
        self.callbacks.on_stream_response(self.id, &out);
        Some(out)
    }

    /// Responses of watches that have already resolved, in resolution order.
    pub fn drain_ready(&mut self) -> Vec<DiscoveryResponse> {
        let mut ready = Vec::new();
        while let Ok(response) = self.responses.try_recv() {
            if let Some(out) = self.handle_watch_response(response) {
                ready.push(out);
            }
        }
        ready
    }

    /// Cancels every pending watch and marks all sub-streams closed.
    /// Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for sub in self.sub_streams.values_mut() {
            sub.cancel_watch();
            sub.state = SubStreamState::Closed;
        }
        self.responses.close();

        ACTIVE_STREAMS.with_label_values(&[self.mode.as_str()]).dec();
        debug!(stream_id = self.id, node = ?self.node_key, "Discovery stream closed");
        self.callbacks.on_stream_closed(self.id);
    }

    /// Drives the stream until the proxy hangs up, a send fails, a terminal
    /// fault occurs or `cancel` fires.
    pub async fn run<S>(
        mut self,
        mut requests: S,
        tx: mpsc::Sender<Result<DiscoveryResponse, Status>>,
        cancel: CancellationToken,
    ) where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Unpin + Send,
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(stream_id = self.id, "Discovery stream cancelled");
                    break;
                }
                Some(response) = self.responses.recv() => {
                    if let Some(out) = self.handle_watch_response(response) {
                        if tx.send(Ok(out)).await.is_err() {
                            debug!(stream_id = self.id, "Response channel closed");
                            break;
                        }
                    }
                }
                request = requests.next() => match request {
                    Some(Ok(request)) => {
                        if let Err(error) = self.handle_request(request) {
                            self.report_fault(&error);
                            let _ = tx.send(Err(error.into())).await;
                            break;
                        }
                    }
                    Some(Err(status)) => {
                        debug!(stream_id = self.id, %status, "Request stream failed");
                        break;
                    }
                    None => {
                        debug!(stream_id = self.id, "Request stream ended by proxy");
                        break;
                    }
                }
            }
        }
        self.close();
    }

    fn resolve_type(
        &self,
        type_url: &str,
    ) -> Result<ResourceType, StreamError> {
        if type_url.is_empty() {
            return match self.mode {
                StreamMode::Single(t) => Ok(t),
                StreamMode::Aggregated => Err(MalformedRequest::MissingTypeUrl.into()),
            };
        }
        let actual = ResourceType::from_type_url(type_url)
            .ok_or_else(|| MalformedRequest::UnknownResourceType(type_url.to_string()))?;
        match self.mode {
            StreamMode::Single(expected) if expected != actual => {
                Err(MalformedRequest::TypeMismatch { expected, actual }.into())
            }
            _ => Ok(actual),
        }
    }

    fn report_fault(
        &self,
        error: &StreamError,
    ) {
        warn!(stream_id = self.id, node = ?self.node_key, %error, "Discovery stream fault");
        STREAM_ERRORS.with_label_values(&[error_kind(error)]).inc();
        self.callbacks.on_stream_error(self.id, error);
    }
}

impl Drop for StreamReconciler {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_nonce(
    nonce: &str,
    last_sent: Option<u64>,
    issued: u64,
) -> NonceCheck {
    if nonce.is_empty() {
        return NonceCheck::NewSubscription;
    }
    if last_sent.is_none() {
        return NonceCheck::Resumed;
    }
    match nonce.parse::<u64>() {
        Ok(n) if n == 0 || n > issued => NonceCheck::Unknown,
        Ok(n) if Some(n) == last_sent => NonceCheck::Acknowledgement,
        Ok(n) => NonceCheck::Stale(n),
        Err(_) => NonceCheck::Unknown,
    }
}

fn non_empty_version(version: &str) -> Option<VersionToken> {
    (!version.is_empty()).then(|| VersionToken::from(version))
}

fn error_kind(error: &StreamError) -> &'static str {
    match error {
        StreamError::Malformed(MalformedRequest::MissingTypeUrl) => "missing_type_url",
        StreamError::Malformed(MalformedRequest::UnknownResourceType(_)) => "unknown_resource_type",
        StreamError::Malformed(MalformedRequest::TypeMismatch { .. }) => "type_mismatch",
        StreamError::Malformed(MalformedRequest::UnknownNonce { .. }) => "unknown_nonce",
        StreamError::Rejected(_) => "rejected",
        StreamError::Closed => "closed",
    }
}
