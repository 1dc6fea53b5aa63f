#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::StreamId;
use super::StreamMode;
use crate::proto::DiscoveryRequest;
use crate::proto::DiscoveryResponse;
use crate::StreamError;

/// Hooks into the lifecycle of discovery streams and fetches.
///
/// `on_stream_open` and `on_stream_request` may veto with
/// [`StreamError::Rejected`]; a vetoed stream is terminated with
/// `PERMISSION_DENIED`. The remaining hooks are notifications only.
///
/// Hooks run on the connection task and must not block.
#[cfg_attr(test, automock)]
pub trait StreamCallbacks: Send + Sync + 'static {
    fn on_stream_open(
        &self,
        stream_id: StreamId,
        mode: StreamMode,
    ) -> Result<(), StreamError>;

    fn on_stream_request(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
    ) -> Result<(), StreamError>;

    fn on_stream_response(
        &self,
        stream_id: StreamId,
        response: &DiscoveryResponse,
    );

    /// A fault on the stream, terminal or limited to one resource type.
    fn on_stream_error(
        &self,
        stream_id: StreamId,
        error: &StreamError,
    );

    fn on_stream_closed(
        &self,
        stream_id: StreamId,
    );

    fn on_fetch_request(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<(), StreamError>;

    fn on_fetch_response(
        &self,
        request: &DiscoveryRequest,
        response: &DiscoveryResponse,
    );
}

/// Accepts everything and only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCallbacks;

impl StreamCallbacks for LoggingCallbacks {
    fn on_stream_open(
        &self,
        stream_id: StreamId,
        mode: StreamMode,
    ) -> Result<(), StreamError> {
        debug!(stream_id, ?mode, "Stream opened");
        Ok(())
    }

    fn on_stream_request(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
    ) -> Result<(), StreamError> {
        trace!(
            stream_id,
            type_url = %request.type_url,
            version = %request.version_info,
            nonce = %request.response_nonce,
            "Stream request"
        );
        Ok(())
    }

    fn on_stream_response(
        &self,
        stream_id: StreamId,
        response: &DiscoveryResponse,
    ) {
        trace!(
            stream_id,
            type_url = %response.type_url,
            version = %response.version_info,
            nonce = %response.nonce,
            "Stream response"
        );
    }

    fn on_stream_error(
        &self,
        stream_id: StreamId,
        error: &StreamError,
    ) {
        warn!(stream_id, %error, "Stream fault");
    }

    fn on_stream_closed(
        &self,
        stream_id: StreamId,
    ) {
        debug!(stream_id, "Stream closed");
    }

    fn on_fetch_request(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<(), StreamError> {
        trace!(type_url = %request.type_url, "Fetch request");
        Ok(())
    }

    fn on_fetch_response(
        &self,
        _request: &DiscoveryRequest,
        response: &DiscoveryResponse,
    ) {
        trace!(
            type_url = %response.type_url,
            version = %response.version_info,
            "Fetch response"
        );
    }
}
