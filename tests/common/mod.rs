use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::Status;
use tonic::Streaming;
use xds_plane::proto::DiscoveryRequest;
use xds_plane::proto::DiscoveryResponse;
use xds_plane::proto::Node;
use xds_plane::serve_with_listener;
use xds_plane::DiscoveryServer;
use xds_plane::IdHash;
use xds_plane::Resource;
use xds_plane::Snapshot;
use xds_plane::SnapshotCache;
use xds_plane::XdsNodeConfig;

pub const NODE_ID: &str = "node0";

pub struct TestServer {
    pub address: SocketAddr,
    pub cache: Arc<SnapshotCache>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<xds_plane::Result<()>>,
}

impl TestServer {
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Fires the shutdown signal and waits for the server task.
    pub async fn stop(self) -> xds_plane::Result<()> {
        self.shutdown_tx.send(()).expect("server already gone");
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop within 5s")
            .expect("server task panicked")
    }
}

/// Starts a discovery server on an ephemeral local port with `snapshot`
/// installed for [`NODE_ID`].
pub async fn start_server(snapshot: Snapshot) -> TestServer {
    let cache = Arc::new(SnapshotCache::new(false));
    cache.set_snapshot(NODE_ID, snapshot).expect("valid snapshot");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local address");
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let server = DiscoveryServer::new(cache.clone(), Arc::new(IdHash));
    let handle = tokio::spawn(serve_with_listener(
        server,
        listener,
        XdsNodeConfig::default(),
        shutdown_rx,
    ));
    // give the listener loop a moment to start accepting
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        address,
        cache,
        shutdown_tx,
        handle,
    }
}

pub fn demo_snapshot(version: &str) -> Snapshot {
    Snapshot::new(
        version,
        vec![Resource::endpoint("cluster0", format!("127.0.0.1:8081@{version}"))],
        vec![Resource::cluster("cluster0", "cluster0")],
        vec![Resource::route("test_router", "test_router")],
        vec![Resource::listener("listener0", "0.0.0.0:10000")],
    )
}

pub fn request(
    type_url: &str,
    version: &str,
    nonce: &str,
) -> DiscoveryRequest {
    DiscoveryRequest {
        version_info: version.to_string(),
        node: Some(Node {
            id: NODE_ID.to_string(),
            ..Default::default()
        }),
        type_url: type_url.to_string(),
        response_nonce: nonce.to_string(),
        ..Default::default()
    }
}

pub fn request_channel() -> (mpsc::Sender<DiscoveryRequest>, ReceiverStream<DiscoveryRequest>) {
    let (tx, rx) = mpsc::channel(16);
    (tx, ReceiverStream::new(rx))
}

pub async fn next_response(
    responses: &mut Streaming<DiscoveryResponse>
) -> Result<DiscoveryResponse, Status> {
    timeout(Duration::from_secs(2), responses.next())
        .await
        .expect("no response within 2s")
        .expect("response stream ended")
}
