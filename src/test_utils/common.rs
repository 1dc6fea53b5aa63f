use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::Resource;
use crate::ResponseSink;
use crate::Snapshot;
use crate::WatchResponse;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// One resource of every type, all published at `version`.
pub(crate) fn demo_snapshot(version: &str) -> Snapshot {
    Snapshot::new(
        version,
        vec![Resource::endpoint("cluster0", "endpoint-a")],
        vec![Resource::cluster("cluster0", "cluster-a")],
        vec![Resource::route("test_router", "route-a")],
        vec![Resource::listener("listener0", "listener-a")],
    )
}

pub(crate) fn endpoints_snapshot(
    version: &str,
    names: &[&str],
) -> Snapshot {
    Snapshot::new(
        version,
        names.iter().map(|n| Resource::endpoint(*n, format!("{n}@{version}"))).collect(),
        vec![],
        vec![],
        vec![],
    )
}

pub(crate) fn response_channel() -> (ResponseSink, mpsc::UnboundedReceiver<WatchResponse>) {
    mpsc::unbounded_channel()
}

/// Waits briefly for the next response on `rx`.
pub(crate) async fn next_response(rx: &mut mpsc::UnboundedReceiver<WatchResponse>) -> WatchResponse {
    match timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(r)) => r,
        Ok(None) => panic!("response channel closed"),
        Err(_) => panic!("no response within 1s"),
    }
}
