use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use xds_plane::metrics;
use xds_plane::start_rpc_server;
use xds_plane::DiscoveryServer;
use xds_plane::Resource;
use xds_plane::Result;
use xds_plane::Snapshot;
use xds_plane::SnapshotCache;
use xds_plane::SystemError;
use xds_plane::XdsNodeConfig;

/// Node served by the demo snapshot
const DEMO_NODE: &str = "node0";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = XdsNodeConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.server.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(metrics::start_server(
            settings.monitoring.prometheus_port,
            graceful_rx.clone(),
        ));
    }

    let cache = Arc::new(SnapshotCache::from_config(&settings.cache));
    cache.set_snapshot(DEMO_NODE, demo_snapshot())?;

    let server = DiscoveryServer::new(cache, settings.cache.node_hash.build())
        .with_response_buffer_size(settings.server.response_buffer_size);

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = start_rpc_server(server, settings, graceful_rx).await {
        error!("discovery server stops: {:?}", e);
    }

    println!("Exiting program.");
    Ok(())
}

/// Version "2" of one resource per type, all named after the cluster the
/// proxy routes to.
fn demo_snapshot() -> Snapshot {
    Snapshot::new(
        "2",
        vec![Resource::endpoint("cluster0", "127.0.0.1:8081")],
        vec![Resource::cluster("cluster0", "cluster0")],
        vec![Resource::route("test_router", "test_router")],
        vec![Resource::listener("listener0", "0.0.0.0:10000")],
    )
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        SystemError::SignalSendFailed(e.to_string())
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(&log_dir.join("xds.log"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}

fn open_file_for_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().append(true).create(true).open(path)?)
}
