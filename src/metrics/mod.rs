use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::register_histogram_vec;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref ACTIVE_STREAMS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("active_streams", "Open discovery streams"),
        &["mode"]
    )
    .expect("metric can not be created");

    pub static ref SNAPSHOT_UPDATES: IntCounter =
        IntCounter::new("snapshot_updates", "Snapshots installed into the cache")
            .expect("metric can not be created");

    pub static ref PENDING_WATCHES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("pending_watches", "Watches waiting for a newer version"),
        &["resource_type"]
    )
    .expect("metric can not be created");

    pub static ref WATCHES_RESOLVED: IntCounterVec = IntCounterVec::new(
        Opts::new("watches_resolved", "Watches resolved into a response"),
        &["resource_type"]
    )
    .expect("metric can not be created");

    pub static ref RESPONSES_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("responses_sent", "Discovery responses written to streams"),
        &["resource_type"]
    )
    .expect("metric can not be created");

    pub static ref NACKS_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("nacks_received", "Requests rejecting the last response"),
        &["resource_type"]
    )
    .expect("metric can not be created");

    pub static ref STREAM_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("stream_errors", "Discovery stream faults"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref RESPONSE_RESOURCES_METRIC: HistogramVec = register_histogram_vec!(
        "response_resources",
        "Histogram of resources carried per discovery response",
        &["resource_type"],
        exponential_buckets(1.0, 2.0, 12).unwrap()
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(ACTIVE_STREAMS.clone()))?;
    registry.register(Box::new(SNAPSHOT_UPDATES.clone()))?;
    registry.register(Box::new(PENDING_WATCHES.clone()))?;
    registry.register(Box::new(WATCHES_RESOLVED.clone()))?;
    registry.register(Box::new(RESPONSES_SENT.clone()))?;
    registry.register(Box::new(NACKS_RECEIVED.clone()))?;
    registry.register(Box::new(STREAM_ERRORS.clone()))?;
    Ok(())
}

/// Serves `/metrics` until `shutdown_signal` fires.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    if let Err(e) = register_custom_metrics(&REGISTRY) {
        error!("could not register metrics: {}", e);
    }

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    info!("metrics server listening on {}", addr);
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_metrics())
}

/// Text exposition of the crate registry followed by the default registry.
pub fn gather_metrics() -> String {
    let mut res = encode(&REGISTRY.gather());
    res.push_str(&encode(&prometheus::gather()));
    res
}

fn encode(families: &[prometheus::proto::MetricFamily]) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(families, &mut buffer) {
        error!("could not encode metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
