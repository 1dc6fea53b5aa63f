//! gRPC transport of the discovery services.
//!
//! Hosts the aggregated and the four per-type discovery services plus the
//! standard health service on one tonic server, with optional TLS and gzip.

mod discovery_service;
pub use discovery_service::*;


//-------------------------------------------------------------------------------
// Start RPC Server
use std::path::Path;
use std::time::Duration;

use futures::FutureExt;
use rcgen::generate_simple_self_signed;
use rcgen::CertifiedKey;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codec::CompressionEncoding;
use tonic::transport::server::Router;
use tonic::transport::Certificate;
use tonic::transport::Identity;
use tonic::transport::Server;
use tonic::transport::ServerTlsConfig;
use tonic_health::server::health_reporter;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::proto::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use crate::proto::cluster_discovery_service_server::ClusterDiscoveryServiceServer;
use crate::proto::endpoint_discovery_service_server::EndpointDiscoveryServiceServer;
use crate::proto::listener_discovery_service_server::ListenerDiscoveryServiceServer;
use crate::proto::route_discovery_service_server::RouteDiscoveryServiceServer;
use crate::NetworkError;
use crate::Result;
use crate::SystemError;
use crate::TlsConfig;
use crate::XdsNodeConfig;

/// Binds `config.server.listen_address` and serves until `shutdown_signal`
/// fires.
pub async fn start_rpc_server(
    server: DiscoveryServer,
    config: XdsNodeConfig,
    shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let listen_address = config.server.listen_address;
    let listener = TcpListener::bind(listen_address).await.map_err(|e| {
        error!("failed to bind {}: {}", listen_address, e);
        NetworkError::InvalidAddress(format!("{listen_address}: {e}"))
    })?;
    serve_with_listener(server, listener, config, shutdown_signal).await
}

/// Serves on an already bound listener until `shutdown_signal` fires.
///
/// On shutdown every open discovery stream is cancelled first, so the
/// server does not wait for proxies to hang up.
pub async fn serve_with_listener(
    server: DiscoveryServer,
    listener: TcpListener,
    config: XdsNodeConfig,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let local_address = listener.local_addr()?;

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<AggregatedDiscoveryServiceServer<DiscoveryServer>>()
        .await;
    health_reporter
        .set_serving::<EndpointDiscoveryServiceServer<DiscoveryServer>>()
        .await;
    health_reporter
        .set_serving::<ClusterDiscoveryServiceServer<DiscoveryServer>>()
        .await;
    health_reporter
        .set_serving::<RouteDiscoveryServiceServer<DiscoveryServer>>()
        .await;
    health_reporter
        .set_serving::<ListenerDiscoveryServiceServer<DiscoveryServer>>()
        .await;

    let network = &config.network;
    let mut server_builder = Server::builder()
        .concurrency_limit_per_connection(network.concurrency_limit)
        .max_concurrent_streams(Some(network.max_concurrent_streams))
        .tcp_keepalive(Some(Duration::from_secs(network.tcp_keepalive_in_secs)))
        .http2_keepalive_interval(Some(Duration::from_secs(
            network.http2_keep_alive_interval_in_secs,
        )))
        .http2_keepalive_timeout(Some(Duration::from_secs(
            network.http2_keep_alive_timeout_in_secs,
        )))
        .initial_stream_window_size(network.stream_window_size)
        .initial_connection_window_size(network.connection_window_size)
        .http2_adaptive_window(Some(network.adaptive_window))
        .tcp_nodelay(network.tcp_nodelay);

    if config.tls.enable_tls {
        server_builder = server_builder
            .tls_config(load_tls_config(&config.tls)?)
            .map_err(|e| SystemError::Tls(e.to_string()))?;
    }

    let router = add_discovery_services(
        server_builder.add_service(health_service),
        &server,
        &config,
    );

    info!("discovery server listening on {}", local_address);
    let streams = server.clone();
    if let Err(e) = router
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            shutdown_signal.changed().map(move |_| {
                warn!("Stopping discovery server. {}", local_address);
                streams.close_streams();
            }),
        )
        .await
    {
        error!("discovery server failed: {:?}", e);
        return Err(SystemError::ServerUnavailable.into());
    }
    debug!("discovery server finished!");
    Ok(())
}

fn add_discovery_services(
    router: Router,
    server: &DiscoveryServer,
    config: &XdsNodeConfig,
) -> Router {
    let max_message_size = config.server.max_message_size;
    let compress = config.server.enable_compression;

    let mut ads = AggregatedDiscoveryServiceServer::new(server.clone())
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);
    let mut eds = EndpointDiscoveryServiceServer::new(server.clone())
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);
    let mut cds = ClusterDiscoveryServiceServer::new(server.clone())
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);
    let mut rds = RouteDiscoveryServiceServer::new(server.clone())
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);
    let mut lds = ListenerDiscoveryServiceServer::new(server.clone())
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);

    if compress {
        ads = ads
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip);
        eds = eds
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip);
        cds = cds
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip);
        rds = rds
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip);
        lds = lds
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip);
    }

    router
        .add_service(ads)
        .add_service(eds)
        .add_service(cds)
        .add_service(rds)
        .add_service(lds)
}

fn load_tls_config(config: &TlsConfig) -> Result<ServerTlsConfig> {
    if config.generate_self_signed_certificates {
        if Path::new(&config.server_certificate_path).exists() {
            warn!("Server certificate already exists, remove the file if you want to generate new certificates. Skipping self signed certificates generation.");
        } else {
            info!("Generating self signed certificates");
            generate_self_signed_certificates(config)?;
        }
    }

    let cert = std::fs::read_to_string(&config.server_certificate_path).map_err(|e| {
        SystemError::Tls(format!(
            "failed to read server certificate {}: {}",
            config.server_certificate_path, e
        ))
    })?;
    let key = std::fs::read_to_string(&config.server_private_key_path).map_err(|e| {
        SystemError::Tls(format!(
            "failed to read server private key {}: {}",
            config.server_private_key_path, e
        ))
    })?;
    let tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    if !config.enable_mtls {
        info!("gRPC TLS enabled");
        return Ok(tls);
    }

    let client_ca_cert =
        std::fs::read_to_string(&config.client_certificate_authority_root_path).map_err(|e| {
            SystemError::Tls(format!(
                "failed to read client certificate authority root {}: {}",
                config.client_certificate_authority_root_path, e
            ))
        })?;
    info!("gRPC mTLS enabled");
    Ok(tls.client_ca_root(Certificate::from_pem(client_ca_cert)))
}

/// Writes a self-signed certificate for `localhost` to the configured paths.
pub(crate) fn generate_self_signed_certificates(config: &TlsConfig) -> Result<()> {
    let subject_alt_names = vec!["localhost".to_string()];
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names)
        .map_err(|e| SystemError::Tls(format!("certificate generation failed: {e}")))?;

    for path in [&config.server_certificate_path, &config.server_private_key_path] {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&config.server_certificate_path, cert.pem())?;
    std::fs::write(&config.server_private_key_path, key_pair.serialize_pem())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            &config.server_private_key_path,
            std::fs::Permissions::from_mode(0o600),
        )?;
    }
    Ok(())
}
