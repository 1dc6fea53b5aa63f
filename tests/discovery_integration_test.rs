mod common;

use std::time::Duration;

use common::demo_snapshot;
use common::next_response;
use common::request;
use common::request_channel;
use common::start_server;
use common::NODE_ID;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tonic::Code;
use xds_plane::constants::CLUSTER_TYPE_URL;
use xds_plane::constants::ENDPOINT_TYPE_URL;
use xds_plane::constants::LISTENER_TYPE_URL;
use xds_plane::proto::aggregated_discovery_service_client::AggregatedDiscoveryServiceClient;
use xds_plane::proto::cluster_discovery_service_client::ClusterDiscoveryServiceClient;
use xds_plane::proto::endpoint_discovery_service_client::EndpointDiscoveryServiceClient;
use xds_plane::proto::ErrorDetail;
use xds_plane::ResourceType;

#[tokio::test]
async fn test_ads_stream_receives_initial_config_and_updates() {
    let server = start_server(demo_snapshot("2")).await;
    let mut client = AggregatedDiscoveryServiceClient::connect(server.endpoint())
        .await
        .unwrap();

    let (tx, requests) = request_channel();
    tx.send(request(CLUSTER_TYPE_URL, "", "")).await.unwrap();
    let mut responses = client
        .stream_aggregated_resources(requests)
        .await
        .unwrap()
        .into_inner();

    let clusters = next_response(&mut responses).await.unwrap();
    assert_eq!(clusters.type_url, CLUSTER_TYPE_URL);
    assert_eq!(clusters.version_info, "2");
    assert_eq!(clusters.resources.len(), 1);
    assert_eq!(clusters.resources[0].name, "cluster0");

    tx.send(request(ENDPOINT_TYPE_URL, "", "")).await.unwrap();
    let endpoints = next_response(&mut responses).await.unwrap();
    assert_eq!(endpoints.type_url, ENDPOINT_TYPE_URL);
    assert_eq!(endpoints.version_info, "2");

    // ACK both, then publish a new version
    tx.send(request(CLUSTER_TYPE_URL, "2", &clusters.nonce)).await.unwrap();
    tx.send(request(ENDPOINT_TYPE_URL, "2", &endpoints.nonce)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.cache.set_snapshot(NODE_ID, demo_snapshot("3")).unwrap();

    let mut updated = Vec::new();
    for _ in 0..2 {
        let response = next_response(&mut responses).await.unwrap();
        assert_eq!(response.version_info, "3");
        updated.push(response.type_url);
    }
    updated.sort();
    let mut expected = vec![CLUSTER_TYPE_URL.to_string(), ENDPOINT_TYPE_URL.to_string()];
    expected.sort();
    assert_eq!(updated, expected);

    drop(tx);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_nack_keeps_stream_open() {
    let server = start_server(demo_snapshot("2")).await;
    let mut client = AggregatedDiscoveryServiceClient::connect(server.endpoint())
        .await
        .unwrap();

    let (tx, requests) = request_channel();
    tx.send(request(LISTENER_TYPE_URL, "", "")).await.unwrap();
    let mut responses = client
        .stream_aggregated_resources(requests)
        .await
        .unwrap()
        .into_inner();

    let listeners = next_response(&mut responses).await.unwrap();
    assert_eq!(listeners.version_info, "2");

    let mut nack = request(LISTENER_TYPE_URL, "", &listeners.nonce);
    nack.error_detail = Some(ErrorDetail {
        code: 3,
        message: "bad listener".to_string(),
    });
    tx.send(nack).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        server.cache.pending_watch_count(NODE_ID, ResourceType::Listener),
        1
    );

    server.cache.set_snapshot(NODE_ID, demo_snapshot("3")).unwrap();
    let fixed = next_response(&mut responses).await.unwrap();
    assert_eq!(fixed.version_info, "3");
    assert_ne!(fixed.nonce, listeners.nonce);

    drop(tx);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_single_type_stream_with_empty_type_url() {
    let server = start_server(demo_snapshot("2")).await;
    let mut client = EndpointDiscoveryServiceClient::connect(server.endpoint())
        .await
        .unwrap();

    let (tx, requests) = request_channel();
    tx.send(request("", "", "")).await.unwrap();
    let mut responses = client.stream_endpoints(requests).await.unwrap().into_inner();

    let endpoints = next_response(&mut responses).await.unwrap();
    assert_eq!(endpoints.type_url, ENDPOINT_TYPE_URL);
    assert_eq!(endpoints.resources[0].name, "cluster0");

    drop(tx);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_nonce_on_single_type_stream_fails_it() {
    let server = start_server(demo_snapshot("2")).await;
    let mut client = ClusterDiscoveryServiceClient::connect(server.endpoint())
        .await
        .unwrap();

    let (tx, requests) = request_channel();
    tx.send(request(CLUSTER_TYPE_URL, "", "")).await.unwrap();
    let mut responses = client.stream_clusters(requests).await.unwrap().into_inner();
    next_response(&mut responses).await.unwrap();

    tx.send(request(CLUSTER_TYPE_URL, "2", "9999")).await.unwrap();
    let status = next_response(&mut responses).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    drop(tx);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_fetch_clusters() {
    let server = start_server(demo_snapshot("2")).await;
    let mut client = ClusterDiscoveryServiceClient::connect(server.endpoint())
        .await
        .unwrap();

    let response = client
        .fetch_clusters(request(CLUSTER_TYPE_URL, "", ""))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.version_info, "2");
    assert_eq!(response.resources[0].name, "cluster0");

    let status = client
        .fetch_clusters(request(CLUSTER_TYPE_URL, "2", ""))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_open_streams() {
    let server = start_server(demo_snapshot("2")).await;
    let mut client = AggregatedDiscoveryServiceClient::connect(server.endpoint())
        .await
        .unwrap();

    let (tx, requests) = request_channel();
    tx.send(request(CLUSTER_TYPE_URL, "", "")).await.unwrap();
    let mut responses = client
        .stream_aggregated_resources(requests)
        .await
        .unwrap()
        .into_inner();
    let clusters = next_response(&mut responses).await.unwrap();
    tx.send(request(CLUSTER_TYPE_URL, "2", &clusters.nonce)).await.unwrap();

    // the proxy keeps its request stream open; shutdown must still complete
    server.stop().await.unwrap();

    let end = timeout(Duration::from_secs(2), responses.next()).await.unwrap();
    assert!(!matches!(end, Some(Ok(_))));
    drop(tx);
}
