use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_xds_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("XDS__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = XdsNodeConfig::default();

    assert_eq!(config.server.listen_address.to_string(), "0.0.0.0:8080");
    assert_eq!(config.server.response_buffer_size, 64);
    assert!(config.server.enable_compression);
    assert!(!config.cache.ads);
    assert_eq!(config.cache.node_hash, NodeHashKind::Id);
    assert!(!config.monitoring.prometheus_enabled);
    assert!(!config.tls.enable_tls);
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_xds_env_vars();
    with_vars(
        vec![
            ("XDS__CACHE__ADS", Some("true")),
            ("XDS__CACHE__NODE_HASH", Some("cluster")),
            ("XDS__SERVER__RESPONSE_BUFFER_SIZE", Some("128")),
        ],
        || {
            let config = XdsNodeConfig::new().unwrap();

            assert!(config.cache.ads);
            assert_eq!(config.cache.node_hash, NodeHashKind::Cluster);
            assert_eq!(config.server.response_buffer_size, 128);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_xds_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [server]
        listen_address = "127.0.0.1:18000"
        log_dir = "/tmp/xds/logs"

        [network]
        http2_keep_alive_interval_in_secs = 60
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = XdsNodeConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.server.listen_address.port(), 18000);
        assert_eq!(config.server.log_dir.to_str(), Some("/tmp/xds/logs"));
        assert_eq!(config.network.http2_keep_alive_interval_in_secs, 60);
        assert_eq!(config.network.http2_keep_alive_timeout_in_secs, 10);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_xds_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [monitoring]
        prometheus_enabled = true
        prometheus_port = 9100
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("XDS__MONITORING__PROMETHEUS_PORT", Some("9200")),
        ],
        || {
            let config = XdsNodeConfig::new().unwrap();

            assert!(config.monitoring.prometheus_enabled);
            assert_eq!(config.monitoring.prometheus_port, 9200);
        },
    );
}

#[test]
#[serial]
fn missing_config_file_should_fail() {
    cleanup_all_xds_env_vars();
    with_vars(
        vec![("CONFIG_PATH", Some("/nonexistent/xds-config.toml"))],
        || {
            assert!(matches!(XdsNodeConfig::new(), Err(Error::Config(_))));
        },
    );
}

#[test]
fn validation_should_detect_invalid_tls_settings() {
    let mut config = XdsNodeConfig::default();
    config.tls.enable_mtls = true;
    config.tls.enable_tls = false;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_privileged_metrics_port() {
    let mut config = XdsNodeConfig::default();
    config.monitoring.prometheus_enabled = true;
    config.monitoring.prometheus_port = 80;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_bad_server_settings() {
    let mut config = XdsNodeConfig::default();
    config.server.response_buffer_size = 0;
    assert!(config.validate().is_err());

    let mut config = XdsNodeConfig::default();
    config.server.max_message_size = 1024;
    assert!(config.validate().is_err());

    let mut config = XdsNodeConfig::default();
    config.server.log_dir = std::path::PathBuf::new();
    assert!(config.validate().is_err());
}

#[test]
fn default_config_should_validate() {
    assert!(XdsNodeConfig::default().validate().is_ok());
}

#[test]
#[serial]
fn validate_should_accept_every_cache_setting() {
    for node_hash in [NodeHashKind::Id, NodeHashKind::Cluster] {
        for ads in [false, true] {
            let config = XdsNodeConfig {
                cache: CacheConfig { ads, node_hash },
                ..Default::default()
            };
            let validated = config.validate().unwrap();
            assert_eq!(validated.cache.ads, ads);
            assert_eq!(validated.cache.node_hash, node_hash);
        }
    }
}
