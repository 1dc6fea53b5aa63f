use std::io::Write;

use tempfile::NamedTempFile;

use crate::config::tls::TlsConfig;
use crate::Error;

#[test]
fn test_tls_config_default_values() {
    let config = TlsConfig::default();

    assert!(!config.enable_tls);
    assert!(!config.generate_self_signed_certificates);
    assert!(!config.enable_mtls);
    assert!(
        config.validate().is_ok(),
        "Default config should validate when TLS is disabled"
    );
    assert_eq!(config.server_certificate_path, "./certs/server.pem");
    assert_eq!(config.server_private_key_path, "./certs/server.key");
}

#[test]
fn test_validate_mtls_without_tls_should_fail() {
    let config = TlsConfig {
        enable_tls: false,
        enable_mtls: true,
        ..Default::default()
    };

    let error = config.validate().unwrap_err();
    assert!(matches!(error, Error::Config(_)));
    assert!(error.to_string().contains("mTLS requires enable_tls to be true"));
}

#[test]
fn test_validate_missing_certificate_should_fail() {
    let config = TlsConfig {
        enable_tls: true,
        server_certificate_path: "/nonexistent/server.pem".to_string(),
        ..Default::default()
    };

    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("not found"));
}

#[test]
fn test_validate_self_signed_needs_output_paths() {
    let config = TlsConfig {
        enable_tls: true,
        generate_self_signed_certificates: true,
        server_private_key_path: String::new(),
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = TlsConfig {
        enable_tls: true,
        generate_self_signed_certificates: true,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[cfg(unix)]
#[test]
fn test_validate_key_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let mut cert = NamedTempFile::new().unwrap();
    writeln!(cert, "-----BEGIN CERTIFICATE-----").unwrap();
    let key = NamedTempFile::new().unwrap();

    let config = TlsConfig {
        enable_tls: true,
        server_certificate_path: cert.path().to_str().unwrap().to_string(),
        server_private_key_path: key.path().to_str().unwrap().to_string(),
        ..Default::default()
    };

    std::fs::set_permissions(key.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("Insecure permissions"));

    std::fs::set_permissions(key.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
    assert!(config.validate().is_ok());
}
