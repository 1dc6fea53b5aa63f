use std::fs;
use std::path::Path;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// Enables TLS encryption for discovery streams
    /// Default: false (disabled)
    #[serde(default = "default_enable_tls")]
    pub enable_tls: bool,

    /// Generates a self-signed certificate on startup and writes it to
    /// `server_certificate_path` / `server_private_key_path`
    /// Default: false (requires pre-configured certificates)
    #[serde(default = "default_generate_self_signed")]
    pub generate_self_signed_certificates: bool,

    /// Path to Certificate Authority root certificate
    /// Default: "/etc/ssl/certs/ca.pem"
    #[serde(default = "default_ca_path")]
    pub certificate_authority_root_path: String,

    /// Server certificate chain path in PEM format
    /// Default: "./certs/server.pem"
    #[serde(default = "default_server_cert_path")]
    pub server_certificate_path: String,

    /// Server private key path in PEM format
    /// Default: "./certs/server.key"
    #[serde(default = "default_server_key_path")]
    pub server_private_key_path: String,

    /// Client CA certificate path for mTLS authentication of proxies
    /// Default: "/etc/ssl/certs/ca.pem"
    #[serde(default = "default_client_ca_path")]
    pub client_certificate_authority_root_path: String,

    /// Requires proxies to present a certificate signed by the client CA
    /// Default: false (server-side TLS only)
    #[serde(default = "default_enable_mtls")]
    pub enable_mtls: bool,
}
impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enable_tls: default_enable_tls(),
            generate_self_signed_certificates: default_generate_self_signed(),
            certificate_authority_root_path: default_ca_path(),
            server_certificate_path: default_server_cert_path(),
            server_private_key_path: default_server_key_path(),
            client_certificate_authority_root_path: default_client_ca_path(),
            enable_mtls: default_enable_mtls(),
        }
    }
}

impl TlsConfig {
    /// Validates TLS configuration consistency and file existence
    /// # Errors
    /// Returns `Error::Config` when:
    /// - mTLS is enabled without base TLS
    /// - Required certificate files are missing or unreadable
    /// - Self-signed generation has nowhere to write
    pub fn validate(&self) -> Result<()> {
        if self.enable_mtls && !self.enable_tls {
            return Err(Error::Config(ConfigError::Message(
                "mTLS requires enable_tls to be true".into(),
            )));
        }

        if !self.enable_tls {
            return Ok(());
        }

        if self.generate_self_signed_certificates {
            if self.server_certificate_path.is_empty() || self.server_private_key_path.is_empty() {
                return Err(Error::Config(ConfigError::Message(
                    "generate_self_signed_certificates=true needs certificate and key output paths"
                        .into(),
                )));
            }
        } else {
            self.validate_cert_file(&self.server_certificate_path, "server certificate")?;
            self.validate_key_file(&self.server_private_key_path, "server private key")?;
        }

        if self.enable_mtls {
            self.validate_cert_file(
                &self.client_certificate_authority_root_path,
                "client CA certificate",
            )?;
        }

        Ok(())
    }

    /// Validates a certificate file existence and readability
    fn validate_cert_file(
        &self,
        path: &str,
        name: &str,
    ) -> Result<()> {
        let path = Path::new(path);

        if !path.exists() {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} file {} not found",
                name,
                path.display()
            ))));
        }
        fs::File::open(path).map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "{} file {} is unreadable: {}",
                name,
                path.display(),
                e
            )))
        })?;
        Ok(())
    }

    /// Validates a private key file existence and permissions
    fn validate_key_file(
        &self,
        path: &str,
        name: &str,
    ) -> Result<()> {
        let path = Path::new(path);

        if !path.exists() {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} file {} not found",
                name,
                path.display()
            ))));
        }

        let metadata = fs::metadata(path).map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "Cannot access {} permissions: {}",
                path.display(),
                e
            )))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o777 != 0o600 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "Insecure permissions {:o} for {} (should be 600)",
                    mode & 0o777,
                    path.display()
                ))));
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        Ok(())
    }
}

// Default implementations
fn default_enable_tls() -> bool {
    false
}
fn default_generate_self_signed() -> bool {
    false
}
fn default_ca_path() -> String {
    "/etc/ssl/certs/ca.pem".into()
}
fn default_server_cert_path() -> String {
    "./certs/server.pem".into()
}
fn default_server_key_path() -> String {
    "./certs/server.key".into()
}
fn default_client_ca_path() -> String {
    "/etc/ssl/certs/ca.pem".into()
}
fn default_enable_mtls() -> bool {
    false
}
