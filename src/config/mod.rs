//! Configuration management for the control plane.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Section-wise validation
mod cache;
mod monitoring;
mod network;
mod server;
mod tls;
pub use cache::*;
pub use monitoring::*;
pub use network::*;
pub use server::*;
pub use tls::*;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod tls_test;

use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Prefix of environment variables that override configuration values,
/// e.g. `XDS__SERVER__LISTEN_ADDRESS`.
const ENV_PREFIX: &str = "XDS";

/// Main configuration container of a control plane process
///
/// Combines all section configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct XdsNodeConfig {
    /// Listener, logging and response stream settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Snapshot cache behaviour
    #[serde(default)]
    pub cache: CacheConfig,
    /// HTTP/2 and TCP tuning of the gRPC server
    #[serde(default)]
    pub network: NetworkConfig,
    /// Prometheus exporter
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// TLS/SSL security configuration
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Debug for XdsNodeConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("XdsNodeConfig")
            .field("server", &self.server)
            .field("cache", &self.cache)
            .finish()
    }
}

impl XdsNodeConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `XDS__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Callers MUST call
    /// `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/xds.toml");
    /// std::env::set_var("XDS__CACHE__ADS", "true");
    /// let cfg = XdsNodeConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Consumes self and performs validation of all sections. Must be called
    /// after all configuration overrides.
    pub fn validate(self) -> Result<Self> {
        self.server.validate()?;
        self.network.validate()?;
        self.monitoring.validate()?;
        self.tls.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} path cannot be empty"
        ))));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                Error::Config(ConfigError::Message(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                )))
            })?;
        }

        let test_file = path.join(".permission_test");
        fs::write(&test_file, b"test").map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            )))
        })?;
        fs::remove_file(&test_file).ok();
    }

    Ok(())
}
