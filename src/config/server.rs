use std::net::SocketAddr;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the discovery services listen on
    /// Default: 0.0.0.0:8080
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Directory of the rolling log files
    /// Default: "./logs"
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Responses buffered per stream before the connection task waits for
    /// the transport
    #[serde(default = "default_response_buffer_size")]
    pub response_buffer_size: usize,

    /// Largest encoded or decoded gRPC message in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Accept and send gzip compressed messages
    #[serde(default = "default_enable_compression")]
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_dir: default_log_dir(),
            response_buffer_size: default_response_buffer_size(),
            max_message_size: default_max_message_size(),
            enable_compression: default_enable_compression(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.port() == 0 {
            return Err(Error::Config(ConfigError::Message(
                "listen_address must specify a port".into(),
            )));
        }

        if self.response_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "response_buffer_size must be > 0".into(),
            )));
        }

        // 4 KiB is below any useful xDS payload
        if self.max_message_size < 4096 {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_message_size {} too small, minimum 4096 bytes",
                self.max_message_size
            ))));
        }

        validate_directory(&self.log_dir, "log")
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_response_buffer_size() -> usize {
    64
}
fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}
fn default_enable_compression() -> bool {
    true
}
