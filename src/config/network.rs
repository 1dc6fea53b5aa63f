use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// HTTP/2 and TCP tuning of the discovery server.
///
/// Discovery streams are long-lived and mostly idle, so keepalives matter
/// more than throughput.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Max concurrent requests per connection
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// HTTP2 SETTINGS_MAX_CONCURRENT_STREAMS
    #[serde(default = "default_max_streams")]
    pub max_concurrent_streams: u32,

    /// TCP keepalive in seconds
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Initial connection-level flow control window in bytes
    #[serde(default = "default_conn_window_size")]
    pub connection_window_size: u32,

    /// Initial stream-level flow control window in bytes
    #[serde(default = "default_stream_window_size")]
    pub stream_window_size: u32,

    /// Enable HTTP2 adaptive window sizing
    #[serde(default = "default_adaptive_window")]
    pub adaptive_window: bool,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            max_concurrent_streams: default_max_streams(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            connection_window_size: default_conn_window_size(),
            stream_window_size: default_stream_window_size(),
            adaptive_window: default_adaptive_window(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::Config(ConfigError::Message(
                "concurrency_limit must be > 0".into(),
            )));
        }

        if self.max_concurrent_streams == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_concurrent_streams must be > 0".into(),
            )));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "keepalive timeout {}s must be < interval {}s",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            ))));
        }

        if !self.adaptive_window {
            const MIN_WINDOW: u32 = 65535; // HTTP2 minimum
            if self.stream_window_size < MIN_WINDOW {
                return Err(Error::Config(ConfigError::Message(format!(
                    "stream window size {} below minimum {}",
                    self.stream_window_size, MIN_WINDOW
                ))));
            }

            if self.connection_window_size < self.stream_window_size {
                return Err(Error::Config(ConfigError::Message(format!(
                    "connection window {} smaller than stream window {}",
                    self.connection_window_size, self.stream_window_size
                ))));
            }
        }

        Ok(())
    }
}

fn default_concurrency_limit() -> usize {
    1024
}
fn default_max_streams() -> u32 {
    1000
}
fn default_tcp_keepalive() -> u64 {
    300
}
fn default_h2_keepalive_interval() -> u64 {
    30
}
fn default_h2_keepalive_timeout() -> u64 {
    10
}
fn default_conn_window_size() -> u32 {
    4_194_304
}
fn default_stream_window_size() -> u32 {
    1_048_576
}
fn default_adaptive_window() -> bool {
    false
}
fn default_tcp_nodelay() -> bool {
    true
}
