//! xDS configuration control plane.
//!
//! Holds per-node configuration snapshots in a [`SnapshotCache`] and serves
//! them to proxies over the aggregated and per-type discovery services.
//! Applications push new snapshots with [`SnapshotCache::set_snapshot`];
//! every open stream whose proxy is behind receives the update.
//!
//! ```ignore
//! let cache = Arc::new(SnapshotCache::new(false));
//! cache.set_snapshot("node0", snapshot)?;
//!
//! let server = DiscoveryServer::new(cache.clone(), Arc::new(IdHash));
//! start_rpc_server(server, config, shutdown_rx).await?;
//! ```

mod cache;
mod config;
pub mod constants;
mod discovery;
mod errors;
pub mod metrics;
mod network;
pub mod proto;
mod resource;

pub use cache::*;
pub use config::*;
pub use discovery::*;
pub use errors::*;
pub use network::grpc::*;
pub use resource::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
