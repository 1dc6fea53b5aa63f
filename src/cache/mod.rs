//! Snapshot cache: per-node resource snapshots plus the watches waiting on
//! them.

mod node_hash;
mod snapshot;
mod snapshot_cache;
mod version;
mod watch;

pub use node_hash::*;
pub use snapshot::*;
pub use snapshot_cache::*;
pub use version::*;
pub use watch::*;
