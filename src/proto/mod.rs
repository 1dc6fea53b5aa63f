//! Protocol Buffer definitions and generated code for the discovery services.
//!
//! Generated by [`tonic-build`] from `proto/discovery.proto`. The helpers in
//! this module only add small conveniences on top of the generated types.

mod discovery {
    tonic::include_proto!("xds.discovery");
}

pub use discovery::*;

impl DiscoveryRequest {
    /// A request is a NACK when the proxy attached error details.
    pub fn is_nack(&self) -> bool {
        self.error_detail.is_some()
    }
}
