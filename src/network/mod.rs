//! Network layer of the control plane.
pub mod grpc;
