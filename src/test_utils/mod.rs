//! Helpers shared by the unit tests of every module.
mod common;
mod stream;

pub use common::*;
pub(crate) use stream::*;
