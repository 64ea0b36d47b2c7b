//! Adapters implementing the hub port.

pub mod live;
pub mod unconfigured;
