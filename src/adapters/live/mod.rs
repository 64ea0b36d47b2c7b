//! Live adapter: XML-RPC over HTTPS to a real hub.

pub mod hub;
pub mod xmlrpc;

pub use hub::{HubClient, XmlRpcConnector};
