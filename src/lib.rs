//! Record-and-replay harness for build hub sessions.
//!
//! Tests talk to the hub through a [`SessionProvider`]. Inside a
//! [`CassetteScope`] each session is a [`ProxySession`]: the first run forwards
//! calls to the live hub and records them into a cassette, later runs replay
//! the cassette without touching the network. Hub faults are recorded too and
//! come back with the same kind and message.

pub mod adapters;
pub mod cassette;
pub mod config;
pub mod error;
pub mod harness;
pub mod plugin;
pub mod ports;
pub mod proxy;
pub mod session;

pub use adapters::live::{HubClient, XmlRpcConnector};
pub use adapters::unconfigured::{UnconfiguredSession, UnconfiguredSessions};
pub use cassette::{CallArgs, CassetteName, CassetteStore, Interaction, MatchPolicy, Outcome};
pub use config::HarnessSettings;
pub use error::{Fault, HarnessError, HarnessResult};
pub use harness::{CassetteHarness, CassetteScope, ScopeBuilder, SecondaryMode};
pub use plugin::{Plugin, PluginRegistry};
pub use ports::{
    ConfigAccess, HubSession, KojiCalls, MemoryConfig, ScopedOverride, SessionProvider, TaskInfo,
    TaskState,
};
pub use proxy::{ProxyMode, ProxySession};
pub use session::{AuthGate, AuthMode, Connector, Endpoints, SessionFactory, SessionRole};
