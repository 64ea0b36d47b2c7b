//! Port traits defining the harness boundaries.
//!
//! [`hub`] is the boundary between code under test and the build hub;
//! [`config`] is the service configuration the harness overrides per scope.
//! Implementations live in `src/adapters/`.

pub mod config;
pub mod hub;

pub use config::{ConfigAccess, MemoryConfig, ScopedOverride};
pub use hub::{HubSession, KojiCalls, SessionProvider, TaskInfo, TaskState};
