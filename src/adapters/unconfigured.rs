//! Stand-in sessions for roles no cassette was set up for.

use log::error;
use serde_json::Value;

use crate::cassette::format::CallArgs;
use crate::error::{HarnessError, HarnessResult};
use crate::ports::hub::{HubSession, SessionProvider};
use crate::session::SessionRole;

/// A session that fails every call. Any use means the code under test
/// reached a hub the test did not expect it to touch.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredSession {
    role: SessionRole,
}

impl UnconfiguredSession {
    /// Stand-in for `role`.
    #[must_use]
    pub fn new(role: SessionRole) -> Self {
        Self { role }
    }
}

impl HubSession for UnconfiguredSession {
    fn call(&self, method: &str, _args: &CallArgs) -> HarnessResult<Value> {
        error!("unexpected `{method}` call on the {} hub session", self.role);
        Err(HarnessError::UnexpectedSession { role: self.role })
    }
}

/// Accessor used outside any cassette scope: every role is unconfigured.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredSessions {
    primary: UnconfiguredSession,
    secondary: UnconfiguredSession,
}

impl Default for UnconfiguredSessions {
    fn default() -> Self {
        Self {
            primary: UnconfiguredSession::new(SessionRole::Primary),
            secondary: UnconfiguredSession::new(SessionRole::Secondary),
        }
    }
}

impl SessionProvider for UnconfiguredSessions {
    fn hub(&self, role: SessionRole) -> &dyn HubSession {
        match role {
            SessionRole::Primary => &self.primary,
            SessionRole::Secondary => &self.secondary,
        }
    }
}
