//! Logical hub sessions and the factory that opens live ones.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::ports::config::{ConfigAccess, ScopedOverride, PRIMARY_SERVER_KEY, SECONDARY_SERVER_KEY};
use crate::ports::hub::HubSession;

/// Production hub used when a suite does not override the endpoint.
pub const DEFAULT_HUB_URL: &str = "https://koji.fedoraproject.org/kojihub";

/// Environment variable that allows authenticated live sessions.
pub const AUTH_GATE_VAR: &str = "TEST_ALLOW_LOGGED_IN";

/// A named hub role. Each role has its own endpoint and cassette identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionRole {
    /// The hub builds are scheduled on.
    Primary,
    /// A second hub used for cross-instance lookups.
    Secondary,
}

impl SessionRole {
    /// Every role, primary first.
    pub const ALL: [Self; 2] = [Self::Primary, Self::Secondary];

    /// Role identifier as used in configuration and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Configuration key holding this role's hub URL.
    #[must_use]
    pub fn server_key(self) -> &'static str {
        match self {
            Self::Primary => PRIMARY_SERVER_KEY,
            Self::Secondary => SECONDARY_SERVER_KEY,
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a live session identifies itself to the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// No login; read-only calls only.
    #[default]
    Anonymous,
    /// Logged in with real credentials.
    Authenticated,
}

/// Returns true for the values the auth gate accepts: `1`, `true`, `y`.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "y")
}

/// Opt-in gate for authenticated live sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthGate {
    open: bool,
}

impl AuthGate {
    /// Gate that refuses authenticated sessions.
    #[must_use]
    pub fn closed() -> Self {
        Self { open: false }
    }

    /// Gate that allows authenticated sessions.
    #[must_use]
    pub fn open() -> Self {
        Self { open: true }
    }

    /// Reads [`AUTH_GATE_VAR`] from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self { open: std::env::var(AUTH_GATE_VAR).is_ok_and(|v| is_truthy(&v)) }
    }

    /// True if authenticated sessions are allowed.
    #[must_use]
    pub fn is_open(self) -> bool {
        self.open
    }
}

/// Hub URL per role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    primary: String,
    secondary: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self { primary: DEFAULT_HUB_URL.to_owned(), secondary: None }
    }
}

impl Endpoints {
    /// Overrides the primary URL.
    #[must_use]
    pub fn with_primary(mut self, url: impl Into<String>) -> Self {
        self.primary = url.into();
        self
    }

    /// Overrides the secondary URL. Without an override the secondary role
    /// uses the primary URL.
    #[must_use]
    pub fn with_secondary(mut self, url: impl Into<String>) -> Self {
        self.secondary = Some(url.into());
        self
    }

    /// URL for `role`.
    #[must_use]
    pub fn for_role(&self, role: SessionRole) -> &str {
        match role {
            SessionRole::Primary => &self.primary,
            SessionRole::Secondary => self.secondary.as_deref().unwrap_or(&self.primary),
        }
    }
}

/// Opens live hub sessions. Implemented by the XML-RPC client and by test fakes.
pub trait Connector: Send + Sync {
    /// Creates a session talking to `endpoint`. Must not perform network I/O;
    /// connecting and logging in happen on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be constructed (bad URL,
    /// unreadable credentials).
    fn connect(
        &self,
        role: SessionRole,
        endpoint: &str,
        auth: AuthMode,
    ) -> HarnessResult<Box<dyn HubSession>>;
}

/// A live session plus the configuration override it was opened under.
pub struct OpenedSession {
    /// Role the session serves.
    pub role: SessionRole,
    /// Auth mode actually used.
    pub auth: AuthMode,
    /// Endpoint the session talks to.
    pub endpoint: String,
    session: Box<dyn HubSession>,
    server_override: ScopedOverride,
}

impl OpenedSession {
    /// Splits into the live session and the override guard that must stay
    /// alive for as long as the session is in use.
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn HubSession>, ScopedOverride) {
        (self.session, self.server_override)
    }
}

impl fmt::Debug for OpenedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedSession")
            .field("role", &self.role)
            .field("auth", &self.auth)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Builds live sessions for logical roles, honouring the auth gate.
pub struct SessionFactory {
    connector: Arc<dyn Connector>,
    config: Arc<dyn ConfigAccess>,
    endpoints: Endpoints,
    gate: AuthGate,
}

impl SessionFactory {
    /// Creates a factory with production endpoints and the gate read from the
    /// environment.
    pub fn new(connector: Arc<dyn Connector>, config: Arc<dyn ConfigAccess>) -> Self {
        Self { connector, config, endpoints: Endpoints::default(), gate: AuthGate::from_env() }
    }

    /// Replaces the endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Replaces the auth gate.
    #[must_use]
    pub fn with_gate(mut self, gate: AuthGate) -> Self {
        self.gate = gate;
        self
    }

    /// Configured endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Auth mode a session will actually get: authenticated only when both
    /// requested and allowed by the gate.
    #[must_use]
    pub fn effective_auth(&self, role: SessionRole, requested: AuthMode) -> AuthMode {
        match requested {
            AuthMode::Authenticated if !self.gate.is_open() => {
                warn!(
                    "{role}: authenticated session requested but {AUTH_GATE_VAR} is not set, \
                     using anonymous"
                );
                AuthMode::Anonymous
            }
            mode => mode,
        }
    }

    /// Fails if `requested` would need real credentials the gate does not allow.
    /// Used before recording, where a silent downgrade would capture different
    /// behaviour than the test asked for.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::AuthDisabled`].
    pub fn check_recording_auth(
        &self,
        role: SessionRole,
        requested: AuthMode,
    ) -> HarnessResult<()> {
        if requested == AuthMode::Authenticated && !self.gate.is_open() {
            return Err(HarnessError::AuthDisabled { role });
        }
        Ok(())
    }

    /// Opens the live session for `role`.
    ///
    /// The role's server key is overridden in the injected configuration for
    /// as long as the returned session lives; the connector receives the
    /// value the configuration then reports.
    ///
    /// # Errors
    ///
    /// Propagates connector errors.
    pub fn open(&self, role: SessionRole, requested: AuthMode) -> HarnessResult<OpenedSession> {
        let auth = self.effective_auth(role, requested);
        let key = role.server_key();
        let server_override =
            ScopedOverride::new(Arc::clone(&self.config), key, self.endpoints.for_role(role));
        let endpoint =
            self.config.get(key).unwrap_or_else(|| self.endpoints.for_role(role).to_owned());

        let session = self.connector.connect(role, &endpoint, auth)?;
        info!("{role}: opened {auth:?} hub session for {endpoint}");
        Ok(OpenedSession { role, auth, endpoint, session, server_override })
    }
}
