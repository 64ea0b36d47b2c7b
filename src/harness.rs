//! Per-test cassette scopes.
//!
//! A [`CassetteHarness`] owns the cassette library and the session factory for
//! a test suite. Each test opens one [`CassetteScope`]: on entry every
//! requested role gets a live session wrapped in a [`ProxySession`], and on
//! exit every recording proxy is flushed exactly once, whether the test body
//! returned, failed or panicked.
//!
//! ```no_run
//! use std::sync::Arc;
//! use koji_cassette::{
//!     CassetteHarness, CassetteName, CassetteStore, KojiCalls, MemoryConfig, SessionFactory,
//!     SessionProvider, SessionRole, XmlRpcConnector,
//! };
//!
//! # fn main() -> koji_cassette::HarnessResult<()> {
//! let factory = SessionFactory::new(
//!     Arc::new(XmlRpcConnector::default()),
//!     Arc::new(MemoryConfig::default()),
//! );
//! let harness = CassetteHarness::new(CassetteStore::new("tests/data"), factory);
//!
//! let version = harness.with_cassette(CassetteName::new("hub/version")?, |scope| {
//!     scope.hub(SessionRole::Primary).get_api_version()
//! })?;
//! # let _ = version;
//! # Ok(())
//! # }
//! ```

use log::{error, info};

use crate::adapters::unconfigured::UnconfiguredSession;
use crate::cassette::format::Interaction;
use crate::cassette::name::CassetteName;
use crate::cassette::replayer::MatchPolicy;
use crate::cassette::store::CassetteStore;
use crate::error::{HarnessError, HarnessResult};
use crate::ports::config::ScopedOverride;
use crate::ports::hub::{HubSession, SessionProvider};
use crate::proxy::{ProxyMode, ProxySession};
use crate::session::{AuthMode, SessionFactory, SessionRole};

/// How the secondary role is served inside a scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecondaryMode {
    /// Secondary calls go to the primary proxy and cassette.
    #[default]
    Alias,
    /// Secondary gets its own proxy, endpoint and `.secondary` cassette.
    Separate,
    /// Secondary is not available; any call fails.
    Disabled,
}

/// Cassette library plus session factory shared by a test suite.
pub struct CassetteHarness {
    store: CassetteStore,
    factory: SessionFactory,
}

impl CassetteHarness {
    /// Creates a harness.
    pub fn new(store: CassetteStore, factory: SessionFactory) -> Self {
        Self { store, factory }
    }

    /// The cassette library.
    #[must_use]
    pub fn store(&self) -> &CassetteStore {
        &self.store
    }

    /// The session factory.
    #[must_use]
    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    /// Starts configuring a scope bound to a single cassette.
    #[must_use]
    pub fn cassette(&self, name: CassetteName) -> ScopeBuilder<'_> {
        self.builder(vec![name])
    }

    /// Starts configuring a scope bound to a stack of cassettes.
    ///
    /// Every cassette but the last must already exist and is only replayed;
    /// the last one decides the mode and is the one recorded into.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidCassetteName`] for an empty stack.
    pub fn stacked(
        &self,
        names: impl IntoIterator<Item = CassetteName>,
    ) -> HarnessResult<ScopeBuilder<'_>> {
        let names: Vec<CassetteName> = names.into_iter().collect();
        if names.is_empty() {
            return Err(HarnessError::InvalidCassetteName {
                name: String::new(),
                reason: "a cassette stack needs at least one cassette".to_owned(),
            });
        }
        Ok(self.builder(names))
    }

    /// Runs `body` inside a default scope for `name`. Shorthand for
    /// `self.cassette(name).run(body)`.
    ///
    /// # Errors
    ///
    /// See [`ScopeBuilder::run`].
    pub fn with_cassette<T>(
        &self,
        name: CassetteName,
        body: impl FnOnce(&CassetteScope<'_>) -> HarnessResult<T>,
    ) -> HarnessResult<T> {
        self.cassette(name).run(body)
    }

    fn builder(&self, names: Vec<CassetteName>) -> ScopeBuilder<'_> {
        ScopeBuilder {
            harness: self,
            names,
            secondary: SecondaryMode::default(),
            auth: AuthMode::default(),
            policy: MatchPolicy::default(),
            replay_only: false,
        }
    }
}

/// Options for one scope. Built by [`CassetteHarness::cassette`].
#[must_use = "a scope builder does nothing until `enter` or `run` is called"]
pub struct ScopeBuilder<'h> {
    harness: &'h CassetteHarness,
    names: Vec<CassetteName>,
    secondary: SecondaryMode,
    auth: AuthMode,
    policy: MatchPolicy,
    replay_only: bool,
}

impl<'h> ScopeBuilder<'h> {
    /// How the secondary role is served.
    pub fn secondary(mut self, mode: SecondaryMode) -> Self {
        self.secondary = mode;
        self
    }

    /// Auth mode requested for the live sessions.
    pub fn auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    /// Replay matching policy.
    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Refuse to record: a missing cassette fails the scope instead of
    /// reaching the live hub.
    pub fn replay_only(mut self) -> Self {
        self.replay_only = true;
        self
    }

    /// Opens the scope.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CassetteMissing`] when a cassette that must be
    /// replayed does not exist, [`HarnessError::AuthDisabled`] when an
    /// authenticated recording is requested without the gate, storage errors
    /// from loading, and connector errors.
    pub fn enter(self) -> HarnessResult<CassetteScope<'h>> {
        let harness = self.harness;
        let mut overrides = Vec::new();

        let (primary, guard) = self.open_proxy(SessionRole::Primary, &self.names)?;
        overrides.push(guard);

        let secondary = match self.secondary {
            SecondaryMode::Alias => SecondarySlot::Alias,
            SecondaryMode::Disabled => {
                SecondarySlot::Disabled(UnconfiguredSession::new(SessionRole::Secondary))
            }
            SecondaryMode::Separate => {
                let names: Vec<CassetteName> =
                    self.names.iter().map(CassetteName::secondary).collect();
                let (proxy, guard) = self.open_proxy(SessionRole::Secondary, &names)?;
                overrides.push(guard);
                SecondarySlot::Separate(proxy)
            }
        };

        Ok(CassetteScope {
            store: &harness.store,
            primary,
            secondary,
            overrides,
            finished: false,
        })
    }

    /// Runs `body` inside the scope and flushes afterwards.
    ///
    /// The flush happens whatever `body` returns. If `body` panics the scope
    /// is flushed while unwinding.
    ///
    /// # Errors
    ///
    /// Returns the body's error, the flush error, or
    /// [`HarnessError::FlushAfterFailure`] carrying both.
    pub fn run<T>(
        self,
        body: impl FnOnce(&CassetteScope<'h>) -> HarnessResult<T>,
    ) -> HarnessResult<T> {
        let scope = self.enter()?;
        let outcome = body(&scope);
        let flushed = scope.finish();
        match (outcome, flushed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Err(body), Err(flush)) => Err(HarnessError::FlushAfterFailure {
                body: Box::new(body),
                flush: Box::new(flush),
            }),
        }
    }

    fn open_proxy(
        &self,
        role: SessionRole,
        names: &[CassetteName],
    ) -> HarnessResult<(ProxySession, ScopedOverride)> {
        let store = &self.harness.store;
        let factory = &self.harness.factory;
        let Some((target, earlier)) = names.split_last() else {
            return Err(HarnessError::InvalidCassetteName {
                name: String::new(),
                reason: "a cassette stack needs at least one cassette".to_owned(),
            });
        };

        let mut loaded: Vec<Interaction> = Vec::new();
        for name in earlier {
            let interactions = store.load(name)?.ok_or_else(|| HarnessError::CassetteMissing {
                cassette: name.to_string(),
            })?;
            loaded.extend(interactions);
        }

        let proxy = match store.load(target)? {
            Some(recorded) => {
                loaded.extend(recorded);
                // Replay never goes live, so it never needs credentials.
                let (session, guard) = factory.open(role, AuthMode::Anonymous)?.into_parts();
                info!("{role}: replaying {} interactions from {target}", loaded.len());
                (ProxySession::replaying(session, target.clone(), loaded, self.policy), guard)
            }
            None if self.replay_only => {
                return Err(HarnessError::CassetteMissing { cassette: target.to_string() });
            }
            None => {
                factory.check_recording_auth(role, self.auth)?;
                let (session, guard) = factory.open(role, self.auth)?.into_parts();
                info!("{role}: recording into {target}");
                (ProxySession::recording(session, target.clone(), loaded, self.policy), guard)
            }
        };
        Ok(proxy)
    }
}

enum SecondarySlot {
    Alias,
    Separate(ProxySession),
    Disabled(UnconfiguredSession),
}

/// An open cassette scope: the session accessor handed to code under test.
///
/// Dropping the scope without calling [`CassetteScope::finish`] still
/// flushes. A failed flush then panics, or is logged if the thread is
/// already unwinding. Endpoint overrides are restored after the flush.
pub struct CassetteScope<'h> {
    store: &'h CassetteStore,
    primary: ProxySession,
    secondary: SecondarySlot,
    overrides: Vec<ScopedOverride>,
    finished: bool,
}

impl CassetteScope<'_> {
    /// The primary role's proxy.
    #[must_use]
    pub fn primary(&self) -> &ProxySession {
        &self.primary
    }

    /// The secondary role's own proxy, if it has one.
    #[must_use]
    pub fn separate_secondary(&self) -> Option<&ProxySession> {
        match &self.secondary {
            SecondarySlot::Separate(proxy) => Some(proxy),
            SecondarySlot::Alias | SecondarySlot::Disabled(_) => None,
        }
    }

    /// Mode of the primary proxy.
    #[must_use]
    pub fn mode(&self) -> ProxyMode {
        self.primary.mode()
    }

    /// Number of endpoint overrides held by the scope.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Flushes every recording proxy and closes the scope.
    ///
    /// # Errors
    ///
    /// Returns the first [`HarnessError::Storage`] failure. Every proxy is
    /// attempted even if an earlier one failed.
    pub fn finish(mut self) -> HarnessResult<()> {
        self.finished = true;
        self.flush_all()
    }

    fn proxies(&self) -> impl Iterator<Item = &ProxySession> {
        std::iter::once(&self.primary).chain(self.separate_secondary())
    }

    fn flush_all(&self) -> HarnessResult<()> {
        let mut first = None;
        for proxy in self.proxies() {
            if let Err(e) = proxy.flush(self.store) {
                error!("{}: flush failed: {e}", proxy.cassette());
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl SessionProvider for CassetteScope<'_> {
    fn hub(&self, role: SessionRole) -> &dyn HubSession {
        match (role, &self.secondary) {
            (SessionRole::Primary, _) | (SessionRole::Secondary, SecondarySlot::Alias) => {
                &self.primary
            }
            (SessionRole::Secondary, SecondarySlot::Separate(proxy)) => proxy,
            (SessionRole::Secondary, SecondarySlot::Disabled(stand_in)) => stand_in,
        }
    }
}

impl Drop for CassetteScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let unwinding = std::thread::panicking();
        if unwinding {
            info!("{}: flushing after panic", self.primary.cassette());
        }
        match self.flush_all() {
            Ok(()) => {}
            Err(e) if unwinding => error!("cassette scope dropped with an unsaved cassette: {e}"),
            Err(e) => panic!("cassette scope dropped with an unsaved cassette: {e}"),
        }
    }
}
