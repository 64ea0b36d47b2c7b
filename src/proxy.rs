//! Intercepting proxy that stands in for a live hub session.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use log::debug;
use serde_json::Value;

use crate::cassette::format::{CallArgs, Interaction};
use crate::cassette::name::CassetteName;
use crate::cassette::recorder::CassetteRecorder;
use crate::cassette::replayer::{CassetteReplayer, MatchPolicy};
use crate::cassette::store::CassetteStore;
use crate::error::HarnessResult;
use crate::ports::hub::HubSession;

/// Whether a proxy replays a cassette or records a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    /// Serve recorded outcomes; never touch the live session.
    Replay,
    /// Forward to the live session and capture outcomes.
    Record,
}

/// Mutable state behind the proxy. One lock keeps cursor and pending list
/// consistent with each other.
struct ProxyState {
    /// Loaded interactions. In record mode these are the earlier cassettes of
    /// a stack, served before any live call.
    replayer: CassetteReplayer,
    /// Present only in record mode.
    recorder: Option<CassetteRecorder>,
}

/// A hub session bound to a cassette.
///
/// The mode is fixed at construction. Callers see the same values and the
/// same faults in both modes; only latency and network use differ.
pub struct ProxySession {
    target: Box<dyn HubSession>,
    mode: ProxyMode,
    cassette: CassetteName,
    state: Mutex<ProxyState>,
}

impl ProxySession {
    /// Proxy that replays `interactions` and never calls `target`.
    pub fn replaying(
        target: Box<dyn HubSession>,
        cassette: CassetteName,
        interactions: Vec<Interaction>,
        policy: MatchPolicy,
    ) -> Self {
        let replayer = CassetteReplayer::new(cassette.as_str(), interactions, policy);
        Self {
            target,
            mode: ProxyMode::Replay,
            cassette,
            state: Mutex::new(ProxyState { replayer, recorder: None }),
        }
    }

    /// Proxy that records into `cassette`.
    ///
    /// `prelude` holds interactions loaded from earlier cassettes of a stack;
    /// they are replayed first and never rewritten. Once they are used up,
    /// calls go to `target` and are recorded.
    pub fn recording(
        target: Box<dyn HubSession>,
        cassette: CassetteName,
        prelude: Vec<Interaction>,
        policy: MatchPolicy,
    ) -> Self {
        let replayer = CassetteReplayer::new(cassette.as_str(), prelude, policy);
        let recorder = CassetteRecorder::new(cassette.clone());
        Self {
            target,
            mode: ProxyMode::Record,
            cassette,
            state: Mutex::new(ProxyState { replayer, recorder: Some(recorder) }),
        }
    }

    /// The proxy's mode.
    #[must_use]
    pub fn mode(&self) -> ProxyMode {
        self.mode
    }

    /// Cassette this proxy replays or records.
    #[must_use]
    pub fn cassette(&self) -> &CassetteName {
        &self.cassette
    }

    /// Interactions recorded so far (always empty in replay mode).
    #[must_use]
    pub fn pending(&self) -> Vec<Interaction> {
        let state = self.lock();
        state.recorder.as_ref().map(|r| r.pending().to_vec()).unwrap_or_default()
    }

    /// Loaded interactions not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lock().replayer.remaining()
    }

    /// Persists recorded interactions. A replaying proxy has nothing to write.
    /// Repeated calls write at most once.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarnessError::Storage`] if the cassette cannot be written.
    pub fn flush(&self, store: &CassetteStore) -> HarnessResult<()> {
        let mut state = self.lock();
        match state.recorder.as_mut() {
            Some(recorder) => recorder.flush(store),
            None => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProxyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HubSession for ProxySession {
    fn call(&self, method: &str, args: &CallArgs) -> HarnessResult<Value> {
        {
            let mut state = self.lock();
            let prelude_left = state.replayer.remaining() > 0;
            if self.mode == ProxyMode::Replay || prelude_left {
                return state.replayer.replay(method, args);
            }
        }

        // The lock is not held across the live call.
        debug!("{}: forwarding `{method}` to live session", self.cassette);
        let result = self.target.call(method, args);
        if let Some(recorder) = self.lock().recorder.as_mut() {
            recorder.record(method, args, &result);
        }
        result
    }
}

impl fmt::Debug for ProxySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySession")
            .field("mode", &self.mode)
            .field("cassette", &self.cassette)
            .finish_non_exhaustive()
    }
}
