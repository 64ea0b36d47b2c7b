//! Error taxonomy for the cassette harness.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionRole;

/// A failure raised by the build hub (or the transport in front of it).
///
/// This is the only failure that is written to a cassette. On replay the same
/// `kind` and `message` are handed back, so error-handling paths in the code
/// under test run exactly as they did against the live hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Failure kind, e.g. `GenericError` or `TransportError`.
    pub kind: String,
    /// Human-readable failure message.
    pub message: String,
}

impl Fault {
    /// Creates a fault of the given kind.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Everything that can go wrong inside a cassette scope.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A live or reproduced hub failure.
    #[error("hub fault: {0}")]
    Fault(Fault),

    /// The next recorded interaction is for a different operation.
    #[error(
        "cassette {cassette} out of sync at interaction #{position}: \
         recorded `{expected}`, invoked `{actual}`"
    )]
    CassetteMismatch {
        /// Cassette being replayed.
        cassette: String,
        /// Zero-based position of the offending interaction.
        position: usize,
        /// Recorded operation (with arguments when they were compared).
        expected: String,
        /// Invoked operation (with arguments when they were compared).
        actual: String,
    },

    /// More calls were made than the cassette recorded.
    #[error(
        "cassette {cassette} exhausted: all {recorded} recorded interactions consumed, \
         `{method}` has no recording"
    )]
    CassetteExhausted {
        /// Cassette being replayed.
        cassette: String,
        /// Number of interactions the cassette held.
        recorded: usize,
        /// Operation that found nothing left to replay.
        method: String,
    },

    /// A replay-only context found no cassette at all.
    #[error("cassette {cassette} does not exist and recording is not allowed here")]
    CassetteMissing {
        /// Name of the missing cassette.
        cassette: String,
    },

    /// The backing store could not be read or written.
    #[error("cassette storage failure at {}: {message}", path.display())]
    Storage {
        /// File that was being read or written.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// Authenticated recording was requested without the opt-in gate.
    #[error(
        "authenticated {role} session requested but TEST_ALLOW_LOGGED_IN is not set; \
         refusing to use real credentials"
    )]
    AuthDisabled {
        /// Role the session was requested for.
        role: SessionRole,
    },

    /// A logical session the test did not request was used.
    #[error("unexpected access to the {role} hub session: no cassette was set up for it")]
    UnexpectedSession {
        /// Role that was accessed.
        role: SessionRole,
    },

    /// A cassette name cannot be mapped onto a storage path.
    #[error("invalid cassette name `{name}`: {reason}")]
    InvalidCassetteName {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A hub result did not have the shape the typed call expected.
    #[error("unexpected result from `{method}`: {message}")]
    Decode {
        /// Hub method that was called.
        method: String,
        /// Decoder message.
        message: String,
    },

    /// Credentials for an authenticated session could not be loaded.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// The HTTP client for a live session could not be built.
    #[error("cannot set up hub session for {endpoint}: {message}")]
    Connect {
        /// Hub URL.
        endpoint: String,
        /// Underlying failure.
        message: String,
    },

    /// The test body failed and the cassette could not be saved afterwards.
    #[error("{body} (and saving the cassette failed too: {flush})")]
    FlushAfterFailure {
        /// Error raised by the test body.
        body: Box<HarnessError>,
        /// Error raised while saving.
        flush: Box<HarnessError>,
    },
}

impl HarnessError {
    /// Returns the hub fault if this error is one.
    #[must_use]
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// True when this error is a (live or reproduced) hub fault.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.as_fault().is_some()
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Storage { path: path.into(), message: message.to_string() }
    }
}

impl From<Fault> for HarnessError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

/// Result alias used throughout the crate.
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_includes_kind_and_message() {
        let fault = Fault::new("NotFound", "no such task: 124");
        assert_eq!(fault.to_string(), "NotFound: no such task: 124");
        let err = HarnessError::from(fault.clone());
        assert_eq!(err.as_fault(), Some(&fault));
        assert!(err.to_string().contains("NotFound"));
    }

    #[test]
    fn harness_errors_are_not_faults() {
        let err = HarnessError::CassetteExhausted {
            cassette: "build/status".into(),
            recorded: 2,
            method: "getTaskInfo".into(),
        };
        assert!(!err.is_fault());
        assert!(err.to_string().contains("exhausted"));
    }
}
