//! Cassette data structures for recording and replaying hub calls.
//!
//! A cassette file is a YAML document:
//!
//! ```yaml
//! version: 1
//! interactions:
//! - method: getTaskInfo
//!   args:
//!   - 123
//!   outcome:
//!     status: success
//!     value: complete
//! - method: getTaskInfo
//!   args:
//!   - 124
//!   outcome:
//!     status: failure
//!     kind: NotFound
//!     message: no such task
//! ```
//!
//! Field order is fixed by the struct declarations and JSON objects are
//! stored with sorted keys, so re-saving unchanged content is byte-identical.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Fault, HarnessError};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Positional and keyword arguments of one hub call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    /// Positional arguments, in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    /// No arguments.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Positional arguments only.
    #[must_use]
    pub fn positional(args: impl IntoIterator<Item = Value>) -> Self {
        Self { args: args.into_iter().collect(), kwargs: BTreeMap::new() }
    }

    /// Adds a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.args.iter().map(Value::to_string).collect();
        parts.extend(self.kwargs.iter().map(|(k, v)| format!("{k}={v}")));
        f.write_str(&parts.join(", "))
    }
}

/// What a recorded call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The call returned a value.
    Success {
        /// Returned value.
        value: Value,
    },
    /// The call failed.
    Failure {
        /// Failure kind.
        kind: String,
        /// Failure message.
        message: String,
    },
}

impl Outcome {
    /// Captures a live call result. Harness errors are not recordable and
    /// yield `None`.
    #[must_use]
    pub fn capture(result: &Result<Value, HarnessError>) -> Option<Self> {
        match result {
            Ok(value) => Some(Self::Success { value: value.clone() }),
            Err(HarnessError::Fault(fault)) => {
                Some(Self::Failure { kind: fault.kind.clone(), message: fault.message.clone() })
            }
            Err(_) => None,
        }
    }

    /// Turns the recorded outcome back into the call result.
    ///
    /// # Errors
    ///
    /// Returns the reproduced [`Fault`] for a recorded failure.
    pub fn reproduce(&self) -> Result<Value, HarnessError> {
        match self {
            Self::Success { value } => Ok(value.clone()),
            Self::Failure { kind, message } => Err(Fault::new(kind, message).into()),
        }
    }
}

/// One recorded hub call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Hub method name.
    pub method: String,
    /// Call arguments.
    #[serde(flatten)]
    pub call: CallArgs,
    /// What the call produced.
    pub outcome: Outcome,
}

/// The document stored in one cassette file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CassetteDocument {
    /// Format version.
    pub version: u32,
    /// Interactions, in call order.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl CassetteDocument {
    /// Wraps interactions in a current-version document.
    #[must_use]
    pub fn new(interactions: Vec<Interaction>) -> Self {
        Self { version: FORMAT_VERSION, interactions }
    }
}
