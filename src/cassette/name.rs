//! Hierarchical cassette names and their on-disk locations.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// Suffix appended to the final path component of every cassette file.
pub const CASSETTE_SUFFIX: &str = ".vcr.yaml";

/// Suffix appended to cassette names recorded for a separate secondary session.
pub const SECONDARY_SUFFIX: &str = ".secondary";

/// A validated cassette name such as `scheduler/submit_build`.
///
/// Segments are separated by `/` and map one-to-one onto nested directories
/// below the cassette library root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CassetteName(String);

impl CassetteName {
    /// Validates and wraps a cassette name.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidCassetteName`] for empty names, empty
    /// segments, `.`/`..` segments, or backslashes.
    pub fn new(name: impl Into<String>) -> HarnessResult<Self> {
        let name = name.into();
        let invalid = |reason: &str| HarnessError::InvalidCassetteName {
            name: name.clone(),
            reason: reason.to_owned(),
        };

        if name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if name.contains('\\') {
            return Err(invalid("use `/` to separate segments"));
        }
        for segment in name.split('/') {
            if segment.is_empty() {
                return Err(invalid("segments cannot be empty"));
            }
            if segment == "." || segment == ".." {
                return Err(invalid("segments cannot be `.` or `..`"));
            }
        }
        Ok(Self(name))
    }

    /// Derives a name from a test's qualified path, e.g.
    /// `module_path!()` joined with the test function name.
    ///
    /// `scheduler::tests::submit_build` becomes `scheduler/tests/submit_build`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting name is invalid.
    pub fn from_test_path(path: &str) -> HarnessResult<Self> {
        Self::new(path.replace("::", "/"))
    }

    /// Name of the cassette recorded for a separate secondary session.
    #[must_use]
    pub fn secondary(&self) -> Self {
        Self(format!("{}{SECONDARY_SUFFIX}", self.0))
    }

    /// The name as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Location of this cassette below `root`.
    #[must_use]
    pub fn path_in(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        let mut segments = self.0.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}{CASSETTE_SUFFIX}"));
            }
        }
        path
    }
}

impl fmt::Display for CassetteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for CassetteName {
    type Error = HarnessError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for CassetteName {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
