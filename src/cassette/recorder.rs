//! Collects new interactions while a scope records.

use log::debug;
use serde_json::Value;

use super::format::{CallArgs, Interaction, Outcome};
use super::name::CassetteName;
use super::store::CassetteStore;
use crate::error::{HarnessError, HarnessResult};

/// Pending-append list for one cassette.
///
/// Interactions are only ever appended; the list is handed to the store once
/// when the scope ends.
#[derive(Debug)]
pub struct CassetteRecorder {
    name: CassetteName,
    pending: Vec<Interaction>,
    flushed: bool,
}

impl CassetteRecorder {
    /// Creates an empty recorder targeting `name`.
    #[must_use]
    pub fn new(name: CassetteName) -> Self {
        Self { name, pending: Vec::new(), flushed: false }
    }

    /// Cassette this recorder writes.
    #[must_use]
    pub fn name(&self) -> &CassetteName {
        &self.name
    }

    /// Appends the outcome of a live call. Harness errors are not recorded.
    pub fn record(&mut self, method: &str, call: &CallArgs, result: &Result<Value, HarnessError>) {
        let Some(outcome) = Outcome::capture(result) else {
            debug!("{}: not recording `{method}`, result is not a hub outcome", self.name);
            return;
        };
        debug!("{}: recorded #{} `{method}({call})`", self.name, self.pending.len());
        self.pending.push(Interaction { method: method.to_owned(), call: call.clone(), outcome });
    }

    /// Interactions recorded so far.
    #[must_use]
    pub fn pending(&self) -> &[Interaction] {
        &self.pending
    }

    /// Writes the pending interactions. Only the first call writes; later
    /// calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Storage`] if the cassette cannot be written.
    pub fn flush(&mut self, store: &CassetteStore) -> HarnessResult<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        store.save(&self.name, &self.pending)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn records_successes_and_faults_in_order() {
        let mut recorder = CassetteRecorder::new(CassetteName::new("rec").unwrap());
        let call = CallArgs::positional([json!(1)]);
        recorder.record("getTaskInfo", &call, &Ok(json!({"state": 2})));
        recorder.record("getTaskInfo", &call, &Err(Fault::new("GenericError", "boom").into()));
        recorder.record("getTaskInfo", &call, &Err(HarnessError::Credentials("x".into())));

        let pending = recorder.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].outcome, Outcome::Success { value: json!({"state": 2}) });
        assert!(matches!(
            pending[1].outcome,
            Outcome::Failure { ref kind, .. } if kind == "GenericError"
        ));
    }

    #[test]
    fn flush_writes_once() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path());
        let name = CassetteName::new("once").unwrap();
        let mut recorder = CassetteRecorder::new(name.clone());
        recorder.record("getAPIVersion", &CallArgs::none(), &Ok(json!(1)));

        recorder.flush(&store).unwrap();
        std::fs::remove_file(store.path_for(&name)).unwrap();
        recorder.flush(&store).unwrap();

        assert!(!store.exists(&name), "second flush must not write again");
    }
}
