//! File-backed cassette library.
//!
//! Layout below the library root mirrors cassette names:
//!
//! ```text
//! <root>/
//!   └── build/
//!       ├── status.vcr.yaml
//!       └── status.secondary.vcr.yaml
//! ```

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::format::{CassetteDocument, Interaction, FORMAT_VERSION};
use super::name::CassetteName;
use crate::error::{HarnessError, HarnessResult};

/// Durable storage of named interaction sequences, one file per name.
#[derive(Debug, Clone)]
pub struct CassetteStore {
    root: PathBuf,
}

impl CassetteStore {
    /// Creates a store rooted at the given directory. Nothing is touched on
    /// disk until the first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Library root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `name`.
    #[must_use]
    pub fn path_for(&self, name: &CassetteName) -> PathBuf {
        name.path_in(&self.root)
    }

    /// True if a cassette has been recorded for `name`.
    #[must_use]
    pub fn exists(&self, name: &CassetteName) -> bool {
        self.path_for(name).is_file()
    }

    /// Loads the interactions recorded under `name`.
    ///
    /// Returns `Ok(None)` when no cassette exists: that means "not recorded
    /// yet", not a failure.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Storage`] if the file exists but cannot be read
    /// or parsed, or was written by a newer format version.
    pub fn load(&self, name: &CassetteName) -> HarnessResult<Option<Vec<Interaction>>> {
        let path = self.path_for(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no cassette recorded for {name} at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(HarnessError::storage(&path, format!("read failed: {e}"))),
        };

        let document: CassetteDocument = serde_yaml::from_str(&content)
            .map_err(|e| HarnessError::storage(&path, format!("parse failed: {e}")))?;
        if document.version > FORMAT_VERSION {
            return Err(HarnessError::storage(
                &path,
                format!(
                    "format version {} is newer than supported version {FORMAT_VERSION}",
                    document.version
                ),
            ));
        }

        info!("loaded cassette {name} ({} interactions)", document.interactions.len());
        Ok(Some(document.interactions))
    }

    /// Writes all `interactions` for `name`, creating parent directories.
    ///
    /// The file is replaced atomically: content goes to a temporary file in
    /// the same directory which is then renamed over the target.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Storage`] if serialization or any filesystem
    /// step fails.
    pub fn save(
        &self,
        name: &CassetteName,
        interactions: &[Interaction],
    ) -> HarnessResult<PathBuf> {
        let path = self.path_for(name);
        let yaml = Self::serialize(interactions)
            .map_err(|e| HarnessError::storage(&path, format!("serialize failed: {e}")))?;

        let dir = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(dir)
            .map_err(|e| HarnessError::storage(dir, format!("create directory failed: {e}")))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| HarnessError::storage(dir, format!("create temp file failed: {e}")))?;
        temp.write_all(yaml.as_bytes())
            .map_err(|e| HarnessError::storage(&path, format!("write failed: {e}")))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| HarnessError::storage(&path, format!("sync failed: {e}")))?;
        temp.persist(&path)
            .map_err(|e| HarnessError::storage(&path, format!("rename failed: {}", e.error)))?;

        info!("saved cassette {name} ({} interactions) to {}", interactions.len(), path.display());
        Ok(path)
    }

    /// Deletes the cassette for `name`, forcing a re-recording on next use.
    /// Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Storage`] if the file exists but cannot be removed.
    pub fn remove(&self, name: &CassetteName) -> HarnessResult<bool> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HarnessError::storage(&path, format!("remove failed: {e}"))),
        }
    }

    fn serialize(interactions: &[Interaction]) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&CassetteDocument::new(interactions.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::{CallArgs, Outcome};
    use serde_json::json;
    use tempfile::TempDir;

    fn name(s: &str) -> CassetteName {
        CassetteName::new(s).unwrap()
    }

    fn sample() -> Vec<Interaction> {
        vec![
            Interaction {
                method: "getBuild".into(),
                call: CallArgs::positional([json!("rnv-1.7.11-1.fc25")]),
                outcome: Outcome::Success {
                    value: json!({"nvr": "rnv-1.7.11-1.fc25", "state": 1, "build_id": 7}),
                },
            },
            Interaction {
                method: "getTaskInfo".into(),
                call: CallArgs::positional([json!(124)]).kwarg("request", true),
                outcome: Outcome::Failure {
                    kind: "GenericError".into(),
                    message: "no task".into(),
                },
            },
        ]
    }

    #[test]
    fn missing_cassette_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path());
        assert!(store.load(&name("never/recorded")).unwrap().is_none());
        assert!(!store.exists(&name("never/recorded")));
    }

    #[test]
    fn save_creates_nested_directories_and_loads_back() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path().join("data"));
        let path = store.save(&name("a/b/c"), &sample()).unwrap();

        assert_eq!(path, dir.path().join("data/a/b/c.vcr.yaml"));
        assert!(store.exists(&name("a/b/c")));
        assert_eq!(store.load(&name("a/b/c")).unwrap(), Some(sample()));
    }

    #[test]
    fn repeated_saves_are_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path());
        let path = store.save(&name("stable"), &sample()).unwrap();
        let first = fs::read(&path).unwrap();

        let reloaded = store.load(&name("stable")).unwrap().unwrap();
        store.save(&name("stable"), &reloaded).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path());
        store.save(&name("only"), &sample()).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn corrupt_cassette_is_a_storage_failure() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path());
        fs::write(store.path_for(&name("broken")), "interactions: [unterminated").unwrap();
        let err = store.load(&name("broken")).unwrap_err();
        assert!(matches!(err, HarnessError::Storage { .. }));
    }

    #[test]
    fn newer_format_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path());
        fs::write(store.path_for(&name("future")), "version: 99\ninteractions: []\n").unwrap();
        let err = store.load(&name("future")).unwrap_err();
        assert!(err.to_string().contains("newer"));
    }

    #[test]
    fn remove_forces_rerecording() {
        let dir = TempDir::new().unwrap();
        let store = CassetteStore::new(dir.path());
        store.save(&name("gone"), &sample()).unwrap();
        assert!(store.remove(&name("gone")).unwrap());
        assert!(!store.remove(&name("gone")).unwrap());
        assert!(store.load(&name("gone")).unwrap().is_none());
    }
}
