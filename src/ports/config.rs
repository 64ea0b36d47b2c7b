//! Configuration port: scoped overrides of service configuration keys.
//!
//! The harness does not own configuration storage. It is handed something
//! implementing [`ConfigAccess`] and asks it to set a key for the duration of a
//! scope; [`ScopedOverride`] puts the previous value back when it is dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

/// Config key holding the primary hub URL.
pub const PRIMARY_SERVER_KEY: &str = "koji_config.server";

/// Config key holding the secondary hub URL.
pub const SECONDARY_SERVER_KEY: &str = "secondary_koji_config.server";

/// Read/write access to dotted configuration keys.
pub trait ConfigAccess: Send + Sync {
    /// Current value of `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Sets (or with `None`, removes) `key`, returning the previous value.
    fn set(&self, key: &str, value: Option<String>) -> Option<String>;
}

/// Restores a configuration key to its previous value when dropped.
#[must_use = "the override is undone as soon as the guard is dropped"]
pub struct ScopedOverride {
    config: Arc<dyn ConfigAccess>,
    key: String,
    previous: Option<String>,
}

impl ScopedOverride {
    /// Sets `key` to `value` until the returned guard is dropped.
    pub fn new(
        config: Arc<dyn ConfigAccess>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let previous = config.set(&key, Some(value.into()));
        debug!("overriding config key {key}");
        Self { config, key, previous }
    }

    /// Key being overridden.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ScopedOverride {
    fn drop(&mut self) {
        self.config.set(&self.key, self.previous.take());
        debug!("restored config key {}", self.key);
    }
}

impl std::fmt::Debug for ScopedOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedOverride").field("key", &self.key).finish_non_exhaustive()
    }
}

/// In-memory [`ConfigAccess`].
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryConfig {
    /// Creates a config pre-populated with `values`.
    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values = values.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { values: Mutex::new(values) }
    }
}

impl ConfigAccess for MemoryConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: Option<String>) -> Option<String> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(value) => values.insert(key.to_owned(), value),
            None => values.remove(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_restores_previous_value() {
        let config: Arc<dyn ConfigAccess> =
            Arc::new(MemoryConfig::with_values([(PRIMARY_SERVER_KEY, "https://prod/kojihub")]));
        {
            let _guard =
                ScopedOverride::new(Arc::clone(&config), PRIMARY_SERVER_KEY, "https://stg");
            assert_eq!(config.get(PRIMARY_SERVER_KEY).as_deref(), Some("https://stg"));
        }
        assert_eq!(config.get(PRIMARY_SERVER_KEY).as_deref(), Some("https://prod/kojihub"));
    }

    #[test]
    fn override_of_absent_key_removes_it_again() {
        let config: Arc<dyn ConfigAccess> = Arc::new(MemoryConfig::default());
        let guard = ScopedOverride::new(Arc::clone(&config), SECONDARY_SERVER_KEY, "https://s");
        assert_eq!(guard.key(), SECONDARY_SERVER_KEY);
        drop(guard);
        assert_eq!(config.get(SECONDARY_SERVER_KEY), None);
    }

    #[test]
    fn override_restores_even_when_scope_panics() {
        let config: Arc<dyn ConfigAccess> = Arc::new(MemoryConfig::default());
        let inner = Arc::clone(&config);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = ScopedOverride::new(inner, PRIMARY_SERVER_KEY, "https://tmp");
            panic!("test body failed");
        }));
        assert!(result.is_err());
        assert_eq!(config.get(PRIMARY_SERVER_KEY), None);
    }
}
