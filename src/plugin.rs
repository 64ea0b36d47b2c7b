//! Explicit plugin and event registry.
//!
//! The composition root owns one [`PluginRegistry`]. Plugins are chosen from a
//! catalog by id, register their listeners against the registry, and events
//! are dispatched to listeners in registration order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, info, warn};
use serde_json::Value;

use crate::error::HarnessResult;

/// Event listener. Receives the event payload.
pub type Listener = Box<dyn Fn(&Value) -> HarnessResult<()> + Send + Sync>;

/// A plugin that can be enabled by id.
pub trait Plugin: Send + Sync {
    /// Identifier used to enable the plugin. Ids starting with `_` are private
    /// and never loaded.
    fn id(&self) -> &str;

    /// Registers the plugin's listeners.
    fn register(&self, registry: &mut PluginRegistry);
}

/// Listeners keyed by event name.
#[derive(Default)]
pub struct PluginRegistry {
    listeners: BTreeMap<String, Vec<Listener>>,
    loaded: BTreeSet<String>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads plugins from `catalog`: all of them, or only those named in
    /// `only`. A plugin is registered at most once however often this is
    /// called.
    pub fn load(&mut self, catalog: &[&dyn Plugin], only: Option<&[&str]>) {
        if let Some(only) = only {
            for id in only {
                if !catalog.iter().any(|p| p.id() == *id) {
                    warn!("plugin {id} is not available");
                }
            }
        }

        for plugin in catalog {
            let id = plugin.id();
            let wanted = only.map_or(true, |only| only.contains(&id));
            if !wanted || id.starts_with('_') || self.loaded.contains(id) {
                continue;
            }
            info!("Loading {id} plugin");
            plugin.register(self);
            self.loaded.insert(id.to_owned());
        }
    }

    /// True if the plugin with `id` has been loaded.
    #[must_use]
    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains(id)
    }

    /// Adds a listener for `event`.
    pub fn listen(
        &mut self,
        event: impl Into<String>,
        listener: impl Fn(&Value) -> HarnessResult<()> + Send + Sync + 'static,
    ) {
        self.listeners.entry(event.into()).or_default().push(Box::new(listener));
    }

    /// Number of listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Calls every listener of `event` in registration order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first listener error.
    pub fn dispatch(&self, event: &str, payload: &Value) -> HarnessResult<()> {
        let Some(listeners) = self.listeners.get(event) else {
            return Ok(());
        };
        debug!("dispatching {event} to {} listeners", listeners.len());
        listeners.iter().try_for_each(|listener| listener(payload))
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> =
            self.listeners.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("PluginRegistry")
            .field("listeners", &counts)
            .field("loaded", &self.loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Fault, HarnessError};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct Collector {
        id: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Plugin for Collector {
        fn id(&self) -> &str {
            self.id
        }

        fn register(&self, registry: &mut PluginRegistry) {
            let seen = Arc::clone(&self.seen);
            let id = self.id;
            registry.listen("package_state_change", move |payload| {
                seen.lock().unwrap().push(format!("{id}:{}", payload["package"]));
                Ok(())
            });
        }
    }

    fn collector(id: &'static str, seen: &Arc<Mutex<Vec<String>>>) -> Collector {
        Collector { id, seen: Arc::clone(seen) }
    }

    #[test]
    fn only_selected_plugins_are_loaded_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fedmsg = collector("fedmsg", &seen);
        let copr = collector("copr", &seen);
        let private = collector("_base", &seen);
        let catalog: [&dyn Plugin; 3] = [&fedmsg, &copr, &private];

        let mut registry = PluginRegistry::new();
        registry.load(&catalog, Some(&["fedmsg", "missing"][..]));
        registry.load(&catalog, Some(&["fedmsg"][..]));
        assert!(registry.is_loaded("fedmsg"));
        assert!(!registry.is_loaded("copr"));
        assert_eq!(registry.listener_count("package_state_change"), 1);

        registry.load(&catalog, None);
        assert!(!registry.is_loaded("_base"));
        assert_eq!(registry.listener_count("package_state_change"), 2);

        registry.dispatch("package_state_change", &json!({"package": "rnv"})).unwrap();
        assert_eq!(*seen.lock().unwrap(), ["fedmsg:\"rnv\"", "copr:\"rnv\""]);
    }

    #[test]
    fn dispatch_stops_at_first_error() {
        let mut registry = PluginRegistry::new();
        let calls = Arc::new(Mutex::new(0));
        registry.listen("build", |_| Err(Fault::new("GenericError", "listener failed").into()));
        let counter = Arc::clone(&calls);
        registry.listen("build", move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let err = registry.dispatch("build", &Value::Null).unwrap_err();
        assert!(matches!(err, HarnessError::Fault(_)));
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(registry.dispatch("unknown_event", &Value::Null).is_ok());
    }
}
