//! Suite-level harness settings.
//!
//! Settings come from the environment (optionally seeded from a `.env` file)
//! or from a YAML file, and can be adjusted per suite with the `with_*`
//! methods before the harness is built.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::adapters::live::XmlRpcConnector;
use crate::cassette::store::CassetteStore;
use crate::error::{HarnessError, HarnessResult};
use crate::harness::CassetteHarness;
use crate::ports::config::ConfigAccess;
use crate::session::{
    is_truthy, AuthGate, Endpoints, SessionFactory, AUTH_GATE_VAR, DEFAULT_HUB_URL,
};

/// Cassette library directory variable.
pub const CASSETTE_DIR_VAR: &str = "KOJI_CASSETTE_DIR";
/// Primary hub URL variable.
pub const PRIMARY_URL_VAR: &str = "KOJI_URL";
/// Secondary hub URL variable.
pub const SECONDARY_URL_VAR: &str = "KOJI_SECONDARY_URL";
/// Client certificate (PEM) variable.
pub const CLIENT_CERT_VAR: &str = "KOJI_CLIENT_CERT";

/// Default cassette library, relative to the crate under test.
pub const DEFAULT_CASSETTE_DIR: &str = "tests/data";

/// Everything a suite needs to build a [`CassetteHarness`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Root of the cassette library.
    pub cassette_dir: PathBuf,
    /// Primary hub URL.
    pub primary_url: String,
    /// Secondary hub URL; the primary URL when unset.
    pub secondary_url: Option<String>,
    /// PEM file with the client certificate and key for authenticated sessions.
    pub client_cert: Option<PathBuf>,
    /// Whether authenticated live sessions are allowed.
    pub allow_logged_in: bool,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            cassette_dir: PathBuf::from(DEFAULT_CASSETTE_DIR),
            primary_url: DEFAULT_HUB_URL.to_owned(),
            secondary_url: None,
            client_cert: None,
            allow_logged_in: false,
        }
    }
}

impl HarnessSettings {
    /// Reads settings from the environment, after loading `.env` if present.
    /// Unset or empty variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("loaded environment from {}", path.display());
        }

        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let defaults = Self::default();
        Self {
            cassette_dir: var(CASSETTE_DIR_VAR).map_or(defaults.cassette_dir, PathBuf::from),
            primary_url: var(PRIMARY_URL_VAR).unwrap_or(defaults.primary_url),
            secondary_url: var(SECONDARY_URL_VAR),
            client_cert: var(CLIENT_CERT_VAR).map(PathBuf::from),
            allow_logged_in: var(AUTH_GATE_VAR).is_some_and(|v| is_truthy(&v)),
        }
    }

    /// Loads settings from a YAML file. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Storage`] if the file cannot be read or parsed.
    pub fn from_yaml_file(path: &Path) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::storage(path, e))?;
        serde_yaml::from_str(&text).map_err(|e| HarnessError::storage(path, e))
    }

    /// Overrides the cassette library root.
    #[must_use]
    pub fn with_cassette_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cassette_dir = dir.into();
        self
    }

    /// Overrides the primary hub URL.
    #[must_use]
    pub fn with_primary_url(mut self, url: impl Into<String>) -> Self {
        self.primary_url = url.into();
        self
    }

    /// Overrides the secondary hub URL.
    #[must_use]
    pub fn with_secondary_url(mut self, url: impl Into<String>) -> Self {
        self.secondary_url = Some(url.into());
        self
    }

    /// Sets the client certificate.
    #[must_use]
    pub fn with_client_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(path.into());
        self
    }

    /// Opens or closes the auth gate.
    #[must_use]
    pub fn with_allow_logged_in(mut self, allow: bool) -> Self {
        self.allow_logged_in = allow;
        self
    }

    /// The cassette library.
    #[must_use]
    pub fn store(&self) -> CassetteStore {
        CassetteStore::new(&self.cassette_dir)
    }

    /// Hub endpoints.
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        let endpoints = Endpoints::default().with_primary(&self.primary_url);
        match &self.secondary_url {
            Some(url) => endpoints.with_secondary(url),
            None => endpoints,
        }
    }

    /// The auth gate.
    #[must_use]
    pub fn gate(&self) -> AuthGate {
        if self.allow_logged_in {
            AuthGate::open()
        } else {
            AuthGate::closed()
        }
    }

    /// Live XML-RPC connector using the configured certificate.
    #[must_use]
    pub fn connector(&self) -> XmlRpcConnector {
        match &self.client_cert {
            Some(cert) => XmlRpcConnector::default().with_client_cert(cert),
            None => XmlRpcConnector::default(),
        }
    }

    /// Builds a harness over the configured cassette library and live hub.
    /// Each scope records when its cassette is missing and replays it
    /// otherwise. `config` is the service configuration whose server keys
    /// are overridden per scope.
    #[must_use]
    pub fn harness(&self, config: Arc<dyn ConfigAccess>) -> CassetteHarness {
        let factory = SessionFactory::new(Arc::new(self.connector()), config)
            .with_endpoints(self.endpoints())
            .with_gate(self.gate());
        CassetteHarness::new(self.store(), factory)
    }
}
