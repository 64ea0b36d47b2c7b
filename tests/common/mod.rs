//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;

use koji_cassette::{
    AuthGate, AuthMode, CallArgs, CassetteHarness, CassetteStore, Connector, Endpoints, Fault,
    HarnessResult, HubSession, MemoryConfig, SessionFactory, SessionRole,
};

pub const PRIMARY_URL: &str = "https://primary.test/kojihub";
pub const SECONDARY_URL: &str = "https://secondary.test/kojihub";

/// Answers a handful of hub methods and counts every live call.
pub struct ScriptedHub {
    pub endpoint: String,
    pub calls: Arc<AtomicUsize>,
}

impl HubSession for ScriptedHub {
    fn call(&self, method: &str, args: &CallArgs) -> HarnessResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first = args.args.first().cloned().unwrap_or(Value::Null);
        match method {
            "get_status" if first == json!(123) => Ok(json!("complete")),
            "get_status" => Err(Fault::new("NotFound", format!("no such task: {first}")).into()),
            "getAPIVersion" => Ok(json!(1)),
            "getLastEvent" => Ok(json!({"id": 42, "ts": 1_470_910_361.0})),
            "getBuild" if first == json!("rnv-1.7.11-10.fc25") => {
                Ok(json!({"build_id": 802_356, "nvr": "rnv-1.7.11-10.fc25", "state": 1}))
            }
            "getBuild" => Ok(Value::Null),
            "build" => Ok(json!(13_579)),
            "getTaskInfo" => Ok(json!({
                "id": first,
                "state": 2,
                "method": "build",
                "arch": "noarch",
                "parent": null,
            })),
            "whoami" => Ok(json!(self.endpoint.clone())),
            _ => Err(Fault::new("GenericError", format!("Invalid method: {method}")).into()),
        }
    }
}

/// Opens [`ScriptedHub`]s and remembers what it was asked for.
#[derive(Default)]
pub struct ScriptedConnector {
    pub calls: Arc<AtomicUsize>,
    pub opened: Mutex<Vec<(SessionRole, String, AuthMode)>>,
}

impl ScriptedConnector {
    pub fn live_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<(SessionRole, String, AuthMode)> {
        self.opened.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(
        &self,
        role: SessionRole,
        endpoint: &str,
        auth: AuthMode,
    ) -> HarnessResult<Box<dyn HubSession>> {
        self.opened.lock().unwrap().push((role, endpoint.to_owned(), auth));
        Ok(Box::new(ScriptedHub { endpoint: endpoint.to_owned(), calls: Arc::clone(&self.calls) }))
    }
}

/// A harness over a scratch cassette library.
pub struct Fixture {
    pub dir: TempDir,
    pub connector: Arc<ScriptedConnector>,
    pub config: Arc<MemoryConfig>,
    pub harness: CassetteHarness,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_gate(AuthGate::closed())
    }

    pub fn with_gate(gate: AuthGate) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let connector = Arc::new(ScriptedConnector::default());
        let config = Arc::new(MemoryConfig::default());
        let factory = SessionFactory::new(connector.clone(), config.clone())
            .with_endpoints(
                Endpoints::default().with_primary(PRIMARY_URL).with_secondary(SECONDARY_URL),
            )
            .with_gate(gate);
        let harness = CassetteHarness::new(CassetteStore::new(dir.path()), factory);
        Self { dir, connector, config, harness }
    }
}
