//! Live hub session speaking XML-RPC over HTTPS.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::Identity;
use serde_json::Value;

use super::xmlrpc::{decode_response, encode_call};
use crate::cassette::format::CallArgs;
use crate::error::{Fault, HarnessError, HarnessResult};
use crate::ports::hub::HubSession;
use crate::session::{AuthMode, Connector, SessionRole};

/// Fault kind for connection failures and timeouts.
pub const TRANSPORT_ERROR: &str = "TransportError";

/// Fault kind for non-success HTTP statuses.
pub const HTTP_ERROR: &str = "HttpError";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Hub login state for authenticated sessions.
#[derive(Debug, Default)]
struct Login {
    /// `(session-id, session-key)` once logged in.
    session: Option<(String, String)>,
    callnum: u64,
}

/// A live hub session.
///
/// Construction performs no I/O. Authenticated sessions log in with
/// `sslLogin` on their first call.
#[derive(Debug)]
pub struct HubClient {
    http: Client,
    endpoint: String,
    auth: AuthMode,
    login: Mutex<Login>,
}

impl HubClient {
    /// Creates a session for `endpoint` using an already configured HTTP client.
    pub fn new(http: Client, endpoint: impl Into<String>, auth: AuthMode) -> Self {
        Self { http, endpoint: endpoint.into(), auth, login: Mutex::new(Login::default()) }
    }

    /// Hub URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post(&self, url: &str, method: &str, args: &CallArgs) -> Result<Value, Fault> {
        let body = encode_call(method, args);
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .map_err(|e| {
                let what = if e.is_timeout() { "timed out" } else { "failed" };
                Fault::new(TRANSPORT_ERROR, format!("{method} {what}: {e}"))
            })?;

        let status = response.status();
        let text = response.text().map_err(|e| {
            Fault::new(TRANSPORT_ERROR, format!("{method}: reading response failed: {e}"))
        })?;
        if !status.is_success() {
            return Err(Fault::new(HTTP_ERROR, format!("{method}: HTTP {}", status.as_u16())));
        }
        decode_response(&text)
    }

    /// Logs in if needed and returns the URL for the next authenticated call.
    fn session_url(&self, login: &mut Login) -> Result<String, Fault> {
        if login.session.is_none() {
            let login_url = format!("{}/ssllogin", self.endpoint.trim_end_matches('/'));
            let reply = self.post(&login_url, "sslLogin", &CallArgs::none())?;
            let id = match reply.get("session-id") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) => s.clone(),
                _ => return Err(Fault::new("AuthError", "sslLogin returned no session-id")),
            };
            let key = reply
                .get("session-key")
                .and_then(Value::as_str)
                .ok_or_else(|| Fault::new("AuthError", "sslLogin returned no session-key"))?
                .to_owned();
            info!("logged in to {} as session {id}", self.endpoint);
            login.session = Some((id, key));
        }

        let Some((id, key)) = login.session.as_ref() else {
            return Err(Fault::new("AuthError", "not logged in"));
        };
        login.callnum += 1;
        Ok(format!(
            "{}?session-id={id}&session-key={key}&callnum={}",
            self.endpoint, login.callnum
        ))
    }
}

impl HubSession for HubClient {
    fn call(&self, method: &str, args: &CallArgs) -> HarnessResult<Value> {
        debug!("{}: {method}({args})", self.endpoint);
        let result = match self.auth {
            AuthMode::Anonymous => self.post(&self.endpoint, method, args),
            AuthMode::Authenticated => {
                let mut login = self.login.lock().unwrap_or_else(PoisonError::into_inner);
                self.session_url(&mut login).and_then(|url| self.post(&url, method, args))
            }
        };
        result.map_err(HarnessError::from)
    }
}

/// Opens [`HubClient`] sessions.
#[derive(Debug, Clone)]
pub struct XmlRpcConnector {
    timeout: Duration,
    client_cert: Option<PathBuf>,
}

impl Default for XmlRpcConnector {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, client_cert: None }
    }
}

impl XmlRpcConnector {
    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// PEM file holding the client certificate and key used for
    /// authenticated sessions.
    #[must_use]
    pub fn with_client_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(path.into());
        self
    }

    fn identity(&self, role: SessionRole) -> HarnessResult<Identity> {
        let path = self.client_cert.as_ref().ok_or_else(|| {
            let message = format!("{role}: authenticated session needs a client certificate");
            HarnessError::Credentials(message)
        })?;
        let pem = std::fs::read(path)
            .map_err(|e| HarnessError::Credentials(format!("reading {}: {e}", path.display())))?;
        Identity::from_pem(&pem)
            .map_err(|e| HarnessError::Credentials(format!("parsing {}: {e}", path.display())))
    }
}

impl Connector for XmlRpcConnector {
    fn connect(
        &self,
        role: SessionRole,
        endpoint: &str,
        auth: AuthMode,
    ) -> HarnessResult<Box<dyn HubSession>> {
        let mut builder = Client::builder().timeout(self.timeout);
        if auth == AuthMode::Authenticated {
            builder = builder.identity(self.identity(role)?);
        }
        let http = builder.build().map_err(|e| HarnessError::Connect {
            endpoint: endpoint.to_owned(),
            message: e.to_string(),
        })?;
        Ok(Box::new(HubClient::new(http, endpoint, auth)))
    }
}
