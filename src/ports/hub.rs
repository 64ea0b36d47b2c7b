//! Hub session port: the boundary between code under test and the build hub.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cassette::format::CallArgs;
use crate::error::{HarnessError, HarnessResult};
use crate::session::SessionRole;

/// A session with the build-automation hub.
///
/// The operation surface is open-ended: every hub method goes through
/// [`HubSession::call`] with its name and arguments. Live clients, proxies and
/// stand-ins all implement this one method, and the typed helpers in
/// [`KojiCalls`] come for free.
pub trait HubSession: Send + Sync {
    /// Invokes `method` on the hub.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Fault`] when the hub (or the transport) fails,
    /// and other [`HarnessError`] variants for harness-level problems.
    fn call(&self, method: &str, args: &CallArgs) -> HarnessResult<Value>;
}

impl<S: HubSession + ?Sized> HubSession for Box<S> {
    fn call(&self, method: &str, args: &CallArgs) -> HarnessResult<Value> {
        (**self).call(method, args)
    }
}

/// The accessor through which code under test obtains hub sessions.
pub trait SessionProvider {
    /// Session for `role`.
    fn hub(&self, role: SessionRole) -> &dyn HubSession;
}

/// Task states reported by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum TaskState {
    /// Waiting for a builder.
    Free,
    /// Running.
    Open,
    /// Finished successfully.
    Closed,
    /// Cancelled.
    Canceled,
    /// Assigned to a builder but not started.
    Assigned,
    /// Finished with an error.
    Failed,
}

impl TryFrom<i64> for TaskState {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Free,
            1 => Self::Open,
            2 => Self::Closed,
            3 => Self::Canceled,
            4 => Self::Assigned,
            5 => Self::Failed,
            other => return Err(format!("unknown task state {other}")),
        })
    }
}

impl From<TaskState> for i64 {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Free => 0,
            TaskState::Open => 1,
            TaskState::Closed => 2,
            TaskState::Canceled => 3,
            TaskState::Assigned => 4,
            TaskState::Failed => 5,
        }
    }
}

impl TaskState {
    /// True once the task can no longer change state.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Closed | Self::Canceled | Self::Failed)
    }
}

/// Subset of `getTaskInfo` output the scheduler relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task id.
    pub id: i64,
    /// Current state.
    pub state: TaskState,
    /// Task method, e.g. `build` or `buildArch`.
    pub method: String,
    /// Architecture the task runs on.
    #[serde(default)]
    pub arch: String,
    /// Parent task, if any.
    #[serde(default)]
    pub parent: Option<i64>,
}

/// Typed wrappers over the hub methods the scheduler uses.
///
/// Implemented for every [`HubSession`], so proxies and live clients expose
/// the same API.
pub trait KojiCalls: HubSession {
    /// Calls `method` and deserializes the result.
    ///
    /// # Errors
    ///
    /// Propagates call errors; returns [`HarnessError::Decode`] if the result
    /// does not have the expected shape.
    fn call_as<T: DeserializeOwned>(&self, method: &str, args: &CallArgs) -> HarnessResult<T> {
        let value = self.call(method, args)?;
        serde_json::from_value(value).map_err(|e| HarnessError::Decode {
            method: method.to_owned(),
            message: e.to_string(),
        })
    }

    /// `getAPIVersion()`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_api_version(&self) -> HarnessResult<i64> {
        self.call_as("getAPIVersion", &CallArgs::none())
    }

    /// `getLastEvent()`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_last_event(&self) -> HarnessResult<Value> {
        self.call("getLastEvent", &CallArgs::none())
    }

    /// `getBuild(build)`; `None` when the hub knows no such build.
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_build(&self, build: impl Into<Value>) -> HarnessResult<Option<Value>> {
        let value = self.call("getBuild", &CallArgs::positional([build.into()]))?;
        Ok((!value.is_null()).then_some(value))
    }

    /// `getTaskInfo(task_id)`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_task_info(&self, task_id: i64) -> HarnessResult<TaskInfo> {
        self.call_as("getTaskInfo", &CallArgs::positional([json!(task_id)]))
    }

    /// `getTaskChildren(task_id)`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_task_children(&self, task_id: i64) -> HarnessResult<Vec<TaskInfo>> {
        self.call_as("getTaskChildren", &CallArgs::positional([json!(task_id)]))
    }

    /// `listTagged(tag, latest=…, inherit=…)`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn list_tagged(&self, tag: &str, latest: bool, inherit: bool) -> HarnessResult<Vec<Value>> {
        let args = CallArgs::positional([json!(tag)])
            .kwarg("latest", latest)
            .kwarg("inherit", inherit);
        self.call_as("listTagged", &args)
    }

    /// `getRepo(tag)`; `None` when the tag has no current repo.
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_repo(&self, tag: &str) -> HarnessResult<Option<Value>> {
        let value = self.call("getRepo", &CallArgs::positional([json!(tag)]))?;
        Ok((!value.is_null()).then_some(value))
    }

    /// `getBuildConfig(tag)`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_build_config(&self, tag: &str) -> HarnessResult<Value> {
        self.call("getBuildConfig", &CallArgs::positional([json!(tag)]))
    }

    /// `getFullInheritance(tag)`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn get_full_inheritance(&self, tag: &str) -> HarnessResult<Vec<Value>> {
        self.call_as("getFullInheritance", &CallArgs::positional([json!(tag)]))
    }

    /// `build(src, target, opts, priority=…)`; returns the new task id.
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn build(
        &self,
        src: &str,
        target: &str,
        opts: Value,
        priority: Option<i64>,
    ) -> HarnessResult<i64> {
        let mut args = CallArgs::positional([json!(src), json!(target), opts]);
        if let Some(priority) = priority {
            args = args.kwarg("priority", priority);
        }
        self.call_as("build", &args)
    }

    /// `cancelTask(task_id)`
    ///
    /// # Errors
    ///
    /// See [`KojiCalls::call_as`].
    fn cancel_task(&self, task_id: i64) -> HarnessResult<()> {
        self.call("cancelTask", &CallArgs::positional([json!(task_id)])).map(drop)
    }
}

impl<S: HubSession + ?Sized> KojiCalls for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns one canned value and remembers the call.
    struct Canned {
        value: Value,
        seen: Mutex<Vec<(String, CallArgs)>>,
    }

    impl HubSession for Canned {
        fn call(&self, method: &str, args: &CallArgs) -> HarnessResult<Value> {
            self.seen.lock().unwrap().push((method.to_owned(), args.clone()));
            Ok(self.value.clone())
        }
    }

    fn canned(value: Value) -> Canned {
        Canned { value, seen: Mutex::new(Vec::new()) }
    }

    #[test]
    fn task_info_decodes_numeric_state() {
        let hub =
            canned(json!({"id": 7, "state": 2, "method": "build", "arch": "noarch", "owner": 3}));
        let info = hub.get_task_info(7).unwrap();
        assert_eq!(info.state, TaskState::Closed);
        assert!(info.state.is_finished());
        assert_eq!(info.parent, None);
    }

    #[test]
    fn list_tagged_sends_keyword_arguments() {
        let hub = canned(json!([]));
        hub.list_tagged("f25", true, false).unwrap();
        let seen = hub.seen.lock().unwrap();
        let (method, args) = &seen[0];
        assert_eq!(method, "listTagged");
        assert_eq!(args.args, vec![json!("f25")]);
        assert_eq!(args.kwargs["latest"], json!(true));
        assert_eq!(args.kwargs["inherit"], json!(false));
    }

    #[test]
    fn null_build_is_none() {
        assert_eq!(canned(Value::Null).get_build("rnv-1-1").unwrap(), None);
    }

    #[test]
    fn shape_mismatch_is_a_decode_error() {
        let err = canned(json!("not a number")).get_api_version().unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Decode { ref method, .. } if method == "getAPIVersion"
        ));
    }

    #[test]
    fn unknown_task_state_is_rejected() {
        assert!(TaskState::try_from(42).is_err());
    }
}
