//! A scriptable in-memory backend adapter.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use courier_core::{BackendAdapter, BackendError, JsonMap, SessionBlob, SignInOutcome};

/// In-memory [`BackendAdapter`] with scripted behavior.
///
/// By default every binding call succeeds with `{"ok": true}`, any
/// verification code is accepted, no second factor is demanded, and session
/// restore succeeds. Builder methods tighten each of those. Scripted
/// per-binding outcomes are consumed in order; once a binding's queue is
/// empty, calls fall back to the default response.
pub struct MockBackend {
    valid_code: Option<String>,
    second_factor: Option<String>,
    blob: SessionBlob,
    stale_session: bool,
    failing_invalidate: bool,
    call_delay: Option<Duration>,
    scripted: Mutex<HashMap<String, VecDeque<Result<Value, BackendError>>>>,
    calls: Mutex<Vec<(String, JsonMap)>>,
}

impl MockBackend {
    /// A permissive mock: everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            valid_code: None,
            second_factor: None,
            blob: SessionBlob::new(b"mock-session".to_vec()),
            stale_session: false,
            failing_invalidate: false,
            call_delay: None,
            scripted: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Accept only this verification code.
    #[must_use]
    pub fn with_valid_code(mut self, code: &str) -> Self {
        self.valid_code = Some(code.to_string());
        self
    }

    /// Demand this second factor after the code is accepted.
    #[must_use]
    pub fn with_second_factor(mut self, secret: &str) -> Self {
        self.second_factor = Some(secret.to_string());
        self
    }

    /// Reject any restored session blob as stale.
    #[must_use]
    pub fn with_stale_session(mut self) -> Self {
        self.stale_session = true;
        self
    }

    /// Fail backend-side sign-out with a transient error.
    #[must_use]
    pub fn with_failing_invalidate(mut self) -> Self {
        self.failing_invalidate = true;
        self
    }

    /// Sleep this long inside every binding call (paired with a paused
    /// tokio clock in timeout tests).
    #[must_use]
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Queue a successful response for one call of `binding`.
    #[must_use]
    pub fn with_response(self, binding: &str, value: Value) -> Self {
        self.push_scripted(binding, Ok(value));
        self
    }

    /// Queue a failure for one call of `binding`.
    #[must_use]
    pub fn with_error(self, binding: &str, error: BackendError) -> Self {
        self.push_scripted(binding, Err(error));
        self
    }

    /// The bindings called so far, with their arguments, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, JsonMap)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Names of the bindings called so far, in call order.
    #[must_use]
    pub fn call_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|(binding, _)| binding)
            .collect()
    }

    fn push_scripted(&self, binding: &str, outcome: Result<Value, BackendError>) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted
                .entry(binding.to_string())
                .or_default()
                .push_back(outcome);
        }
    }

    fn record(&self, binding: &str, arguments: &JsonMap) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((binding.to_string(), arguments.clone()));
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendAdapter for MockBackend {
    async fn call(&self, binding: &str, arguments: &JsonMap) -> Result<Value, BackendError> {
        self.record(binding, arguments);

        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut scripted| scripted.get_mut(binding).and_then(VecDeque::pop_front));

        match scripted {
            Some(outcome) => outcome,
            None => Ok(serde_json::json!({"ok": true})),
        }
    }

    async fn request_login_code(&self, _phone: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn submit_code(&self, code: &str) -> Result<SignInOutcome, BackendError> {
        if let Some(valid) = &self.valid_code {
            if code != valid {
                return Err(BackendError::Auth("invalid verification code".to_string()));
            }
        }
        if self.second_factor.is_some() {
            Ok(SignInOutcome::SecondFactorRequired)
        } else {
            Ok(SignInOutcome::Complete(self.blob.clone()))
        }
    }

    async fn submit_second_factor(&self, secret: &str) -> Result<SessionBlob, BackendError> {
        match &self.second_factor {
            Some(expected) if secret == expected => Ok(self.blob.clone()),
            Some(_) => Err(BackendError::Auth("invalid second factor".to_string())),
            None => Err(BackendError::Auth("no second factor expected".to_string())),
        }
    }

    async fn restore_session(&self, _blob: &SessionBlob) -> Result<(), BackendError> {
        if self.stale_session {
            Err(BackendError::Auth("session is stale".to_string()))
        } else {
            Ok(())
        }
    }

    async fn invalidate(&self) -> Result<(), BackendError> {
        if self.failing_invalidate {
            Err(BackendError::Transient("backend unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}
