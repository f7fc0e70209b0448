//! The request pipeline.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_config::BridgeConfig;
use courier_core::{
    BackendAdapter, BackendError, CoreError, CoreResult, JsonMap, RequestEnvelope, RequestId,
    ResponseEnvelope,
};
use courier_policy::{Decision, PolicyGuard, PolicyResult};
use courier_registry::{AuthOp, Binding, MethodRegistry, validate_arguments};
use courier_session::{SessionManager, SignInStep};

use crate::backoff::BackoffPolicy;
use crate::confirm::{ConfirmationLedger, PendingConfirmation};
use crate::limiter::RateLimiter;

/// Routes each request through validation, gating, admission control,
/// ordering, and the backend call.
///
/// One dispatcher serves one account session. `dispatch` is cancel-safe at
/// the request level: a cancelled request produces its error response and
/// releases everything it held.
pub struct Dispatcher {
    registry: MethodRegistry,
    session: Arc<SessionManager>,
    policy: PolicyGuard,
    limiter: RateLimiter,
    backend: Arc<dyn BackendAdapter>,
    confirmations: ConfirmationLedger,
    backoff: BackoffPolicy,
    flood_ceiling: Duration,
    request_timeout: Duration,
    seen_ids: DashMap<RequestId, ()>,
    in_flight: DashMap<RequestId, CancellationToken>,
    // Write half serializes mutating operations in lock-acquisition order;
    // the read half lets reads overlap, bounded by `read_slots`.
    order: RwLock<()>,
    read_slots: Semaphore,
}

impl Dispatcher {
    /// Build a dispatcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns a policy error when the configured auto-approve globs do not
    /// compile.
    pub fn new(
        config: &BridgeConfig,
        backend: Arc<dyn BackendAdapter>,
        session: Arc<SessionManager>,
    ) -> PolicyResult<Self> {
        Ok(Self {
            registry: MethodRegistry::builtin(),
            session,
            policy: PolicyGuard::new(&config.policy)?,
            limiter: RateLimiter::new(&config.limits),
            backend,
            confirmations: ConfirmationLedger::new(),
            backoff: BackoffPolicy::new(&config.retry),
            flood_ceiling: config.retry.flood_wait_ceiling(),
            request_timeout: config.runtime.request_timeout(),
            seen_ids: DashMap::new(),
            in_flight: DashMap::new(),
            order: RwLock::new(()),
            read_slots: Semaphore::new(config.runtime.max_concurrent_reads),
        })
    }

    /// The operation registry this dispatcher serves.
    #[must_use]
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Run one request to its terminal response.
    ///
    /// Never panics and never goes silent: every path, including
    /// cancellation and timeout, produces exactly one response envelope.
    pub async fn dispatch(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let id = envelope.id.unwrap_or_else(RequestId::generate);

        if self.seen_ids.insert(id.clone(), ()).is_some() {
            let err = CoreError::DuplicateRequestId { id: id.to_string() };
            warn!(request_id = %id, "rejected duplicate request id");
            return ResponseEnvelope::error(id, &err);
        }

        let token = CancellationToken::new();
        self.in_flight.insert(id.clone(), token.clone());

        let outcome = tokio::select! {
            () = token.cancelled() => Err(CoreError::Cancelled),
            result = self.run(&id, &envelope.operation, &envelope.arguments) => result,
        };

        self.in_flight.remove(&id);
        if matches!(outcome, Err(CoreError::Cancelled)) {
            self.confirmations.forget(&id);
        }

        match outcome {
            Ok(value) => {
                debug!(request_id = %id, operation = %envelope.operation, "request completed");
                ResponseEnvelope::result(id, value)
            },
            Err(err) => {
                info!(
                    request_id = %id,
                    operation = %envelope.operation,
                    kind = ?err.kind(),
                    error = %err,
                    "request failed"
                );
                ResponseEnvelope::error(id, &err)
            },
        }
    }

    /// Cancel an in-flight request. Returns `false` if nothing with that id
    /// is in flight.
    pub fn cancel(&self, id: &RequestId) -> bool {
        match self.in_flight.get(id) {
            Some(entry) => {
                entry.value().cancel();
                true
            },
            None => false,
        }
    }

    /// Deliver an operator verdict for a request parked on confirmation.
    pub fn resolve_confirmation(&self, id: &RequestId, approved: bool) -> bool {
        self.confirmations.resolve(id, approved)
    }

    /// Requests currently parked awaiting confirmation.
    #[must_use]
    pub fn pending_confirmations(&self) -> Vec<PendingConfirmation> {
        self.confirmations.pending()
    }

    async fn run(&self, id: &RequestId, operation: &str, arguments: &JsonMap) -> CoreResult<Value> {
        let descriptor =
            self.registry
                .describe(operation)
                .ok_or_else(|| CoreError::UnknownOperation {
                    name: operation.to_string(),
                })?;
        let args = validate_arguments(descriptor, arguments)?;

        // Auth operations drive the session machine itself; they skip the
        // session gate, the policy guard, and admission control, otherwise
        // the very first sign-in could never happen.
        let binding = match descriptor.binding {
            Binding::Auth(op) => return self.run_auth(op, &args).await,
            Binding::Backend(name) => name,
        };

        self.session.require_ready().await?;

        match self.policy.authorize(descriptor) {
            Decision::Allow => {},
            Decision::Deny { reason } => return Err(CoreError::PolicyDenied { reason }),
            Decision::RequireConfirmation => {
                let verdict = self.confirmations.begin(id.clone(), descriptor.name);
                let mut revoked = self.session.revocations();
                info!(request_id = %id, operation = descriptor.name, "awaiting confirmation");
                let outcome = tokio::select! {
                    outcome = verdict => outcome,
                    _ = revoked.changed() => {
                        self.confirmations.forget(id);
                        return Err(CoreError::NotAuthenticated {
                            reason: "session was invalidated while awaiting confirmation"
                                .to_string(),
                        });
                    },
                };
                match outcome {
                    Ok(true) => {},
                    Ok(false) => {
                        return Err(CoreError::ConfirmationDeclined { id: id.to_string() });
                    },
                    Err(_) => {
                        return Err(CoreError::Internal(
                            "confirmation channel closed before a verdict".to_string(),
                        ));
                    },
                }
                // The verdict may have raced a sign-out.
                self.session.require_ready().await?;
            },
        }

        // Admission and ordering waits count against the request's bound.
        // The gate is re-checked under the ordering lock: sign-out takes the
        // write half, so anything acquiring after it sees the revoked state
        // before touching the backend.
        let call = async {
            self.limiter.admit(descriptor.risk).await?;
            if descriptor.risk.is_mutating() {
                let _order = self.order.write().await;
                self.session.require_ready().await?;
                self.call_with_retry(binding, &args).await
            } else {
                let _order = self.order.read().await;
                let _slot = self
                    .read_slots
                    .acquire()
                    .await
                    .map_err(|_| CoreError::Internal("read semaphore closed".to_string()))?;
                self.session.require_ready().await?;
                self.call_with_retry(binding, &args).await
            }
        };

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                timeout: self.request_timeout,
            }),
        }
    }

    async fn run_auth(&self, op: AuthOp, args: &JsonMap) -> CoreResult<Value> {
        match op {
            AuthOp::BeginSignIn => {
                let phone = str_arg(args, "phone")?;
                self.session.begin_sign_in(phone).await?;
                Ok(json!({"status": "code_sent"}))
            },
            AuthOp::SubmitCode => {
                let code = str_arg(args, "code")?;
                match self.session.submit_code(code).await? {
                    SignInStep::Complete => Ok(json!({"status": "authenticated"})),
                    SignInStep::SecondFactorRequired => {
                        Ok(json!({"status": "second_factor_required"}))
                    },
                }
            },
            AuthOp::SubmitSecondFactor => {
                let password = str_arg(args, "password")?;
                self.session.submit_second_factor(password).await?;
                Ok(json!({"status": "authenticated"}))
            },
            AuthOp::SignOut => {
                // Revocation orders behind backend calls already holding the
                // lock; everything queued after it fails the gate re-check.
                let _order = self.order.write().await;
                self.session.sign_out().await?;
                Ok(json!({"status": "signed_out"}))
            },
            AuthOp::SessionStatus => {
                let state = self.session.state().await;
                Ok(json!({"state": state, "ready": state.is_ready()}))
            },
        }
    }

    async fn call_with_retry(&self, binding: &str, args: &JsonMap) -> CoreResult<Value> {
        let mut flood_retried = false;
        let mut attempt: u32 = 1;

        loop {
            match self.backend.call(binding, args).await {
                Ok(value) => return Ok(value),
                Err(BackendError::Flood { retry_after }) => {
                    if retry_after > self.flood_ceiling {
                        return Err(CoreError::RateLimited {
                            reason: format!(
                                "backend flood wait of {}s exceeds the {}s ceiling",
                                retry_after.as_secs(),
                                self.flood_ceiling.as_secs()
                            ),
                            retry_after: Some(retry_after),
                        });
                    }
                    if flood_retried {
                        return Err(CoreError::RateLimited {
                            reason: "backend flood persisted after waiting".to_string(),
                            retry_after: Some(retry_after),
                        });
                    }
                    flood_retried = true;
                    warn!(
                        binding,
                        wait_secs = retry_after.as_secs(),
                        "backend flood wait, honoring before one retry"
                    );
                    tokio::time::sleep(retry_after.saturating_add(self.backoff.delay_with_jitter(1)))
                        .await;
                },
                Err(BackendError::Transient(reason)) => {
                    if attempt >= self.backoff.max_attempts() {
                        return Err(CoreError::Upstream {
                            reason: format!(
                                "transient failure persisted after {attempt} attempts: {reason}"
                            ),
                        });
                    }
                    let delay = self.backoff.delay_with_jitter(attempt);
                    debug!(
                        binding,
                        attempt,
                        delay_ms = delay.as_millis(),
                        reason = %reason,
                        "transient backend failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                },
                Err(BackendError::Auth(reason)) => {
                    return Err(CoreError::NotAuthenticated { reason });
                },
                Err(BackendError::Fatal(reason)) => {
                    return Err(CoreError::Upstream { reason });
                },
                Err(BackendError::Timeout) => {
                    return Err(CoreError::Timeout {
                        timeout: self.request_timeout,
                    });
                },
            }
        }
    }
}

fn str_arg<'a>(args: &'a JsonMap, name: &str) -> CoreResult<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidArguments {
            reason: format!("missing required string argument '{name}'"),
        })
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("operations", &self.registry.len())
            .field("in_flight", &self.in_flight.len())
            .field("pending_confirmations", &self.confirmations.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::ErrorKind;
    use courier_session::SessionStore;
    use courier_test::{MockBackend, fast_config};

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        backend: Arc<MockBackend>,
        _dir: tempfile::TempDir,
    }

    async fn harness(mock: MockBackend, config: BridgeConfig) -> Harness {
        harness_with_auth(mock, config, true).await
    }

    async fn harness_with_auth(mock: MockBackend, config: BridgeConfig, signed_in: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(mock);
        let session = Arc::new(SessionManager::new(
            backend.clone(),
            SessionStore::new(dir.path().join("courier.session")),
        ));

        if signed_in {
            session.begin_sign_in("+15550100").await.unwrap();
            session.submit_code("0000").await.unwrap();
        }

        let dispatcher =
            Arc::new(Dispatcher::new(&config, backend.clone(), session).unwrap());
        Harness {
            dispatcher,
            backend,
            _dir: dir,
        }
    }

    fn request(id: &str, operation: &str, arguments: Value) -> RequestEnvelope {
        let Value::Object(arguments) = arguments else {
            panic!("arguments must be an object");
        };
        RequestEnvelope::new(id, operation, arguments)
    }

    fn auto_approve_all(mut config: BridgeConfig) -> BridgeConfig {
        config.policy.auto_approve = vec!["*".to_string()];
        config
    }

    // -----------------------------------------------------------------------
    // Validation and lookup
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_operation() {
        let h = harness(MockBackend::new(), fast_config()).await;
        let resp = h
            .dispatcher
            .dispatch(request("r1", "summon_demon", json!({})))
            .await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let h = harness(MockBackend::new(), fast_config()).await;
        let resp = h
            .dispatcher
            .dispatch(request("r1", "get_chat_info", json!({"chat_id": "nope"})))
            .await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::ValidationError);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let h = harness(MockBackend::new(), fast_config()).await;
        let ok = h.dispatcher.dispatch(request("r1", "get_me", json!({}))).await;
        assert!(ok.error_body().is_none());

        let dup = h.dispatcher.dispatch(request("r1", "get_me", json!({}))).await;
        assert_eq!(dup.error_body().unwrap().kind, ErrorKind::ValidationError);
        assert!(dup.error_body().unwrap().message.contains("duplicate"));
    }

    #[tokio::test]
    async fn test_missing_id_generated() {
        let h = harness(MockBackend::new(), fast_config()).await;
        let resp = h
            .dispatcher
            .dispatch(RequestEnvelope {
                id: None,
                operation: "get_me".to_string(),
                arguments: JsonMap::new(),
            })
            .await;
        assert!(!resp.id.as_str().is_empty());
        assert!(resp.error_body().is_none());
    }

    // -----------------------------------------------------------------------
    // Session gate and auth operations
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_unauthenticated_gate() {
        let h = harness_with_auth(MockBackend::new(), fast_config(), false).await;
        let resp = h.dispatcher.dispatch(request("r1", "get_me", json!({}))).await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::AuthError);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_session_status_bypasses_gate() {
        let h = harness_with_auth(MockBackend::new(), fast_config(), false).await;
        let resp = h
            .dispatcher
            .dispatch(request("r1", "session_status", json!({})))
            .await;
        match resp.payload {
            courier_core::ResponsePayload::Result(value) => {
                assert_eq!(value["state"], "unauthenticated");
                assert_eq!(value["ready"], false);
            },
            courier_core::ResponsePayload::Error(body) => panic!("unexpected error: {body:?}"),
        }
    }

    #[tokio::test]
    async fn test_sign_in_flow_through_dispatch() {
        let mock = MockBackend::new()
            .with_valid_code("12345")
            .with_second_factor("hunter2");
        let h = harness_with_auth(mock, fast_config(), false).await;

        let resp = h
            .dispatcher
            .dispatch(request("r1", "begin_sign_in", json!({"phone": "+15550100"})))
            .await;
        assert!(resp.error_body().is_none());

        let resp = h
            .dispatcher
            .dispatch(request("r2", "submit_code", json!({"code": "12345"})))
            .await;
        match resp.payload {
            courier_core::ResponsePayload::Result(value) => {
                assert_eq!(value["status"], "second_factor_required");
            },
            courier_core::ResponsePayload::Error(body) => panic!("unexpected error: {body:?}"),
        }

        let resp = h
            .dispatcher
            .dispatch(request(
                "r3",
                "submit_second_factor",
                json!({"password": "hunter2"}),
            ))
            .await;
        assert!(resp.error_body().is_none());

        // And now the gate opens.
        let resp = h.dispatcher.dispatch(request("r4", "get_me", json!({}))).await;
        assert!(resp.error_body().is_none());
    }

    #[tokio::test]
    async fn test_wrong_code_is_auth_error() {
        let mock = MockBackend::new().with_valid_code("12345");
        let h = harness_with_auth(mock, fast_config(), false).await;

        h.dispatcher
            .dispatch(request("r1", "begin_sign_in", json!({"phone": "+15550100"})))
            .await;
        let resp = h
            .dispatcher
            .dispatch(request("r2", "submit_code", json!({"code": "99999"})))
            .await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::AuthError);
    }

    // -----------------------------------------------------------------------
    // Policy and confirmation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_blocked_operation_denied() {
        let mut config = fast_config();
        config.policy.blocked = vec!["delete_message".to_string()];
        let h = harness(MockBackend::new(), config).await;

        let resp = h
            .dispatcher
            .dispatch(request(
                "r1",
                "delete_message",
                json!({"chat_id": 1, "message_ids": [2]}),
            ))
            .await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::PermissionDenied);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_approved() {
        let h = harness(MockBackend::new(), fast_config()).await;
        let dispatcher = h.dispatcher.clone();

        let pending = tokio::spawn(async move {
            dispatcher
                .dispatch(request(
                    "r1",
                    "send_message",
                    json!({"chat_id": 42, "text": "hello"}),
                ))
                .await
        });

        // Wait for the request to park.
        while h.dispatcher.pending_confirmations().is_empty() {
            tokio::task::yield_now().await;
        }
        let parked = h.dispatcher.pending_confirmations();
        assert_eq!(parked[0].operation, "send_message");

        assert!(h.dispatcher.resolve_confirmation(&RequestId::new("r1"), true));
        let resp = pending.await.unwrap();
        assert!(resp.error_body().is_none());
        assert_eq!(h.backend.call_names(), vec!["messages.send".to_string()]);
    }

    #[tokio::test]
    async fn test_confirmation_declined() {
        let h = harness(MockBackend::new(), fast_config()).await;
        let dispatcher = h.dispatcher.clone();

        let pending = tokio::spawn(async move {
            dispatcher
                .dispatch(request(
                    "r1",
                    "send_message",
                    json!({"chat_id": 42, "text": "hello"}),
                ))
                .await
        });

        while h.dispatcher.pending_confirmations().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(h.dispatcher.resolve_confirmation(&RequestId::new("r1"), false));

        let resp = pending.await.unwrap();
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::PermissionDenied);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auto_approved_write_skips_confirmation() {
        let h = harness(MockBackend::new(), auto_approve_all(fast_config())).await;
        let resp = h
            .dispatcher
            .dispatch(request(
                "r1",
                "send_message",
                json!({"chat_id": 42, "text": "hello"}),
            ))
            .await;
        assert!(resp.error_body().is_none());
        assert!(h.dispatcher.pending_confirmations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_fails_writes_queued_behind_it() {
        let mock = MockBackend::new().with_call_delay(Duration::from_secs(5));
        let h = harness(mock, auto_approve_all(fast_config())).await;

        let dispatcher = h.dispatcher.clone();
        let first = tokio::spawn(async move {
            dispatcher
                .dispatch(request(
                    "w1",
                    "send_message",
                    json!({"chat_id": 1, "text": "first"}),
                ))
                .await
        });
        // w1 holds the ordering lock inside its backend call.
        tokio::task::yield_now().await;

        let dispatcher = h.dispatcher.clone();
        let signout =
            tokio::spawn(async move { dispatcher.dispatch(request("s1", "sign_out", json!({}))).await });
        tokio::task::yield_now().await;

        let dispatcher = h.dispatcher.clone();
        let second = tokio::spawn(async move {
            dispatcher
                .dispatch(request(
                    "w2",
                    "send_message",
                    json!({"chat_id": 1, "text": "second"}),
                ))
                .await
        });

        assert!(first.await.unwrap().error_body().is_none());
        assert!(signout.await.unwrap().error_body().is_none());

        // w2 queued behind the sign-out and must not reach the backend.
        let resp = second.await.unwrap();
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::AuthError);
        assert_eq!(h.backend.call_names(), vec!["messages.send".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Flood waits and retries
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_flood_honored_then_retried() {
        let mock = MockBackend::new()
            .with_error(
                "messages.send",
                BackendError::Flood {
                    retry_after: Duration::from_secs(2),
                },
            )
            .with_response("messages.send", json!({"message_id": 7}));
        let h = harness(mock, auto_approve_all(fast_config())).await;

        let resp = h
            .dispatcher
            .dispatch(request(
                "r1",
                "send_message",
                json!({"chat_id": 42, "text": "hello"}),
            ))
            .await;
        assert!(resp.error_body().is_none());
        assert_eq!(h.backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_flood_above_ceiling_fails_immediately() {
        let mock = MockBackend::new().with_error(
            "messages.send",
            BackendError::Flood {
                retry_after: Duration::from_secs(600),
            },
        );
        let h = harness(mock, auto_approve_all(fast_config())).await;

        let resp = h
            .dispatcher
            .dispatch(request(
                "r1",
                "send_message",
                json!({"chat_id": 42, "text": "hello"}),
            ))
            .await;
        let body = resp.error_body().unwrap();
        assert_eq!(body.kind, ErrorKind::RateLimited);
        assert_eq!(body.retry_after, Some(600));
        assert_eq!(h.backend.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_persisting_after_retry_fails() {
        let mock = MockBackend::new()
            .with_error(
                "messages.send",
                BackendError::Flood {
                    retry_after: Duration::from_secs(2),
                },
            )
            .with_error(
                "messages.send",
                BackendError::Flood {
                    retry_after: Duration::from_secs(3),
                },
            );
        let h = harness(mock, auto_approve_all(fast_config())).await;

        let resp = h
            .dispatcher
            .dispatch(request(
                "r1",
                "send_message",
                json!({"chat_id": 42, "text": "hello"}),
            ))
            .await;
        let body = resp.error_body().unwrap();
        assert_eq!(body.kind, ErrorKind::RateLimited);
        assert_eq!(body.retry_after, Some(3));
        assert_eq!(h.backend.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_to_success() {
        let mock = MockBackend::new()
            .with_error("account.get_me", BackendError::Transient("socket reset".to_string()))
            .with_response("account.get_me", json!({"id": 1}));
        let h = harness(mock, fast_config()).await;

        let resp = h.dispatcher.dispatch(request("r1", "get_me", json!({}))).await;
        assert!(resp.error_body().is_none());
        assert_eq!(h.backend.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhausted_is_upstream() {
        let mock = MockBackend::new()
            .with_error("account.get_me", BackendError::Transient("down".to_string()))
            .with_error("account.get_me", BackendError::Transient("down".to_string()))
            .with_error("account.get_me", BackendError::Transient("down".to_string()));
        let h = harness(mock, fast_config()).await;

        let resp = h.dispatcher.dispatch(request("r1", "get_me", json!({}))).await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::UpstreamError);
        // max_attempts = 3: one try plus two retries.
        assert_eq!(h.backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let mock = MockBackend::new()
            .with_error("account.get_me", BackendError::Fatal("bad request".to_string()));
        let h = harness(mock, fast_config()).await;

        let resp = h.dispatcher.dispatch(request("r1", "get_me", json!({}))).await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::UpstreamError);
        assert_eq!(h.backend.calls().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Timeout and cancellation
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let mock = MockBackend::new().with_call_delay(Duration::from_secs(600));
        let mut config = fast_config();
        config.runtime.request_timeout_secs = 30;
        let h = harness(mock, config).await;

        let resp = h.dispatcher.dispatch(request("r1", "get_me", json!({}))).await;
        let body = resp.error_body().unwrap();
        assert_eq!(body.kind, ErrorKind::Timeout);
        assert!(body.message.contains("30s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_covers_admission_wait() {
        let mut config = auto_approve_all(fast_config());
        config.limits.write.capacity = 1;
        config.limits.write.refill_per_sec = 0.001;
        config.limits.write.queue_depth = 8;
        config.runtime.request_timeout_secs = 30;
        let h = harness(MockBackend::new(), config).await;

        let ok = h
            .dispatcher
            .dispatch(request("w1", "send_message", json!({"chat_id": 1, "text": "a"})))
            .await;
        assert!(ok.error_body().is_none());

        // The drained bucket refills far slower than the request bound; the
        // wait for a token must hit the timeout, not stall forever.
        let resp = h
            .dispatcher
            .dispatch(request("w2", "send_message", json!({"chat_id": 1, "text": "b"})))
            .await;
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::Timeout);
        assert_eq!(h.backend.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight() {
        let mock = MockBackend::new().with_call_delay(Duration::from_secs(60));
        let h = harness(mock, fast_config()).await;
        let dispatcher = h.dispatcher.clone();

        let pending =
            tokio::spawn(
                async move { dispatcher.dispatch(request("r1", "get_me", json!({}))).await },
            );
        tokio::task::yield_now().await;

        assert!(h.dispatcher.cancel(&RequestId::new("r1")));
        let resp = pending.await.unwrap();
        assert_eq!(resp.error_body().unwrap().kind, ErrorKind::Timeout);
        assert!(resp.error_body().unwrap().message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_cancel_unknown_id() {
        let h = harness(MockBackend::new(), fast_config()).await;
        assert!(!h.dispatcher.cancel(&RequestId::new("ghost")));
    }

    #[tokio::test]
    async fn test_cancel_parked_confirmation() {
        let h = harness(MockBackend::new(), fast_config()).await;
        let dispatcher = h.dispatcher.clone();

        let pending = tokio::spawn(async move {
            dispatcher
                .dispatch(request(
                    "r1",
                    "send_message",
                    json!({"chat_id": 42, "text": "hello"}),
                ))
                .await
        });
        while h.dispatcher.pending_confirmations().is_empty() {
            tokio::task::yield_now().await;
        }

        assert!(h.dispatcher.cancel(&RequestId::new("r1")));
        let resp = pending.await.unwrap();
        assert!(resp.error_body().unwrap().message.contains("cancelled"));
        // The ledger entry is gone; a late verdict finds nothing.
        assert!(!h.dispatcher.resolve_confirmation(&RequestId::new("r1"), true));
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_writes_execute_in_submission_order() {
        let h = harness(MockBackend::new(), auto_approve_all(fast_config())).await;

        let mut handles = Vec::new();
        for i in 0..5 {
            let dispatcher = h.dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher
                    .dispatch(request(
                        &format!("w{i}"),
                        "send_message",
                        json!({"chat_id": 42, "text": format!("msg {i}")}),
                    ))
                    .await
            }));
            // Let each request reach the ordering lock before the next one
            // is submitted.
            tokio::task::yield_now().await;
        }

        for handle in handles {
            assert!(handle.await.unwrap().error_body().is_none());
        }

        let texts: Vec<String> = h
            .backend
            .calls()
            .into_iter()
            .map(|(_, args)| args["text"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(texts, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }
}
