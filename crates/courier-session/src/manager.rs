//! The session manager.

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

use courier_core::{BackendAdapter, BackendError, SignInOutcome};

use crate::error::{SessionError, SessionResult};
use crate::state::AuthState;
use crate::store::SessionStore;

/// Consecutive credential rejections tolerated before the flow is revoked.
const MAX_SIGN_IN_ATTEMPTS: u32 = 3;

/// What the caller must do next after a sign-in step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInStep {
    /// Sign-in finished; the session is authenticated and persisted.
    Complete,
    /// The backend wants the account's second factor next.
    SecondFactorRequired,
}

struct Inner {
    state: AuthState,
    failed_attempts: u32,
}

/// Drives the sign-in state machine and owns blob persistence.
///
/// All methods take `&self`; state transitions are serialized by an internal
/// lock held across the backend call, so two concurrent sign-in steps cannot
/// interleave.
pub struct SessionManager {
    backend: Arc<dyn BackendAdapter>,
    store: SessionStore,
    inner: RwLock<Inner>,
    // Bumped on every transition out of `Authenticated`, so suspended
    // requests can observe an invalidation without polling.
    revocations: watch::Sender<u64>,
}

impl SessionManager {
    /// A manager starting from the `Unauthenticated` state.
    #[must_use]
    pub fn new(backend: Arc<dyn BackendAdapter>, store: SessionStore) -> Self {
        let (revocations, _) = watch::channel(0);
        Self {
            backend,
            store,
            inner: RwLock::new(Inner {
                state: AuthState::Unauthenticated,
                failed_attempts: 0,
            }),
            revocations,
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> AuthState {
        self.inner.read().await.state
    }

    /// Whether platform operations may run.
    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.state.is_ready()
    }

    /// Start a sign-in flow: ask the platform to send a code to `phone`.
    ///
    /// Permitted from any state except `Authenticated`; restarting an
    /// in-progress flow requests a fresh code and resets the attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] when already signed in, or
    /// a backend error if the code request fails.
    pub async fn begin_sign_in(&self, phone: &str) -> SessionResult<()> {
        let mut inner = self.inner.write().await;
        if inner.state == AuthState::Authenticated {
            return Err(SessionError::InvalidTransition {
                state: inner.state,
                action: "begin sign-in",
            });
        }

        self.backend.request_login_code(phone).await?;
        inner.state = AuthState::AwaitingCode;
        inner.failed_attempts = 0;
        info!("sign-in started, verification code requested");
        Ok(())
    }

    /// Submit the verification code.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside `AwaitingCode`,
    /// [`SessionError::Rejected`] for a wrong code,
    /// [`SessionError::TooManyAttempts`] once the attempt budget is spent,
    /// or a store/backend error.
    pub async fn submit_code(&self, code: &str) -> SessionResult<SignInStep> {
        let mut inner = self.inner.write().await;
        if inner.state != AuthState::AwaitingCode {
            return Err(SessionError::InvalidTransition {
                state: inner.state,
                action: "submit a code",
            });
        }

        match self.backend.submit_code(code).await {
            Ok(SignInOutcome::Complete(blob)) => {
                self.store.save(&blob)?;
                inner.state = AuthState::Authenticated;
                inner.failed_attempts = 0;
                info!("sign-in complete");
                Ok(SignInStep::Complete)
            },
            Ok(SignInOutcome::SecondFactorRequired) => {
                inner.state = AuthState::AwaitingSecondFactor;
                info!("second factor required");
                Ok(SignInStep::SecondFactorRequired)
            },
            Err(BackendError::Auth(reason)) => Err(Self::record_rejection(&mut inner, reason)),
            Err(other) => Err(other.into()),
        }
    }

    /// Submit the second-factor secret.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`submit_code`](Self::submit_code), from the
    /// `AwaitingSecondFactor` state.
    pub async fn submit_second_factor(&self, secret: &str) -> SessionResult<()> {
        let mut inner = self.inner.write().await;
        if inner.state != AuthState::AwaitingSecondFactor {
            return Err(SessionError::InvalidTransition {
                state: inner.state,
                action: "submit a second factor",
            });
        }

        match self.backend.submit_second_factor(secret).await {
            Ok(blob) => {
                self.store.save(&blob)?;
                inner.state = AuthState::Authenticated;
                inner.failed_attempts = 0;
                info!("sign-in complete");
                Ok(())
            },
            Err(BackendError::Auth(reason)) => Err(Self::record_rejection(&mut inner, reason)),
            Err(other) => Err(other.into()),
        }
    }

    /// Sign out: revoke on the backend, remove the persisted blob.
    ///
    /// Backend revocation is best-effort; local state is cleared regardless,
    /// so an unreachable backend cannot pin a session on this machine.
    ///
    /// # Errors
    ///
    /// Returns a store error if the persisted blob cannot be removed.
    pub async fn sign_out(&self) -> SessionResult<()> {
        let mut inner = self.inner.write().await;

        if let Err(e) = self.backend.invalidate().await {
            warn!(error = %e, "backend sign-out failed, revoking locally anyway");
        }
        self.store.clear()?;
        inner.state = AuthState::Revoked;
        inner.failed_attempts = 0;
        self.revocations.send_modify(|epoch| *epoch += 1);
        info!("signed out");
        Ok(())
    }

    /// A receiver that changes whenever the session is invalidated.
    ///
    /// Callers holding a request suspended (confirmation, admission) select
    /// against this to fail the request instead of dispatching it on a dead
    /// session.
    #[must_use]
    pub fn revocations(&self) -> watch::Receiver<u64> {
        self.revocations.subscribe()
    }

    /// Try to resume a persisted session from disk.
    ///
    /// Returns `true` when a blob was found and the backend accepted it. A
    /// missing blob, or one the backend rejects as stale, leaves the session
    /// unauthenticated and returns `false`; a stale blob is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] when already signed in, a
    /// store error, or a non-auth backend error.
    pub async fn restore_from_disk(&self) -> SessionResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.state.is_ready() || inner.state.is_signing_in() {
            return Err(SessionError::InvalidTransition {
                state: inner.state,
                action: "restore a session",
            });
        }

        let Some(blob) = self.store.load()? else {
            return Ok(false);
        };

        match self.backend.restore_session(&blob).await {
            Ok(()) => {
                inner.state = AuthState::Authenticated;
                inner.failed_attempts = 0;
                info!("restored persisted session");
                Ok(true)
            },
            Err(BackendError::Auth(reason)) => {
                warn!(reason = %reason, "persisted session is stale, discarding");
                self.store.clear()?;
                Ok(false)
            },
            Err(other) => Err(other.into()),
        }
    }

    /// Require an authenticated session, for callers gating operations.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] with the current state.
    pub async fn require_ready(&self) -> SessionResult<()> {
        let state = self.inner.read().await.state;
        if state.is_ready() {
            Ok(())
        } else {
            Err(SessionError::NotAuthenticated { state })
        }
    }

    fn record_rejection(inner: &mut Inner, reason: String) -> SessionError {
        inner.failed_attempts = inner.failed_attempts.saturating_add(1);
        if inner.failed_attempts >= MAX_SIGN_IN_ATTEMPTS {
            let attempts = inner.failed_attempts;
            inner.state = AuthState::Revoked;
            warn!(attempts, "sign-in revoked after repeated rejections");
            SessionError::TooManyAttempts { attempts }
        } else {
            SessionError::Rejected { reason }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_test::MockBackend;

    fn manager_with(backend: MockBackend, dir: &tempfile::TempDir) -> SessionManager {
        SessionManager::new(
            Arc::new(backend),
            SessionStore::new(dir.path().join("courier.session")),
        )
    }

    // -----------------------------------------------------------------------
    // Happy paths
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_code_only_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new().with_valid_code("12345"), &dir);

        manager.begin_sign_in("+15550100").await.unwrap();
        assert_eq!(manager.state().await, AuthState::AwaitingCode);

        let step = manager.submit_code("12345").await.unwrap();
        assert_eq!(step, SignInStep::Complete);
        assert!(manager.is_ready().await);
    }

    #[tokio::test]
    async fn test_two_factor_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new()
            .with_valid_code("12345")
            .with_second_factor("hunter2");
        let manager = manager_with(backend, &dir);

        manager.begin_sign_in("+15550100").await.unwrap();
        let step = manager.submit_code("12345").await.unwrap();
        assert_eq!(step, SignInStep::SecondFactorRequired);
        assert_eq!(manager.state().await, AuthState::AwaitingSecondFactor);

        manager.submit_second_factor("hunter2").await.unwrap();
        assert!(manager.is_ready().await);
    }

    #[tokio::test]
    async fn test_sign_in_persists_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("courier.session"));
        let manager = SessionManager::new(
            Arc::new(MockBackend::new().with_valid_code("12345")),
            store.clone(),
        );

        manager.begin_sign_in("+15550100").await.unwrap();
        manager.submit_code("12345").await.unwrap();

        assert!(store.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restore_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("courier.session"));
        store
            .save(&courier_core::SessionBlob::new(b"persisted".to_vec()))
            .unwrap();

        let manager = SessionManager::new(Arc::new(MockBackend::new()), store);
        assert!(manager.restore_from_disk().await.unwrap());
        assert!(manager.is_ready().await);
    }

    #[tokio::test]
    async fn test_restore_without_blob() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new(), &dir);
        assert!(!manager.restore_from_disk().await.unwrap());
        assert_eq!(manager.state().await, AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_stale_blob_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("courier.session"));
        store
            .save(&courier_core::SessionBlob::new(b"stale".to_vec()))
            .unwrap();

        let manager =
            SessionManager::new(Arc::new(MockBackend::new().with_stale_session()), store.clone());
        assert!(!manager.restore_from_disk().await.unwrap());
        assert!(store.load().unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // Rejections and the attempt budget
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_wrong_code_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new().with_valid_code("12345"), &dir);

        manager.begin_sign_in("+15550100").await.unwrap();
        let err = manager.submit_code("00000").await.unwrap_err();
        assert!(matches!(err, SessionError::Rejected { .. }));
        // Still awaiting a code; the caller can try again.
        assert_eq!(manager.state().await, AuthState::AwaitingCode);
    }

    #[tokio::test]
    async fn test_third_rejection_revokes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new().with_valid_code("12345"), &dir);

        manager.begin_sign_in("+15550100").await.unwrap();
        for _ in 0..2 {
            let err = manager.submit_code("00000").await.unwrap_err();
            assert!(matches!(err, SessionError::Rejected { .. }));
        }
        let err = manager.submit_code("00000").await.unwrap_err();
        assert!(matches!(err, SessionError::TooManyAttempts { attempts: 3 }));
        assert_eq!(manager.state().await, AuthState::Revoked);
    }

    #[tokio::test]
    async fn test_restart_resets_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new().with_valid_code("12345"), &dir);

        manager.begin_sign_in("+15550100").await.unwrap();
        manager.submit_code("00000").await.unwrap_err();
        manager.submit_code("00000").await.unwrap_err();

        // A fresh flow gets a fresh budget.
        manager.begin_sign_in("+15550100").await.unwrap();
        let err = manager.submit_code("00000").await.unwrap_err();
        assert!(matches!(err, SessionError::Rejected { .. }));
    }

    // -----------------------------------------------------------------------
    // Transition guards
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_code_before_begin_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new(), &dir);
        let err = manager.submit_code("12345").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_begin_while_authenticated_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new().with_valid_code("12345"), &dir);

        manager.begin_sign_in("+15550100").await.unwrap();
        manager.submit_code("12345").await.unwrap();

        let err = manager.begin_sign_in("+15550100").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_second_factor_outside_flow_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new(), &dir);
        let err = manager.submit_second_factor("pw").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    // -----------------------------------------------------------------------
    // Sign-out
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_sign_out_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("courier.session"));
        let manager = SessionManager::new(
            Arc::new(MockBackend::new().with_valid_code("12345")),
            store.clone(),
        );

        manager.begin_sign_in("+15550100").await.unwrap();
        manager.submit_code("12345").await.unwrap();
        manager.sign_out().await.unwrap();

        assert_eq!(manager.state().await, AuthState::Revoked);
        assert!(store.load().unwrap().is_none());
        assert!(manager.require_ready().await.is_err());
    }

    #[tokio::test]
    async fn test_sign_out_signals_revocation_watch() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new().with_valid_code("12345"), &dir);

        manager.begin_sign_in("+15550100").await.unwrap();
        manager.submit_code("12345").await.unwrap();

        let mut revoked = manager.revocations();
        manager.sign_out().await.unwrap();
        revoked.changed().await.unwrap();
        assert_eq!(*revoked.borrow(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_survives_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new().with_failing_invalidate(), &dir);
        manager.sign_out().await.unwrap();
        assert_eq!(manager.state().await, AuthState::Revoked);
    }

    #[tokio::test]
    async fn test_require_ready_reports_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockBackend::new(), &dir);
        let err = manager.require_ready().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotAuthenticated {
                state: AuthState::Unauthenticated
            }
        ));
    }
}
