//! The authentication state machine.
//!
//! `AuthController` owns the observable `AuthState` and current user, and runs
//! the login, validate and logout flows against a `SessionStore` and an
//! `AuthGateway`. Each flow is a spawned Tokio task; the public methods return
//! its `JoinHandle` so callers may await completion or simply drop it.
//!
//! Flows are not de-duplicated. When two overlap, whichever finishes last
//! sets the final state. Store writes run on the blocking pool.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::AuthState;
use crate::api::{AuthError, AuthGateway};
use crate::models::{Authenticated, Credentials, Session, User};
use crate::store::{SessionStore, StorageError};

struct Inner {
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn AuthGateway>,
    state_tx: watch::Sender<AuthState>,
    user_tx: watch::Sender<Option<User>>,
    startup_task: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to a single authentication state machine.
///
/// Only the controller publishes state; everything else observes it through
/// `subscribe_state` / `subscribe_user` or the point-in-time getters.
#[derive(Clone)]
pub struct AuthController {
    inner: Arc<Inner>,
}

impl AuthController {
    /// Create the controller and run the startup check.
    ///
    /// A stored session is trusted immediately (`Success`) and then
    /// confirmed with the server in the background. Must be called from
    /// within a Tokio runtime.
    pub fn new(store: Arc<dyn SessionStore>, gateway: Arc<dyn AuthGateway>) -> Self {
        Self::with_idle_timeout(store, gateway, None)
    }

    /// Like `new`, but a stored session idle for longer than `max_idle` is
    /// logged out at startup instead of being trusted.
    pub fn with_idle_timeout(
        store: Arc<dyn SessionStore>,
        gateway: Arc<dyn AuthGateway>,
        max_idle: Option<Duration>,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthState::Idle);
        let (user_tx, _) = watch::channel(None);

        let controller = Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                state_tx,
                user_tx,
                startup_task: Mutex::new(None),
            }),
        };
        controller.check_existing_session(max_idle);
        controller
    }

    fn check_existing_session(&self, max_idle: Option<Duration>) {
        if !self.inner.store.is_logged_in() {
            debug!("No stored session");
            return;
        }

        if let Some(idle) = max_idle.and_then(|max| self.idle_beyond(max)) {
            info!(idle_minutes = idle.num_minutes(), "Stored session idle too long, logging out");
            let handle = self.logout();
            self.set_startup_task(handle);
            return;
        }

        let Some(user) = self.inner.store.current_user() else {
            warn!("Stored session has no user, staying idle");
            return;
        };

        info!(user_id = %user.id, "Restoring stored session");
        self.set_user(Some(user.clone()));
        self.transition(AuthState::Success(user));

        let handle = self.validate_token();
        self.set_startup_task(handle);
    }

    fn set_startup_task(&self, handle: JoinHandle<()>) {
        *self
            .inner
            .startup_task
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> AuthState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.user_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_user(&self) -> watch::Receiver<Option<User>> {
        self.inner.user_tx.subscribe()
    }

    /// Handle of the background task started by the constructor (validation
    /// of a restored session, or logout of an idle one), if any.
    /// Can be taken once.
    pub fn startup_task(&self) -> Option<JoinHandle<()>> {
        self.inner
            .startup_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Whether a session is stored. Ignores any pending `Loading`/`Error`.
    pub fn is_logged_in(&self) -> bool {
        self.inner.store.is_logged_in()
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Log in with email and password.
    ///
    /// The state is `Loading` by the time this returns. The task ends in
    /// `Success(user)` with the session saved, or in `Error(message)`.
    pub fn login(&self, email: impl Into<String>, password: impl Into<String>) -> JoinHandle<()> {
        let credentials = Credentials::new(email, password);
        self.transition(AuthState::Loading);

        let this = self.clone();
        tokio::spawn(async move { this.run_login(credentials).await })
    }

    async fn run_login(&self, credentials: Credentials) {
        info!(email = %credentials.email, "Login started");
        let result = match self
            .inner
            .gateway
            .authenticate(&credentials.email, &credentials.password)
            .await
        {
            Ok(authenticated) => self.persist_login(authenticated).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(user) => {
                info!(user_id = %user.id, "Login successful");
                self.set_user(Some(user.clone()));
                self.transition(AuthState::Success(user));
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.transition(AuthState::Error(e.user_message()));
            }
        }
    }

    async fn persist_login(&self, authenticated: Authenticated) -> Result<User, AuthError> {
        let Authenticated { token, user } = authenticated;
        let session = Session::new(token, user.clone())?;
        self.blocking(move |store| store.save(session)).await?;
        Ok(user)
    }

    /// Confirm the stored token with the server.
    ///
    /// An explicit rejection logs out. A failure to reach the server keeps the
    /// local session so the app stays usable offline.
    pub fn validate_token(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_validate().await })
    }

    async fn run_validate(&self) {
        let Some(token) = self.inner.store.current_token() else {
            debug!("No token to validate");
            return;
        };

        match self.inner.gateway.validate_token(&token).await {
            Ok(true) => debug!("Token still valid"),
            Ok(false) => {
                // A newer login may have replaced the rejected token meanwhile
                if self.inner.store.current_token().as_deref() != Some(token.as_str()) {
                    info!("Rejected token was already replaced, keeping current session");
                    return;
                }
                info!("Token rejected by server, logging out");
                self.transition(AuthState::Loading);
                self.run_rejected_logout(token).await;
            }
            Err(e) => {
                warn!(error = %e, "Token validation failed, keeping local session");
            }
        }
    }

    /// Logout for a token the server rejected. Only that token's session is
    /// cleared; one saved by a login that finished meanwhile is kept.
    async fn run_rejected_logout(&self, token: String) {
        self.revoke(&token).await;

        match self.blocking(move |store| store.clear_if_token(&token)).await {
            Ok(true) => {}
            Ok(false) => {
                if let Some(user) = self.inner.store.current_user() {
                    info!(user_id = %user.id, "Session replaced during logout, keeping it");
                    self.set_user(Some(user.clone()));
                    self.transition(AuthState::Success(user));
                    return;
                }
            }
            Err(e) => error!(error = %e, "Failed to clear stored session"),
        }
        self.finish_logout();
    }

    /// Log out. Always ends in `LoggedOut` with the session cleared, whatever
    /// the server says about revoking the token.
    pub fn logout(&self) -> JoinHandle<()> {
        self.transition(AuthState::Loading);

        let this = self.clone();
        tokio::spawn(async move { this.run_logout().await })
    }

    async fn run_logout(&self) {
        if let Some(token) = self.inner.store.current_token() {
            self.revoke(&token).await;
        }

        if let Err(e) = self.blocking(|store| store.clear()).await {
            error!(error = %e, "Failed to clear stored session");
        }
        self.finish_logout();
    }

    async fn revoke(&self, token: &str) {
        if let Err(e) = self.inner.gateway.revoke(token).await {
            warn!(error = %e, "Remote logout failed, clearing local session anyway");
        }
    }

    fn finish_logout(&self) {
        self.set_user(None);
        self.transition(AuthState::LoggedOut);
        info!("Logged out");
    }

    /// Log out if the stored session has been idle longer than `max_idle`.
    /// Returns the logout task when one was started.
    pub fn enforce_idle_timeout(&self, max_idle: Duration) -> Option<JoinHandle<()>> {
        let idle = self.idle_beyond(max_idle)?;
        info!(idle_minutes = idle.num_minutes(), "Session idle too long, logging out");
        Some(self.logout())
    }

    /// How long the stored session has been idle, if that exceeds `max_idle`
    fn idle_beyond(&self, max_idle: Duration) -> Option<Duration> {
        if !self.inner.store.is_logged_in() {
            return None;
        }
        let idle = Utc::now() - self.inner.store.last_activity()?;
        (idle > max_idle).then_some(idle)
    }

    // =========================================================================
    // Auxiliary
    // =========================================================================

    /// Return to `Idle` once a terminal state has been consumed
    pub fn reset_auth_state(&self) {
        self.transition(AuthState::Idle);
    }

    /// Record user activity on the stored session; does not touch the state.
    /// The write runs on the blocking pool; the returned handle may be dropped.
    pub fn update_user_activity(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.touch_activity(Utc::now()) {
                warn!(error = %e, "Failed to record user activity");
            }
        })
    }

    /// Run a store write off the async workers
    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&dyn SessionStore) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    fn transition(&self, next: AuthState) {
        let to = next.name();
        let previous = self.inner.state_tx.send_replace(next);
        debug!(from = previous.name(), to, "Auth state changed");
    }

    fn set_user(&self, user: Option<User>) {
        self.inner.user_tx.send_replace(user);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::DateTime;
    use tokio::sync::Notify;

    use crate::store::MemorySessionStore;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    #[derive(Clone, Copy)]
    enum Validation {
        Valid,
        Rejected,
        Offline,
    }

    /// Gateway whose answers depend on the password and a fixed validation reply.
    ///
    /// - "secret" authenticates
    /// - "wrong" fails with `InvalidCredentials("bad password")`
    /// - "offline" fails with a network error
    /// - anything else fails with an empty server error
    struct FakeGateway {
        validation: Validation,
        revoke_fails: bool,
        validate_gate: Option<Arc<Notify>>,
        revoke_gate: Option<Arc<Notify>>,
        authenticate_calls: Mutex<Vec<String>>,
        validated_tokens: Mutex<Vec<String>>,
        revoked_tokens: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn new(validation: Validation) -> Self {
            Self {
                validation,
                revoke_fails: false,
                validate_gate: None,
                revoke_gate: None,
                authenticate_calls: Mutex::new(Vec::new()),
                validated_tokens: Mutex::new(Vec::new()),
                revoked_tokens: Mutex::new(Vec::new()),
            }
        }

        fn failing_revoke(mut self) -> Self {
            self.revoke_fails = true;
            self
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.validate_gate = Some(gate);
            self
        }

        fn gated_revoke(mut self, gate: Arc<Notify>) -> Self {
            self.revoke_gate = Some(gate);
            self
        }

        fn authenticate_calls(&self) -> usize {
            self.authenticate_calls.lock().unwrap().len()
        }

        fn validated(&self) -> Vec<String> {
            self.validated_tokens.lock().unwrap().clone()
        }

        fn revoked(&self) -> Vec<String> {
            self.revoked_tokens.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthGateway for FakeGateway {
        async fn authenticate(
            &self,
            email: &str,
            password: &str,
        ) -> Result<Authenticated, AuthError> {
            self.authenticate_calls.lock().unwrap().push(email.to_string());
            match password {
                "secret" => Ok(Authenticated {
                    token: format!("tok-{}", email),
                    user: User::new(format!("id-{}", email), email, "Logged In"),
                }),
                "wrong" => Err(AuthError::InvalidCredentials("bad password".to_string())),
                "offline" => Err(AuthError::NetworkError("connection refused".to_string())),
                _ => Err(AuthError::ServerError(String::new())),
            }
        }

        async fn validate_token(&self, token: &str) -> Result<bool, AuthError> {
            if let Some(gate) = &self.validate_gate {
                gate.notified().await;
            }
            self.validated_tokens.lock().unwrap().push(token.to_string());
            match self.validation {
                Validation::Valid => Ok(true),
                Validation::Rejected => Ok(false),
                Validation::Offline => Err(AuthError::NetworkError("no route to host".to_string())),
            }
        }

        async fn revoke(&self, token: &str) -> Result<(), AuthError> {
            if let Some(gate) = &self.revoke_gate {
                gate.notified().await;
            }
            self.revoked_tokens.lock().unwrap().push(token.to_string());
            if self.revoke_fails {
                Err(AuthError::NetworkError("offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Store whose writes always fail; clear forgets the session but still errors
    struct BrokenStore {
        inner: MemorySessionStore,
    }

    impl SessionStore for BrokenStore {
        fn is_logged_in(&self) -> bool {
            self.inner.is_logged_in()
        }

        fn current_user(&self) -> Option<User> {
            self.inner.current_user()
        }

        fn current_token(&self) -> Option<String> {
            self.inner.current_token()
        }

        fn last_activity(&self) -> Option<DateTime<Utc>> {
            self.inner.last_activity()
        }

        fn save(&self, _session: Session) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }

        fn clear(&self) -> Result<(), StorageError> {
            self.inner.clear()?;
            Err(StorageError::Io(std::io::Error::other("read-only filesystem")))
        }

        fn clear_if_token(&self, token: &str) -> Result<bool, StorageError> {
            self.inner.clear_if_token(token)?;
            Err(StorageError::Io(std::io::Error::other("read-only filesystem")))
        }

        fn touch_activity(&self, _at: DateTime<Utc>) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }
    }

    fn user_u() -> User {
        User::new("u", "u@example.com", "U")
    }

    fn broken(token: &str) -> Arc<BrokenStore> {
        Arc::new(BrokenStore {
            inner: MemorySessionStore::with_session(
                Session::new(token, user_u()).expect("valid session"),
            ),
        })
    }

    fn stored(token: &str) -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_session(
            Session::new(token, user_u()).expect("valid session"),
        ))
    }

    async fn finish_startup(controller: &AuthController) {
        if let Some(handle) = controller.startup_task() {
            handle.await.expect("startup task panicked");
        }
    }

    // -------------------------------------------------------------------------
    // Startup
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_startup_without_session_is_idle() {
        let store = Arc::new(MemorySessionStore::new());
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store, gateway.clone());

        assert_eq!(controller.state(), AuthState::Idle);
        assert!(!controller.is_logged_in());
        assert!(controller.current_user().is_none());
        assert!(controller.startup_task().is_none());
        assert!(gateway.validated().is_empty());
    }

    #[tokio::test]
    async fn test_startup_trusts_session_before_validation_returns() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(FakeGateway::new(Validation::Valid).gated(gate.clone()));
        let controller = AuthController::new(stored("t1"), gateway.clone());

        // Validation is still parked on the gate
        assert_eq!(controller.state(), AuthState::Success(user_u()));
        assert_eq!(controller.current_user(), Some(user_u()));
        assert!(gateway.validated().is_empty());

        gate.notify_one();
        finish_startup(&controller).await;
        assert_eq!(gateway.validated(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_startup_valid_token_keeps_session() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;

        assert_eq!(controller.state(), AuthState::Success(user_u()));
        assert_eq!(store.current_token().as_deref(), Some("t1"));
        assert_eq!(store.current_user(), Some(user_u()));
    }

    #[tokio::test]
    async fn test_startup_rejected_token_logs_out() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Rejected));
        let controller = AuthController::new(store.clone(), gateway.clone());
        finish_startup(&controller).await;

        assert_eq!(controller.state(), AuthState::LoggedOut);
        assert!(!store.is_logged_in());
        assert!(controller.current_user().is_none());
        assert_eq!(gateway.revoked(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_startup_offline_keeps_session() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Offline));
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;

        assert_eq!(controller.state(), AuthState::Success(user_u()));
        assert!(store.is_logged_in());
    }

    #[tokio::test]
    async fn test_startup_idle_session_is_logged_out_not_trusted() {
        let session = Session::new("t1", user_u())
            .expect("valid session")
            .touched(Utc::now() - Duration::minutes(45));
        let store = Arc::new(MemorySessionStore::with_session(session));
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let max_idle = Some(Duration::minutes(30));
        let controller =
            AuthController::with_idle_timeout(store.clone(), gateway.clone(), max_idle);

        assert_eq!(controller.state(), AuthState::Loading);
        assert!(controller.current_user().is_none());

        finish_startup(&controller).await;
        assert_eq!(controller.state(), AuthState::LoggedOut);
        assert!(!store.is_logged_in());
        assert!(gateway.validated().is_empty());
        assert_eq!(gateway.revoked(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_startup_recent_session_within_idle_limit_is_trusted() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let max_idle = Some(Duration::minutes(30));
        let controller =
            AuthController::with_idle_timeout(store.clone(), gateway.clone(), max_idle);

        assert_eq!(controller.state(), AuthState::Success(user_u()));
        finish_startup(&controller).await;
        assert_eq!(gateway.validated(), vec!["t1".to_string()]);
        assert!(store.is_logged_in());
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_success_saves_session() {
        let store = Arc::new(MemorySessionStore::new());
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway);

        let handle = controller.login("a@b.com", "secret");
        assert_eq!(controller.state(), AuthState::Loading);
        handle.await.expect("login task panicked");

        let user = User::new("id-a@b.com", "a@b.com", "Logged In");
        assert_eq!(controller.state(), AuthState::Success(user.clone()));
        assert_eq!(controller.current_user(), Some(user.clone()));
        assert!(controller.is_logged_in());
        assert_eq!(store.current_user(), Some(user));
        assert_eq!(store.current_token().as_deref(), Some("tok-a@b.com"));
    }

    #[tokio::test]
    async fn test_login_invalid_credentials() {
        let store = Arc::new(MemorySessionStore::new());
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway);

        controller.login("a@b.com", "wrong").await.expect("login task panicked");

        assert_eq!(controller.state(), AuthState::Error("bad password".to_string()));
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn test_login_failure_does_not_overwrite_existing_session() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;

        controller.login("a@b.com", "wrong").await.expect("login task panicked");

        assert_eq!(controller.state(), AuthState::Error("bad password".to_string()));
        assert_eq!(store.current_token().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_login_error_without_message_uses_default() {
        let controller = AuthController::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(FakeGateway::new(Validation::Valid)),
        );

        controller.login("a@b.com", "server-breaks").await.expect("login task panicked");

        assert_eq!(
            controller.state(),
            AuthState::Error(crate::api::UNKNOWN_ERROR_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn test_login_network_error_surfaces_message() {
        let controller = AuthController::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(FakeGateway::new(Validation::Valid)),
        );

        controller.login("a@b.com", "offline").await.expect("login task panicked");

        assert_eq!(controller.state(), AuthState::Error("connection refused".to_string()));
    }

    #[tokio::test]
    async fn test_login_leaves_credential_checks_to_gateway() {
        let store = Arc::new(MemorySessionStore::new());
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway.clone());

        // This gateway accepts any email with the right password
        controller.login("", "secret").await.expect("login task panicked");

        assert_eq!(gateway.authenticate_calls(), 1);
        assert!(matches!(controller.state(), AuthState::Success(_)));
        assert_eq!(store.current_token().as_deref(), Some("tok-"));
    }

    #[tokio::test]
    async fn test_login_storage_failure_keeps_previous_session() {
        let store = broken("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;

        controller.login("a@b.com", "secret").await.expect("login task panicked");

        let message = controller.state().error_message().map(str::to_string);
        assert!(message.is_some_and(|m| m.contains("disk full")));
        assert_eq!(store.current_token().as_deref(), Some("t1"));
        assert_eq!(controller.current_user(), Some(user_u()));
    }

    // -------------------------------------------------------------------------
    // Validate
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_validate_without_session_does_nothing() {
        let gateway = Arc::new(FakeGateway::new(Validation::Rejected));
        let controller = AuthController::new(Arc::new(MemorySessionStore::new()), gateway.clone());

        controller.validate_token().await.expect("validate task panicked");

        assert_eq!(controller.state(), AuthState::Idle);
        assert!(gateway.validated().is_empty());
    }

    #[tokio::test]
    async fn test_validate_network_failure_preserves_state() {
        let store = Arc::new(MemorySessionStore::new());
        let gateway = Arc::new(FakeGateway::new(Validation::Offline));
        let controller = AuthController::new(store.clone(), gateway);
        controller.login("a@b.com", "secret").await.expect("login task panicked");
        let before = controller.state();

        controller.validate_token().await.expect("validate task panicked");

        assert_eq!(controller.state(), before);
        assert!(store.is_logged_in());
    }

    #[tokio::test]
    async fn test_stale_rejection_does_not_evict_newer_login() {
        let gate = Arc::new(Notify::new());
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Rejected).gated(gate.clone()));
        let controller = AuthController::new(store.clone(), gateway.clone());
        // Let the startup validation pick up "t1" and park on the gate
        tokio::task::yield_now().await;

        controller.login("new@b.com", "secret").await.expect("login task panicked");
        gate.notify_one();
        finish_startup(&controller).await;

        assert_eq!(gateway.validated(), vec!["t1".to_string()]);
        assert_eq!(store.current_token().as_deref(), Some("tok-new@b.com"));
        assert!(matches!(controller.state(), AuthState::Success(u) if u.email == "new@b.com"));
        assert!(gateway.revoked().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_during_newer_login_keeps_new_session() {
        let revoke_gate = Arc::new(Notify::new());
        let store = stored("t1");
        let gateway =
            Arc::new(FakeGateway::new(Validation::Rejected).gated_revoke(revoke_gate.clone()));
        let controller = AuthController::new(store.clone(), gateway.clone());
        // Startup validation gets "t1" rejected and parks inside revoke
        tokio::task::yield_now().await;
        assert_eq!(controller.state(), AuthState::Loading);

        controller.login("new@b.com", "secret").await.expect("login task panicked");
        revoke_gate.notify_one();
        finish_startup(&controller).await;

        assert_eq!(gateway.revoked(), vec!["t1".to_string()]);
        assert_eq!(store.current_token().as_deref(), Some("tok-new@b.com"));
        assert!(matches!(controller.state(), AuthState::Success(u) if u.email == "new@b.com"));
        assert_eq!(controller.current_user().map(|u| u.email), Some("new@b.com".to_string()));
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_logout_clears_session() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway.clone());
        finish_startup(&controller).await;

        let handle = controller.logout();
        assert_eq!(controller.state(), AuthState::Loading);
        handle.await.expect("logout task panicked");

        assert_eq!(controller.state(), AuthState::LoggedOut);
        assert!(!controller.is_logged_in());
        assert!(controller.current_user().is_none());
        assert_eq!(gateway.revoked(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_logout_succeeds_when_revoke_fails() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid).failing_revoke());
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;

        controller.logout().await.expect("logout task panicked");

        assert_eq!(controller.state(), AuthState::LoggedOut);
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn test_logout_twice_is_idempotent() {
        for revoke_fails in [false, true] {
            let store = stored("t1");
            let mut gateway = FakeGateway::new(Validation::Valid);
            if revoke_fails {
                gateway = gateway.failing_revoke();
            }
            let gateway = Arc::new(gateway);
            let controller = AuthController::new(store.clone(), gateway.clone());
            finish_startup(&controller).await;

            controller.logout().await.expect("logout task panicked");
            controller.logout().await.expect("logout task panicked");

            assert_eq!(controller.state(), AuthState::LoggedOut);
            assert!(!controller.is_logged_in());
            // Nothing left to revoke the second time
            assert_eq!(gateway.revoked(), vec!["t1".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_logout_when_never_logged_in() {
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(Arc::new(MemorySessionStore::new()), gateway.clone());

        controller.logout().await.expect("logout task panicked");

        assert_eq!(controller.state(), AuthState::LoggedOut);
        assert!(gateway.revoked().is_empty());
    }

    #[tokio::test]
    async fn test_logout_completes_when_clear_fails() {
        let store = broken("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid).failing_revoke());
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;

        controller.logout().await.expect("logout task panicked");

        assert_eq!(controller.state(), AuthState::LoggedOut);
        assert!(!controller.is_logged_in());
    }

    // -------------------------------------------------------------------------
    // Auxiliary
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_reset_auth_state() {
        let controller = AuthController::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(FakeGateway::new(Validation::Valid)),
        );
        controller.login("a@b.com", "wrong").await.expect("login task panicked");
        assert!(controller.state().error_message().is_some());

        controller.reset_auth_state();
        assert_eq!(controller.state(), AuthState::Idle);
    }

    #[tokio::test]
    async fn test_update_user_activity_leaves_state_alone() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;
        let before = store.last_activity().expect("activity");

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        controller.update_user_activity().await.expect("activity task panicked");

        assert!(store.last_activity().expect("activity") > before);
        assert_eq!(controller.state(), AuthState::Success(user_u()));
    }

    #[tokio::test]
    async fn test_update_user_activity_storage_error_is_swallowed() {
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(broken("t1"), gateway);
        finish_startup(&controller).await;

        controller.update_user_activity().await.expect("activity task panicked");
        assert_eq!(controller.state(), AuthState::Success(user_u()));
    }

    #[tokio::test]
    async fn test_enforce_idle_timeout() {
        let store = stored("t1");
        let gateway = Arc::new(FakeGateway::new(Validation::Valid));
        let controller = AuthController::new(store.clone(), gateway);
        finish_startup(&controller).await;

        assert!(controller.enforce_idle_timeout(Duration::minutes(30)).is_none());
        assert!(store.is_logged_in());

        store
            .touch_activity(Utc::now() - Duration::minutes(45))
            .expect("touch");
        let handle = controller
            .enforce_idle_timeout(Duration::minutes(30))
            .expect("idle session should be logged out");
        handle.await.expect("logout task panicked");

        assert_eq!(controller.state(), AuthState::LoggedOut);
        assert!(!store.is_logged_in());
        assert!(controller.enforce_idle_timeout(Duration::minutes(30)).is_none());
    }

    #[tokio::test]
    async fn test_subscribers_observe_final_state() {
        let controller = AuthController::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(FakeGateway::new(Validation::Valid)),
        );
        let mut state_rx = controller.subscribe_state();
        let mut user_rx = controller.subscribe_user();

        controller.login("a@b.com", "secret").await.expect("login task panicked");

        assert!(state_rx.has_changed().expect("sender alive"));
        assert!(matches!(&*state_rx.borrow_and_update(), AuthState::Success(_)));
        assert_eq!(
            user_rx.borrow_and_update().as_ref().map(|u| u.email.clone()),
            Some("a@b.com".to_string())
        );
    }
}
