//! Process-wide authentication state.
//!
//! [`SessionManager`] is the only writer of the session. It changes state at
//! three points: [`SessionManager::bootstrap`], [`SessionManager::login`], and
//! invalidation (user logout or a 401 reported by the gateway).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::auth::api::AuthApi;
use crate::auth::error::LOGIN_FAILED_MESSAGE;
use crate::auth::gateway::AuthEventHandler;
use crate::auth::responses::{Role, UserRecord};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Bootstrapping,
    Authenticated,
    Anonymous,
}

/// Point-in-time copy of the session, handed to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<UserRecord>,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn bootstrapping() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            loading: false,
        }
    }

    pub fn authenticated(user: UserRecord) -> Self {
        Self {
            user: Some(user),
            loading: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.loading {
            SessionPhase::Bootstrapping
        } else if self.user.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.user.as_ref().is_some_and(|user| user.role == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_accountant(&self) -> bool {
        self.has_role(Role::Accountant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserLogout,
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(UserRecord),
    /// The view layer should replace the current screen with the entry screen.
    RedirectToEntry { reason: LogoutReason },
}

pub struct SessionManager {
    state: RwLock<SessionSnapshot>,
    store: Arc<dyn CredentialStore>,
    api: AuthApi,
    events: broadcast::Sender<SessionEvent>,
    forbidden: AtomicU64,
}

impl SessionManager {
    /// Creates the manager in the bootstrapping phase and subscribes it to the
    /// gateway's auth events.
    pub fn new(store: Arc<dyn CredentialStore>, api: AuthApi) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let manager = Arc::new(Self {
            state: RwLock::new(SessionSnapshot::bootstrapping()),
            store,
            api,
            events,
            forbidden: AtomicU64::new(0),
        });

        let handler: Arc<dyn AuthEventHandler> = manager.clone();
        manager.api.gateway().set_auth_handlers(Arc::downgrade(&handler));
        manager
    }

    /// [`SessionManager::new`] followed by [`SessionManager::bootstrap`].
    pub fn start(store: Arc<dyn CredentialStore>, api: AuthApi) -> Arc<Self> {
        let manager = Self::new(store, api);
        manager.bootstrap();
        manager
    }

    /// Loads the session from the credential store. Only the first call has
    /// any effect.
    pub fn bootstrap(&self) {
        let mut state = self.state.write();
        if !state.loading {
            log::debug!("session already bootstrapped");
            return;
        }

        let user = match (self.store.token(), self.store.user()) {
            (Some(_), Some(user)) => Some(user),
            (None, None) => None,
            _ => {
                log::warn!("discarding partially stored credential");
                if let Err(err) = self.store.clear_auth() {
                    log::error!("failed to clear credential store: {}", err);
                }
                None
            }
        };

        match user.as_ref() {
            Some(user) => log::info!("restored session for {} ({})", user.email, user.role),
            None => log::info!("no stored session"),
        }

        *state = SessionSnapshot {
            user,
            loading: false,
        };
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().clone()
    }

    pub fn user(&self) -> Option<UserRecord> {
        self.state.read().user.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.read().phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_authenticated()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.state.read().has_role(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_accountant(&self) -> bool {
        self.has_role(Role::Accountant)
    }

    pub fn api(&self) -> &AuthApi {
        &self.api
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of 403 responses reported since start.
    pub fn forbidden_count(&self) -> u64 {
        self.forbidden.load(Ordering::Relaxed)
    }

    /// Authenticates against the backend and persists the credential.
    ///
    /// Only valid from the anonymous state. On any failure the session is
    /// left exactly as it was.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<UserRecord> {
        if self.is_authenticated() {
            return Err(AuthError::Validation(
                "Already signed in; log out first".into(),
            ));
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::Validation("Email is required".into()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".into()));
        }

        let response = match self.api.login(email, password).await {
            Ok(response) => response,
            Err(err) => {
                log::info!("login for {} rejected: {}", email, err);
                return Err(login_failure(&err));
            }
        };

        let data = match response.data {
            Some(data) if response.success && !data.token.is_empty() => data,
            _ => {
                let message = response
                    .message
                    .unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string());
                log::info!("login for {} rejected: {}", email, message);
                return Err(AuthError::request_failed(message));
            }
        };

        {
            let mut state = self.state.write();
            self.store.store_credential(&data.token, &data.user)?;
            state.user = Some(data.user.clone());
            state.loading = false;
        }

        log::info!("signed in as {} ({})", data.user.email, data.user.role);
        let _ = self.events.send(SessionEvent::SignedIn(data.user.clone()));
        Ok(data.user)
    }

    pub fn logout(&self) {
        self.invalidate(LogoutReason::UserLogout);
    }

    fn invalidate(&self, reason: LogoutReason) {
        let had_session = {
            let mut state = self.state.write();
            let had_session = state.user.is_some();
            if let Err(err) = self.store.clear_auth() {
                log::error!("failed to clear credential store: {}", err);
            }
            state.user = None;
            had_session
        };

        if !had_session {
            log::debug!("invalidation ({:?}) with no active session", reason);
            return;
        }

        log::info!("session ended ({:?})", reason);
        let _ = self.events.send(SessionEvent::RedirectToEntry { reason });
    }
}

impl AuthEventHandler for SessionManager {
    fn on_unauthenticated(&self) {
        self.invalidate(LogoutReason::SessionExpired);
    }

    fn on_forbidden(&self, path: &str) {
        let total = self.forbidden.fetch_add(1, Ordering::Relaxed) + 1;
        log::warn!("access to {} forbidden for current role ({} so far)", path, total);
    }
}

fn login_failure(err: &AuthError) -> AuthError {
    match err {
        AuthError::Validation(message) => AuthError::Validation(message.clone()),
        _ => AuthError::RequestFailed {
            status: err.status(),
            message: err
                .server_message()
                .unwrap_or(LOGIN_FAILED_MESSAGE)
                .to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::EndpointPaths;
    use crate::auth::gateway::{RequestGateway, TransportResponse};
    use crate::auth::store::MemoryCredentialStore;
    use crate::auth::ErrorKind;
    use crate::test_support::ScriptedTransport;
    use reqwest::StatusCode;
    use serde_json::json;

    fn admin() -> UserRecord {
        UserRecord {
            id: "1".into(),
            email: "head@school.test".into(),
            role: Role::Admin,
            created_at: None,
        }
    }

    fn manager_with(
        store: Arc<MemoryCredentialStore>,
        transport: Arc<ScriptedTransport>,
    ) -> Arc<SessionManager> {
        let gateway = Arc::new(RequestGateway::new(transport, store.clone()));
        SessionManager::new(store, AuthApi::new(gateway, EndpointPaths::default()))
    }

    fn unreachable_transport() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::new(|_| {
            TransportResponse::empty(StatusCode::SERVICE_UNAVAILABLE)
        }))
    }

    #[test]
    fn starts_bootstrapping_and_transitions_once() {
        let store = Arc::new(MemoryCredentialStore::with_credential("tok", admin()));
        let manager = manager_with(store.clone(), unreachable_transport());
        assert_eq!(manager.phase(), SessionPhase::Bootstrapping);
        assert!(manager.loading());

        manager.bootstrap();
        assert_eq!(manager.phase(), SessionPhase::Authenticated);
        assert_eq!(manager.user(), Some(admin()));

        // A second bootstrap must not re-read the store.
        store.clear_auth().expect("clear");
        manager.bootstrap();
        assert_eq!(manager.phase(), SessionPhase::Authenticated);
    }

    #[test]
    fn partial_credential_bootstraps_anonymous_and_is_cleared() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set_token("orphan").expect("set token");
        let manager = manager_with(store.clone(), unreachable_transport());
        manager.bootstrap();

        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert_eq!(store.token(), None);
    }

    #[test]
    fn role_queries_follow_the_user() {
        let snapshot = SessionSnapshot::authenticated(admin());
        assert!(snapshot.is_admin());
        assert!(!snapshot.is_accountant());
        assert!(!SessionSnapshot::anonymous().has_role(Role::Admin));
        assert_eq!(
            SessionSnapshot::bootstrapping().phase(),
            SessionPhase::Bootstrapping
        );
    }

    #[tokio::test]
    async fn empty_credentials_fail_validation_without_network() {
        let transport = unreachable_transport();
        let manager = manager_with(Arc::new(MemoryCredentialStore::new()), transport.clone());
        manager.bootstrap();

        let err = manager.login("   ", "pw").await.expect_err("empty email");
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        let err = manager.login("a@school.test", "").await.expect_err("empty password");
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unsuccessful_envelope_reports_server_message() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            TransportResponse::json(
                StatusCode::OK,
                json!({"success": false, "message": "Account disabled"}),
            )
        }));
        let store = Arc::new(MemoryCredentialStore::new());
        let manager = manager_with(store.clone(), transport);
        manager.bootstrap();

        let err = manager
            .login("a@school.test", "pw")
            .await
            .expect_err("login must fail");
        assert_eq!(err.to_string(), "Account disabled");
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert_eq!(store.token(), None);
    }

    #[tokio::test]
    async fn forbidden_is_counted_but_not_fatal() {
        let store = Arc::new(MemoryCredentialStore::with_credential("tok", admin()));
        let manager = manager_with(store.clone(), unreachable_transport());
        manager.bootstrap();

        manager.on_forbidden("/auth/users");
        manager.on_forbidden("/auth/users");

        assert_eq!(manager.forbidden_count(), 2);
        assert!(manager.is_authenticated());
        assert_eq!(store.token().as_deref(), Some("tok"));
    }

    #[test]
    fn orphaned_token_is_cleared_without_a_redirect() {
        let store = Arc::new(MemoryCredentialStore::new());
        let manager = manager_with(store.clone(), unreachable_transport());
        manager.bootstrap();
        store.set_token("orphan").expect("set token");
        let mut events = manager.subscribe();

        manager.on_unauthenticated();

        assert_eq!(store.token(), None);
        assert!(events.try_recv().is_err());
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
    }

    #[test]
    fn logout_when_anonymous_emits_nothing() {
        let manager = manager_with(Arc::new(MemoryCredentialStore::new()), unreachable_transport());
        manager.bootstrap();
        let mut events = manager.subscribe();

        manager.logout();
        manager.on_unauthenticated();

        assert!(events.try_recv().is_err());
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
    }
}
