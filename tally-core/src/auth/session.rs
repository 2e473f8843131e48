//! Auth session wrapper used by the UI layer.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::broadcast;

use super::error::AuthErrorKind;
use super::provider::{AuthProvider, FederatedProvider, ProviderError, User};
use crate::events::EventBus;

/// Auth state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Initial resolution of the persisted session.
    Resolved(Option<User>),
    /// A sign-in (or sign-up) performed during this session.
    SignedIn(User),
    SignedOut,
}

impl AuthEvent {
    /// The user signed in after this event, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthEvent::Resolved(user) => user.as_ref(),
            AuthEvent::SignedIn(user) => Some(user),
            AuthEvent::SignedOut => None,
        }
    }
}

/// Outcome of an auth operation, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub success: bool,
    pub user: Option<User>,
    pub message: String,
    pub error: Option<AuthErrorKind>,
}

impl AuthResult {
    fn ok(user: Option<User>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            user,
            message: message.into(),
            error: None,
        }
    }

    fn failed(error: &ProviderError) -> Self {
        let kind = AuthErrorKind::from_provider_code(&error.code);
        tracing::debug!("Auth provider error {} mapped to {:?}", error.code, kind);
        Self {
            success: false,
            user: None,
            message: kind.user_message().to_string(),
            error: Some(kind),
        }
    }
}

type AuthCallback = Arc<dyn Fn(Option<&User>) + Send + Sync>;

#[derive(Debug, Clone)]
enum AuthState {
    Unresolved,
    Resolved(Option<User>),
}

/// Current-user state over an [`AuthProvider`].
///
/// Cloning is cheap; clones share state, callbacks and the event bus.
#[derive(Clone)]
pub struct AuthSession {
    provider: Arc<dyn AuthProvider>,
    state: Arc<RwLock<AuthState>>,
    callbacks: Arc<Mutex<Vec<AuthCallback>>>,
    events: EventBus<AuthEvent>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.current_user())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            state: Arc::new(RwLock::new(AuthState::Unresolved)),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            events: EventBus::new(),
        }
    }

    /// Resolves the persisted session. Only the first call asks the provider.
    pub async fn initialize(&self) -> Option<User> {
        if let AuthState::Resolved(user) = self.read_state() {
            return user;
        }

        let user = match self.provider.restore_session().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Could not restore auth session: {}", e);
                None
            }
        };
        self.transition(user.clone(), AuthEvent::Resolved(user.clone()));
        user
    }

    /// Registers a callback for sign-in state changes.
    ///
    /// If the session has already been resolved the callback runs
    /// immediately with the current user.
    pub fn on_auth_state_change<F>(&self, callback: F)
    where
        F: Fn(Option<&User>) + Send + Sync + 'static,
    {
        let callback: AuthCallback = Arc::new(callback);
        match self.callbacks.lock() {
            Ok(mut callbacks) => callbacks.push(callback.clone()),
            Err(_) => {
                tracing::error!("Auth callback list is poisoned; callback dropped");
                return;
            }
        }
        if let AuthState::Resolved(user) = self.read_state() {
            callback(user.as_ref());
        }
    }

    /// Subscribes to typed auth events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        match self.read_state() {
            AuthState::Resolved(user) => user,
            AuthState::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.read_state(), AuthState::Resolved(_))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult {
        let result = self.provider.sign_in(email, password).await;
        self.finish_sign_in(result, "Signed in")
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult {
        let result = self.provider.sign_up(email, password).await;
        self.finish_sign_in(result, "Account created")
    }

    pub async fn sign_in_with_provider(&self, provider: FederatedProvider) -> AuthResult {
        let result = self.provider.sign_in_federated(provider).await;
        self.finish_sign_in(result, "Signed in")
    }

    pub async fn sign_out(&self) -> AuthResult {
        match self.provider.sign_out().await {
            Ok(()) => {
                self.transition(None, AuthEvent::SignedOut);
                AuthResult::ok(None, "Signed out")
            }
            Err(e) => AuthResult::failed(&e),
        }
    }

    fn finish_sign_in(&self, result: Result<User, ProviderError>, message: &str) -> AuthResult {
        match result {
            Ok(user) => {
                self.transition(Some(user.clone()), AuthEvent::SignedIn(user.clone()));
                AuthResult::ok(Some(user), message)
            }
            Err(e) => AuthResult::failed(&e),
        }
    }

    fn transition(&self, user: Option<User>, event: AuthEvent) {
        match self.state.write() {
            Ok(mut state) => *state = AuthState::Resolved(user),
            Err(poisoned) => *poisoned.into_inner() = AuthState::Resolved(user),
        }

        let callbacks: Vec<AuthCallback> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let current = event.user().cloned();
        for callback in callbacks {
            callback(current.as_ref());
        }
        self.events.publish(event);
    }

    fn read_state(&self) -> AuthState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
