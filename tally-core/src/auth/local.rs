//! Identity provider backed by local stores.
//!
//! Accounts live in one store (which may be shared between devices, e.g. a
//! synced folder) and the device's signed-in session in another. Error codes
//! follow the `auth/<reason>` convention so they map through
//! [`AuthErrorKind::from_provider_code`](super::AuthErrorKind::from_provider_code).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::provider::{AuthProvider, FederatedProvider, ProviderError, User};
use crate::store::LocalStore;

/// Store key for registered accounts.
pub const ACCOUNTS_KEY: &str = "auth.accounts";
/// Store key for linked federated identities.
pub const FEDERATED_KEY: &str = "auth.federated";
/// Store key for the device's current session.
pub const SESSION_KEY: &str = "auth.session";

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;
/// Consecutive failed sign-ins before an email is locked out for the process.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    uid: String,
    email: String,
    salt: String,
    password_hash: String,
}

/// Email/password provider persisted in local stores.
#[derive(Debug)]
pub struct LocalAuthProvider {
    accounts: LocalStore,
    session: LocalStore,
    failures: Mutex<HashMap<String, u32>>,
    offline: AtomicBool,
}

impl LocalAuthProvider {
    pub fn new(accounts: LocalStore, session: LocalStore) -> Self {
        Self {
            accounts,
            session,
            failures: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulates losing the connection to the provider.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Links a federated identity so `sign_in_federated` can resolve it.
    pub fn link_federated(&self, provider: FederatedProvider, user: User) -> Result<(), ProviderError> {
        let mut linked: BTreeMap<String, User> = self.accounts.get(FEDERATED_KEY);
        linked.insert(provider.to_string(), user);
        self.accounts
            .set(FEDERATED_KEY, &linked)
            .map_err(internal_error)
    }

    fn check_online(&self) -> Result<(), ProviderError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::new(
                "auth/network-request-failed",
                "Provider is unreachable",
            ));
        }
        Ok(())
    }

    fn load_accounts(&self) -> BTreeMap<String, Account> {
        self.accounts.get(ACCOUNTS_KEY)
    }

    fn start_session(&self, user: &User) -> Result<(), ProviderError> {
        self.session
            .set(SESSION_KEY, &Some(user))
            .map_err(internal_error)
    }

    fn failure_count(&self, email: &str) -> u32 {
        self.failures
            .lock()
            .map(|f| f.get(email).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn record_failure(&self, email: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            *failures.entry(email.to_string()).or_insert(0) += 1;
        }
    }

    fn clear_failures(&self, email: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(email);
        }
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn restore_session(&self) -> Result<Option<User>, ProviderError> {
        Ok(self.session.get::<Option<User>>(SESSION_KEY))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, ProviderError> {
        self.check_online()?;
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(ProviderError::new("auth/missing-password", "Password is required"));
        }
        if self.failure_count(&email) >= MAX_FAILED_ATTEMPTS {
            return Err(ProviderError::new(
                "auth/too-many-requests",
                "Too many failed attempts",
            ));
        }

        let accounts = self.load_accounts();
        let account = match accounts.get(&email) {
            Some(account) => account,
            None => {
                self.record_failure(&email);
                return Err(ProviderError::new("auth/user-not-found", "No such account"));
            }
        };

        if hash_password(&account.salt, password) != account.password_hash {
            self.record_failure(&email);
            return Err(ProviderError::new("auth/wrong-password", "Wrong password"));
        }

        self.clear_failures(&email);
        let user = account_user(account);
        self.start_session(&user)?;
        tracing::info!("Signed in {}", user.uid);
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, ProviderError> {
        self.check_online()?;
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::new("auth/weak-password", "Password is too short"));
        }

        let mut accounts = self.load_accounts();
        if accounts.contains_key(&email) {
            return Err(ProviderError::new(
                "auth/email-already-in-use",
                "Email is already registered",
            ));
        }

        let salt = Uuid::new_v4().simple().to_string();
        let account = Account {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.clone(),
            password_hash: hash_password(&salt, password),
            salt,
        };
        let user = account_user(&account);
        accounts.insert(email, account);
        self.accounts
            .set(ACCOUNTS_KEY, &accounts)
            .map_err(internal_error)?;

        self.start_session(&user)?;
        tracing::info!("Created account {}", user.uid);
        Ok(user)
    }

    async fn sign_in_federated(&self, provider: FederatedProvider) -> Result<User, ProviderError> {
        self.check_online()?;
        let linked: BTreeMap<String, User> = self.accounts.get(FEDERATED_KEY);
        let user = linked.get(&provider.to_string()).cloned().ok_or_else(|| {
            ProviderError::new(
                "auth/operation-not-allowed",
                format!("{} sign-in is not enabled", provider),
            )
        })?;
        self.start_session(&user)?;
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.session
            .set(SESSION_KEY, &None::<User>)
            .map_err(internal_error)
    }
}

fn account_user(account: &Account) -> User {
    User {
        uid: account.uid.clone(),
        email: Some(account.email.clone()),
        display_name: None,
    }
}

fn normalize_email(email: &str) -> Result<String, ProviderError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(ProviderError::new("auth/invalid-email", "Email is badly formatted"));
    }
    Ok(email)
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn internal_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::new("auth/internal-error", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LocalAuthProvider {
        LocalAuthProvider::new(LocalStore::in_memory(), LocalStore::in_memory())
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let provider = provider();
        let created = provider.sign_up("Ana@Example.com", "secret1").await.unwrap();
        assert_eq!(created.email.as_deref(), Some("ana@example.com"));

        let signed_in = provider.sign_in("ana@example.com", "secret1").await.unwrap();
        assert_eq!(signed_in.uid, created.uid);
    }

    #[tokio::test]
    async fn test_session_is_restored() {
        let session = LocalStore::in_memory();
        let provider = LocalAuthProvider::new(LocalStore::in_memory(), session.clone());
        assert!(provider.restore_session().await.unwrap().is_none());

        let user = provider.sign_up("a@b.io", "secret1").await.unwrap();
        assert_eq!(provider.restore_session().await.unwrap(), Some(user));

        provider.sign_out().await.unwrap();
        assert!(provider.restore_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_errors() {
        let provider = provider();
        assert_eq!(
            provider.sign_up("not-an-email", "secret1").await.unwrap_err().code,
            "auth/invalid-email"
        );
        assert_eq!(
            provider.sign_up("a@b.io", "123").await.unwrap_err().code,
            "auth/weak-password"
        );
        provider.sign_up("a@b.io", "secret1").await.unwrap();
        assert_eq!(
            provider.sign_up("a@b.io", "secret2").await.unwrap_err().code,
            "auth/email-already-in-use"
        );
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let provider = provider();
        provider.sign_up("a@b.io", "secret1").await.unwrap();

        assert_eq!(
            provider.sign_in("a@b.io", "nope").await.unwrap_err().code,
            "auth/wrong-password"
        );
        assert_eq!(
            provider.sign_in("x@b.io", "secret1").await.unwrap_err().code,
            "auth/user-not-found"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_after_repeated_failures() {
        let provider = provider();
        provider.sign_up("a@b.io", "secret1").await.unwrap();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            provider.sign_in("a@b.io", "wrong").await.unwrap_err();
        }

        let err = provider.sign_in("a@b.io", "secret1").await.unwrap_err();
        assert_eq!(err.code, "auth/too-many-requests");
    }

    #[tokio::test]
    async fn test_offline_reports_network_failure() {
        let provider = provider();
        provider.set_offline(true);
        let err = provider.sign_up("a@b.io", "secret1").await.unwrap_err();
        assert_eq!(err.code, "auth/network-request-failed");
    }

    #[tokio::test]
    async fn test_federated_requires_link() {
        let provider = provider();
        let err = provider
            .sign_in_federated(FederatedProvider::Google)
            .await
            .unwrap_err();
        assert_eq!(err.code, "auth/operation-not-allowed");

        let user = User {
            uid: "g-1".into(),
            email: Some("g@b.io".into()),
            display_name: Some("Gina".into()),
        };
        provider
            .link_federated(FederatedProvider::Google, user.clone())
            .unwrap();
        assert_eq!(
            provider
                .sign_in_federated(FederatedProvider::Google)
                .await
                .unwrap(),
            user
        );
    }

    #[test]
    fn test_hash_depends_on_salt() {
        assert_ne!(hash_password("a", "pw"), hash_password("b", "pw"));
        assert_eq!(hash_password("a", "pw").len(), 64);
    }
}
