//! Identity provider contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    /// Name to show in status lines.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

/// Federated identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FederatedProvider {
    Google,
    Github,
}

impl std::fmt::Display for FederatedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FederatedProvider::Google => write!(f, "google"),
            FederatedProvider::Github => write!(f, "github"),
        }
    }
}

impl std::str::FromStr for FederatedProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(FederatedProvider::Google),
            "github" => Ok(FederatedProvider::Github),
            _ => Err(format!("Unknown provider '{}'. Valid: google, github", s)),
        }
    }
}

/// Raw provider failure with a provider-specific code such as `auth/wrong-password`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// An identity provider (email/password plus federated sign-in).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the user whose session survived from an earlier run, if any.
    async fn restore_session(&self) -> Result<Option<User>, ProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, ProviderError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, ProviderError>;

    async fn sign_in_federated(&self, provider: FederatedProvider) -> Result<User, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}
