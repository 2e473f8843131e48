//! Closed set of authentication failures shown to users.

use serde::{Deserialize, Serialize};

/// Authentication failure categories surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthErrorKind {
    InvalidCredential,
    EmailInUse,
    WeakPassword,
    NetworkFailure,
    RateLimited,
    Unknown,
}

impl AuthErrorKind {
    /// Maps a provider error code into the closed set.
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "auth/invalid-credential"
            | "auth/invalid-login-credentials"
            | "auth/wrong-password"
            | "auth/user-not-found"
            | "auth/invalid-email"
            | "auth/user-disabled"
            | "auth/missing-password" => AuthErrorKind::InvalidCredential,
            "auth/email-already-in-use" | "auth/credential-already-in-use" => {
                AuthErrorKind::EmailInUse
            }
            "auth/weak-password" => AuthErrorKind::WeakPassword,
            "auth/network-request-failed" | "auth/timeout" => AuthErrorKind::NetworkFailure,
            "auth/too-many-requests" | "auth/quota-exceeded" => AuthErrorKind::RateLimited,
            _ => AuthErrorKind::Unknown,
        }
    }

    /// Message shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredential => "Invalid email or password.",
            AuthErrorKind::EmailInUse => "An account with this email already exists.",
            AuthErrorKind::WeakPassword => "Password should be at least 6 characters.",
            AuthErrorKind::NetworkFailure => {
                "Network error. Please check your connection and try again."
            }
            AuthErrorKind::RateLimited => "Too many attempts. Please try again later.",
            AuthErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_codes() {
        for code in [
            "auth/wrong-password",
            "auth/user-not-found",
            "auth/invalid-email",
            "auth/invalid-credential",
        ] {
            assert_eq!(
                AuthErrorKind::from_provider_code(code),
                AuthErrorKind::InvalidCredential
            );
        }
    }

    #[test]
    fn test_specific_codes() {
        assert_eq!(
            AuthErrorKind::from_provider_code("auth/email-already-in-use"),
            AuthErrorKind::EmailInUse
        );
        assert_eq!(
            AuthErrorKind::from_provider_code("auth/weak-password"),
            AuthErrorKind::WeakPassword
        );
        assert_eq!(
            AuthErrorKind::from_provider_code("auth/network-request-failed"),
            AuthErrorKind::NetworkFailure
        );
        assert_eq!(
            AuthErrorKind::from_provider_code("auth/too-many-requests"),
            AuthErrorKind::RateLimited
        );
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(
            AuthErrorKind::from_provider_code("auth/popup-closed-by-user"),
            AuthErrorKind::Unknown
        );
        assert_eq!(AuthErrorKind::from_provider_code(""), AuthErrorKind::Unknown);
    }

    #[test]
    fn test_every_kind_has_a_message() {
        for kind in [
            AuthErrorKind::InvalidCredential,
            AuthErrorKind::EmailInUse,
            AuthErrorKind::WeakPassword,
            AuthErrorKind::NetworkFailure,
            AuthErrorKind::RateLimited,
            AuthErrorKind::Unknown,
        ] {
            assert!(!kind.to_string().is_empty());
        }
    }
}
