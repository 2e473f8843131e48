//! Authentication.
//!
//! [`AuthSession`] wraps an [`AuthProvider`] and is the only thing UI code
//! talks to. Every operation returns an [`AuthResult`] instead of an error:
//! provider error codes are mapped into the closed [`AuthErrorKind`] set
//! before they leave this module.
//!
//! # Session States
//!
//! 1. **Unresolved** - `initialize` has not run yet
//! 2. **Signed out** - resolved with no user
//! 3. **Signed in** - resolved with a user, restored at start or signed in
//!    during this session

mod error;
mod local;
mod provider;
mod session;

pub use error::AuthErrorKind;
pub use local::LocalAuthProvider;
pub use provider::{AuthProvider, FederatedProvider, ProviderError, User};
pub use session::{AuthEvent, AuthResult, AuthSession};
