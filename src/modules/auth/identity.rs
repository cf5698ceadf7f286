use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
}

impl Principal {
    /// Name shown to other users: the display name, else the email.
    pub fn display_label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}

/// A signed-in session handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub principal: Principal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Identity asserted by an external provider (e.g. an OAuth popup flow).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedCredential {
    pub provider: String,
    pub subject: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Weak password (min {min} chars)")]
    WeakPassword { min: usize },

    #[error("Email already in use")]
    EmailAlreadyInUse,

    #[error("Invalid email or password")]
    InvalidCredential,

    #[error("Please verify your email address before signing in")]
    EmailNotVerified,

    #[error("Fill all fields: {0} is required")]
    MissingField(&'static str),

    #[error("Sign-in provider '{0}' is not enabled")]
    UnsupportedProvider(String),

    #[error("This link is invalid or has already been used")]
    InvalidActionCode,

    #[error("You must be logged in")]
    Unauthenticated,

    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// External identity service.
///
/// Sessions are identified by opaque tokens; nothing here keeps an ambient
/// "current user". Callers resolve the principal once per call and pass it
/// on explicitly.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account, set its display name and dispatch a verification
    /// email.
    async fn sign_up(&self, request: SignUp) -> Result<Session, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError>;

    /// Sign in with a third-party identity, creating or linking the account.
    async fn sign_in_federated(
        &self,
        credential: FederatedCredential,
    ) -> Result<Session, IdentityError>;

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError>;

    /// Dispatch a password reset email. Unknown addresses succeed silently.
    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    /// Redeem the token from a verification email. Tokens are single use.
    async fn verify_email(&self, token: &str) -> Result<(), IdentityError>;

    /// Redeem the token from a password reset email and set a new password.
    async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Resolve a session token, `None` when it is unknown or signed out.
    async fn current_user(&self, token: &str) -> Result<Option<Principal>, IdentityError>;

    /// Gate for protected operations.
    async fn require_user(&self, token: Option<&str>) -> Result<Principal, IdentityError> {
        let Some(token) = token else {
            return Err(IdentityError::Unauthenticated);
        };
        self.current_user(token)
            .await?
            .ok_or(IdentityError::Unauthenticated)
    }
}
