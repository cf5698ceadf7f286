use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bookloop_kernel::settings::AuthSettings;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::identity::{
    FederatedCredential, IdentityError, IdentityProvider, Principal, Session, SignUp,
};

const FEDERATED_PROVIDERS: &[&str] = &["google"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Verification,
    PasswordReset,
}

/// An email the provider would have sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub kind: EmailKind,
    pub token: String,
}

struct PasswordDigest {
    salt: String,
    hash: String,
}

impl PasswordDigest {
    fn new(password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let hash = hash_password(&salt, password);
        Self { salt, hash }
    }

    fn matches(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.hash
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Account {
    principal: Principal,
    password: Option<PasswordDigest>,
    federated: Vec<(String, String)>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    uid_by_email: HashMap<String, String>,
    sessions: HashMap<String, String>,
    verifications: HashMap<String, String>,
    resets: HashMap<String, String>,
}

/// Identity provider kept in process memory, for local runs and tests.
///
/// Emails are not delivered; they are appended to an outbox that can be
/// inspected with [`MemoryIdentityProvider::outbox`].
pub struct MemoryIdentityProvider {
    settings: AuthSettings,
    state: RwLock<State>,
    outbox: Mutex<Vec<OutboundEmail>>,
}

impl MemoryIdentityProvider {
    pub fn new(settings: AuthSettings) -> Self {
        Self {
            settings,
            state: RwLock::new(State::default()),
            outbox: Mutex::new(Vec::new()),
        }
    }

    /// Emails dispatched so far, oldest first.
    pub fn outbox(&self) -> Vec<OutboundEmail> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, IdentityError> {
        self.state
            .read()
            .map_err(|_| IdentityError::Unavailable("account state lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, IdentityError> {
        self.state
            .write()
            .map_err(|_| IdentityError::Unavailable("account state lock poisoned".into()))
    }

    fn dispatch(&self, to: &str, kind: EmailKind, token: &str) -> Result<(), IdentityError> {
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| IdentityError::Unavailable("outbox lock poisoned".into()))?;
        outbox.push(OutboundEmail {
            to: to.to_string(),
            kind,
            token: token.to_string(),
        });
        tracing::info!(to, ?kind, "identity email dispatched");
        Ok(())
    }

    fn check_password_strength(&self, password: &str) -> Result<(), IdentityError> {
        let min = self.settings.min_password_length;
        if password.chars().count() < min {
            return Err(IdentityError::WeakPassword { min });
        }
        Ok(())
    }

    fn open_session(state: &mut State, principal: Principal) -> Session {
        let token = Uuid::new_v4().simple().to_string();
        state.sessions.insert(token.clone(), principal.uid.clone());
        Session { token, principal }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(&self, request: SignUp) -> Result<Session, IdentityError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(IdentityError::MissingField("name"));
        }
        let email = normalize_email(&request.email);
        if email.is_empty() {
            return Err(IdentityError::MissingField("email"));
        }
        if request.password.is_empty() {
            return Err(IdentityError::MissingField("password"));
        }
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }
        self.check_password_strength(&request.password)?;

        let verification_token = Uuid::new_v4().simple().to_string();
        let session = {
            let mut state = self.write()?;
            if state.uid_by_email.contains_key(&email) {
                return Err(IdentityError::EmailAlreadyInUse);
            }

            let principal = Principal {
                uid: Uuid::new_v4().simple().to_string(),
                display_name: Some(name.to_string()),
                email: email.clone(),
                email_verified: false,
            };
            state
                .uid_by_email
                .insert(email.clone(), principal.uid.clone());
            state
                .verifications
                .insert(verification_token.clone(), principal.uid.clone());
            state.accounts.insert(
                principal.uid.clone(),
                Account {
                    principal: principal.clone(),
                    password: Some(PasswordDigest::new(&request.password)),
                    federated: Vec::new(),
                },
            );
            Self::open_session(&mut state, principal)
        };

        self.dispatch(&email, EmailKind::Verification, &verification_token)?;
        tracing::info!(uid = %session.principal.uid, "account created");
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(IdentityError::InvalidCredential);
        }

        let mut state = self.write()?;
        let principal = {
            let account = state
                .uid_by_email
                .get(&email)
                .and_then(|uid| state.accounts.get(uid))
                .ok_or(IdentityError::InvalidCredential)?;
            let password_ok = account
                .password
                .as_ref()
                .is_some_and(|digest| digest.matches(password));
            if !password_ok {
                return Err(IdentityError::InvalidCredential);
            }
            if self.settings.require_email_verification && !account.principal.email_verified {
                return Err(IdentityError::EmailNotVerified);
            }
            account.principal.clone()
        };

        tracing::info!(uid = %principal.uid, "signed in");
        Ok(Self::open_session(&mut state, principal))
    }

    async fn sign_in_federated(
        &self,
        credential: FederatedCredential,
    ) -> Result<Session, IdentityError> {
        let provider = credential.provider.trim().to_lowercase();
        if !FEDERATED_PROVIDERS.contains(&provider.as_str()) {
            return Err(IdentityError::UnsupportedProvider(credential.provider));
        }
        if credential.subject.trim().is_empty() {
            return Err(IdentityError::MissingField("subject"));
        }
        let email = normalize_email(&credential.email);
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }
        let link = (provider, credential.subject);

        let mut state = self.write()?;
        let linked_uid = state
            .accounts
            .values()
            .find(|account| account.federated.contains(&link))
            .map(|account| account.principal.uid.clone());

        let uid = match linked_uid.or_else(|| state.uid_by_email.get(&email).cloned()) {
            Some(uid) => uid,
            None => {
                let principal = Principal {
                    uid: Uuid::new_v4().simple().to_string(),
                    display_name: credential.display_name.clone(),
                    email: email.clone(),
                    email_verified: true,
                };
                let uid = principal.uid.clone();
                state.uid_by_email.insert(email, uid.clone());
                state.accounts.insert(
                    uid.clone(),
                    Account {
                        principal,
                        password: None,
                        federated: Vec::new(),
                    },
                );
                tracing::info!(uid = %uid, provider = %link.0, "federated account created");
                uid
            }
        };

        let principal = {
            let account = state
                .accounts
                .get_mut(&uid)
                .ok_or_else(|| IdentityError::Unavailable("account index out of sync".into()))?;
            if !account.federated.contains(&link) {
                account.federated.push(link);
            }
            // The external provider vouches for the address.
            account.principal.email_verified = true;
            if account.principal.display_name.is_none() {
                account.principal.display_name = credential.display_name;
            }
            account.principal.clone()
        };

        Ok(Self::open_session(&mut state, principal))
    }

    async fn sign_out(&self, token: &str) -> Result<(), IdentityError> {
        let mut state = self.write()?;
        if let Some(uid) = state.sessions.remove(token) {
            tracing::info!(uid = %uid, "signed out");
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(IdentityError::MissingField("email"));
        }
        if !is_valid_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }

        let token = Uuid::new_v4().simple().to_string();
        let known = {
            let mut state = self.write()?;
            match state.uid_by_email.get(&email).cloned() {
                Some(uid) => {
                    state.resets.insert(token.clone(), uid);
                    true
                }
                None => false,
            }
        };

        if known {
            self.dispatch(&email, EmailKind::PasswordReset, &token)?;
        } else {
            tracing::debug!("password reset requested for unknown address");
        }
        Ok(())
    }

    async fn verify_email(&self, token: &str) -> Result<(), IdentityError> {
        let mut state = self.write()?;
        let uid = state
            .verifications
            .remove(token)
            .ok_or(IdentityError::InvalidActionCode)?;
        if let Some(account) = state.accounts.get_mut(&uid) {
            account.principal.email_verified = true;
        }
        tracing::info!(uid = %uid, "email verified");
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.check_password_strength(new_password)?;
        let mut state = self.write()?;
        let uid = state
            .resets
            .remove(token)
            .ok_or(IdentityError::InvalidActionCode)?;
        if let Some(account) = state.accounts.get_mut(&uid) {
            account.password = Some(PasswordDigest::new(new_password));
        }
        tracing::info!(uid = %uid, "password reset completed");
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<Option<Principal>, IdentityError> {
        let state = self.read()?;
        Ok(state
            .sessions
            .get(token)
            .and_then(|uid| state.accounts.get(uid))
            .map(|account| account.principal.clone()))
    }
}
