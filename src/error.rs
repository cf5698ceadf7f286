//! Error taxonomy shared by the catalog, the mailbox and the request workflow.

use bookloop_authz::Denied;
use bookloop_db::StoreError;
use bookloop_http::error::AppError;
use serde_json::json;
use thiserror::Error;

use crate::modules::auth::IdentityError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Why a write was refused as a duplicate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    #[error("You already requested this book. Please wait for the publisher to respond.")]
    AlreadyPending,
    #[error("Your request for this book has already been accepted.")]
    AlreadyAccepted,
    #[error("This request has already been answered.")]
    AlreadyAnswered,
    #[error("Email already in use")]
    EmailInUse,
}

impl ConflictKind {
    pub fn code(self) -> &'static str {
        match self {
            ConflictKind::AlreadyPending => "already_pending",
            ConflictKind::AlreadyAccepted => "already_accepted",
            ConflictKind::AlreadyAnswered => "already_answered",
            ConflictKind::EmailInUse => "email_in_use",
        }
    }
}

/// A backing service failed, as opposed to the caller doing something wrong.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("document store: {0}")]
    Store(#[from] StoreError),
    #[error("identity provider: {0}")]
    Identity(String),
}

/// Every error carries a message that can be shown to the user as is.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(ConflictKind),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    DependencyFailure(#[from] DependencyError),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True for failures of a backing service rather than of the caller.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, ServiceError::DependencyFailure(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => {
                ServiceError::NotFound("The requested item no longer exists".to_string())
            }
            other => ServiceError::DependencyFailure(DependencyError::Store(other)),
        }
    }
}

impl From<Denied> for ServiceError {
    fn from(denied: Denied) -> Self {
        ServiceError::Forbidden(denied.to_string())
    }
}

impl From<IdentityError> for ServiceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::EmailAlreadyInUse => ServiceError::Conflict(ConflictKind::EmailInUse),
            IdentityError::InvalidEmail
            | IdentityError::WeakPassword { .. }
            | IdentityError::MissingField(_)
            | IdentityError::UnsupportedProvider(_)
            | IdentityError::InvalidActionCode => ServiceError::InvalidArgument(err.to_string()),
            IdentityError::InvalidCredential
            | IdentityError::EmailNotVerified
            | IdentityError::Unauthenticated => ServiceError::Unauthenticated(err.to_string()),
            IdentityError::Unavailable(reason) => {
                ServiceError::DependencyFailure(DependencyError::Identity(reason))
            }
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unauthenticated(message) => AppError::unauthorized(message),
            ServiceError::NotFound(message) => AppError::not_found(message),
            ServiceError::Forbidden(message) => AppError::forbidden(message),
            ServiceError::Conflict(kind) => {
                AppError::conflict(vec![json!({ "reason": kind.code() })], kind.to_string())
            }
            ServiceError::InvalidArgument(message) => AppError::bad_request(message),
            ServiceError::DependencyFailure(source) => {
                AppError::dependency_failure(source.to_string())
            }
        }
    }
}
