//! Ownership guards.
//!
//! A book listing belongs to the user who published it. Some actions are
//! reserved to the owner, one (requesting the book) is reserved to everybody
//! else.

use thiserror::Error;

/// Actions gated on book ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DeleteBook,
    ChangeAvailability,
    ViewRequests,
    AnswerRequest,
    RequestBook,
}

impl Action {
    fn denial_message(self) -> &'static str {
        match self {
            Action::DeleteBook => "You do not have permission to delete this book",
            Action::ChangeAvailability => "Only the owner can change this book's availability",
            Action::ViewRequests => "Only the owner can view requests for this book",
            Action::AnswerRequest => "Only the owner can answer requests for this book",
            Action::RequestBook => "You can't request your own book.",
        }
    }
}

/// The actor may not perform the action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", .action.denial_message())]
pub struct Denied {
    pub action: Action,
}

/// Allow `action` only when `actor_uid` owns the resource.
pub fn ensure_owner(actor_uid: &str, owner_uid: &str, action: Action) -> Result<(), Denied> {
    if actor_uid == owner_uid {
        Ok(())
    } else {
        tracing::debug!(actor = actor_uid, owner = owner_uid, ?action, "ownership required");
        Err(Denied { action })
    }
}

/// Allow `action` only when `actor_uid` does not own the resource.
pub fn ensure_not_owner(actor_uid: &str, owner_uid: &str, action: Action) -> Result<(), Denied> {
    if actor_uid == owner_uid {
        tracing::debug!(actor = actor_uid, ?action, "owner may not perform action");
        Err(Denied { action })
    } else {
        Ok(())
    }
}
