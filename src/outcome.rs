//! Results of operations with best-effort side effects.
//!
//! A workflow operation either fails outright or succeeds. When it succeeds,
//! some of its secondary steps (marking a book unavailable, pruning a
//! mailbox) may still have failed. Those failures are logged and returned as
//! [`Advisory`] entries next to the value instead of being dropped.

use std::fmt::Display;

use serde::Serialize;

/// A best-effort step of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SideEffect {
    MarkUnavailable { book_id: String },
    ListMailbox { recipient_uid: String },
    EvictNotification {
        recipient_uid: String,
        notification_id: String,
    },
}

/// A best-effort step that failed without failing its operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    #[serde(flatten)]
    pub effect: SideEffect,
    pub error: String,
}

impl Advisory {
    /// Log the failure and keep it for the caller.
    pub fn record(effect: SideEffect, error: &dyn Display) -> Self {
        tracing::warn!(?effect, %error, "best-effort step failed");
        Self {
            effect,
            error: error.to_string(),
        }
    }
}

/// Value of a successful operation plus the advisories it collected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub advisories: Vec<Advisory>,
}

impl<T> Outcome<T> {
    pub fn with_advisories(value: T, advisories: Vec<Advisory>) -> Self {
        Self { value, advisories }
    }

    /// Every best-effort step succeeded.
    pub fn is_clean(&self) -> bool {
        self.advisories.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            advisories: self.advisories,
        }
    }
}
