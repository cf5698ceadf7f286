use bookloop_db::Timestamp;
use serde::{Deserialize, Serialize};

use crate::modules::books::models::RequestStatus;

/// An entry of a user's mailbox, stored under `notifications/{uid}/items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub message: String,
    /// Status of the request that triggered the notification.
    pub status: RequestStatus,
    pub book_id: String,
    /// Absent on new-request alerts.
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub requester_uid: Option<String>,
    #[serde(default)]
    pub requester_email: Option<String>,
    #[serde(default)]
    pub publisher_email: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub read: bool,
}

/// Notification content; the mailbox adds `createdAt` and `read`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub message: String,
    pub status: RequestStatus,
    pub book_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher_email: Option<String>,
}

impl NewNotification {
    pub fn new(message: impl Into<String>, status: RequestStatus, book_id: &str) -> Self {
        Self {
            message: message.into(),
            status,
            book_id: book_id.to_string(),
            request_id: None,
            requester_uid: None,
            requester_email: None,
            publisher_email: None,
        }
    }
}
