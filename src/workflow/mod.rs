//! Request/notification workflow.
//!
//! Ties a book, the requests filed against it and the mailboxes of the two
//! parties together. Every operation runs its steps strictly in order:
//! logical checks first, then the critical writes, then best-effort steps
//! whose failures come back as [`Advisory`] entries.

use std::sync::Arc;

use bookloop_authz::{ensure_not_owner, ensure_owner, Action};
use bookloop_db::{
    server_timestamp, to_fields, CollectionPath, Document, DocumentStore, Fields, OrderBy,
    StoreError, Timestamp,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{ConflictKind, ServiceError, ServiceResult};
use crate::modules::auth::Principal;
use crate::modules::books::catalog::Catalog;
use crate::modules::books::models::{BookRequest, Decision, RequestStatus};
use crate::modules::notifications::mailbox::Mailbox;
use crate::modules::notifications::models::NewNotification;
use crate::outcome::{Advisory, Outcome, SideEffect};
use crate::utils::non_blank;

const REQUESTS: &str = "requests";

/// Ids of a freshly filed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedRequest {
    pub book_id: String,
    pub request_id: String,
    /// Id of the alert in the owner's mailbox.
    pub notification_id: String,
}

/// What an owner's decision changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub book_id: String,
    pub request_id: String,
    pub status: RequestStatus,
    /// Id of the notification delivered to the requester.
    pub notification_id: String,
}

/// Facts about the publisher and the request needed to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusContext {
    pub publisher_email: String,
    pub publisher_phone: Option<String>,
    pub requester_uid: String,
    pub book_title: String,
}

#[derive(Clone)]
pub struct Workflow {
    store: Arc<dyn DocumentStore>,
    catalog: Catalog,
    mailbox: Mailbox,
}

impl Workflow {
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Catalog, mailbox: Mailbox) -> Self {
        Self {
            store,
            catalog,
            mailbox,
        }
    }

    fn requests(&self, book_id: &str) -> CollectionPath {
        self.catalog.collection().sub(book_id, REQUESTS)
    }

    /// File a request for `book_id` on behalf of `actor` and alert the owner.
    ///
    /// The request and the alert are two separate writes. If the alert
    /// fails the request stays filed and the error is returned.
    pub async fn submit_request(
        &self,
        book_id: &str,
        actor: &Principal,
    ) -> ServiceResult<Outcome<SubmittedRequest>> {
        let book = self.catalog.require(book_id).await?;
        ensure_not_owner(&actor.uid, &book.owner_uid, Action::RequestBook)?;

        if let Some(latest) = self.latest_request_for_user(book_id, &actor.uid).await? {
            match latest.status {
                RequestStatus::Pending => {
                    return Err(ServiceError::Conflict(ConflictKind::AlreadyPending))
                }
                RequestStatus::Accepted => {
                    return Err(ServiceError::Conflict(ConflictKind::AlreadyAccepted))
                }
                RequestStatus::Rejected => {}
            }
        }

        let requester_name = actor.display_label().to_string();
        let fields = to_fields(&json!({
            "requesterUid": actor.uid,
            "requesterName": requester_name,
            "requesterEmail": actor.email,
            "requestedAt": server_timestamp(),
            "status": RequestStatus::Pending,
        }))?;
        let request_id = self.store.create(&self.requests(book_id), fields).await?;
        tracing::info!(book_id, request_id = %request_id, requester = %actor.uid, "request filed");

        let publisher_email = non_blank(Some(book.owner_email.as_str()))
            .or_else(|| non_blank(Some(book.owner_name.as_str())))
            .map(str::to_string);
        let alert = NewNotification {
            requester_uid: Some(actor.uid.clone()),
            requester_email: Some(actor.email.clone()),
            publisher_email,
            ..NewNotification::new(
                format!(
                    "New request for your book \"{}\" from {}",
                    book.title, requester_name
                ),
                RequestStatus::Pending,
                book_id,
            )
        };
        let delivered = self.mailbox.deliver(&book.owner_uid, alert).await?;

        Ok(delivered.map(|notification_id| SubmittedRequest {
            book_id: book_id.to_string(),
            request_id,
            notification_id,
        }))
    }

    /// Record the owner's decision on a pending request and notify the
    /// requester. A request that was already answered is a conflict.
    ///
    /// Ownership is not checked here; callers build `context` with
    /// [`Workflow::status_context`], which does.
    pub async fn set_request_status(
        &self,
        book_id: &str,
        request_id: &str,
        new_status: &str,
        context: &StatusContext,
    ) -> ServiceResult<Outcome<StatusChange>> {
        let decision: Decision = new_status.parse()?;
        let status = decision.status();
        let requests = self.requests(book_id);

        let current: BookRequest = self
            .store
            .get(&requests, request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Request not found"))?
            .decode()?;
        if current.status != RequestStatus::Pending {
            return Err(ServiceError::Conflict(ConflictKind::AlreadyAnswered));
        }

        let mut fields = Fields::new();
        fields.insert("status".to_string(), json!(status));
        self.store
            .update(&requests, request_id, fields)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => ServiceError::not_found("Request not found"),
                other => other.into(),
            })?;
        tracing::info!(book_id, request_id, status = status.as_str(), "request answered");

        let mut advisories = Vec::new();
        if decision == Decision::Accepted {
            if let Err(err) = self.catalog.set_availability(book_id, false).await {
                advisories.push(Advisory::record(
                    SideEffect::MarkUnavailable {
                        book_id: book_id.to_string(),
                    },
                    &err,
                ));
            }
        }

        let notice = NewNotification {
            request_id: Some(request_id.to_string()),
            publisher_email: Some(context.publisher_email.clone()),
            ..NewNotification::new(decision_message(decision, context), status, book_id)
        };
        let delivered = self.mailbox.deliver(&context.requester_uid, notice).await?;
        advisories.extend(delivered.advisories);

        Ok(Outcome::with_advisories(
            StatusChange {
                book_id: book_id.to_string(),
                request_id: request_id.to_string(),
                status,
                notification_id: delivered.value,
            },
            advisories,
        ))
    }

    /// Gather the context for answering `request_id`. Only the book's owner
    /// may answer.
    pub async fn status_context(
        &self,
        book_id: &str,
        request_id: &str,
        actor: &Principal,
    ) -> ServiceResult<StatusContext> {
        let book = self.catalog.require(book_id).await?;
        ensure_owner(&actor.uid, &book.owner_uid, Action::AnswerRequest)?;

        let request: BookRequest = self
            .store
            .get(&self.requests(book_id), request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Request not found"))?
            .decode()?;

        let publisher_phone = non_blank(Some(book.owner_phone.as_str())).map(str::to_string);
        Ok(StatusContext {
            publisher_email: actor.email.clone(),
            publisher_phone,
            requester_uid: request.requester_uid,
            book_title: book.title,
        })
    }

    /// The request of `user_uid` with the greatest `requestedAt`.
    ///
    /// An unresolved timestamp counts as the epoch. Among equal timestamps
    /// the entry listed last wins.
    pub async fn latest_request_for_user(
        &self,
        book_id: &str,
        user_uid: &str,
    ) -> ServiceResult<Option<BookRequest>> {
        if book_id.is_empty() || user_uid.is_empty() {
            return Ok(None);
        }

        let docs = self.store.list(&self.requests(book_id), None).await?;
        match latest_of(&docs, user_uid) {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Every request filed against `book_id`, newest first. Owner only.
    pub async fn requests_for_book(
        &self,
        actor: &Principal,
        book_id: &str,
    ) -> ServiceResult<Vec<BookRequest>> {
        let book = self.catalog.require(book_id).await?;
        ensure_owner(&actor.uid, &book.owner_uid, Action::ViewRequests)?;

        let docs = self
            .store
            .list(&self.requests(book_id), Some(&OrderBy::desc("requestedAt")))
            .await?;
        docs.iter()
            .map(|doc| doc.decode::<BookRequest>().map_err(ServiceError::from))
            .collect()
    }
}

/// Newest document filed by `user_uid`, by `requestedAt`. Unresolved or
/// missing timestamps read as the epoch and ties go to the later entry.
fn latest_of<'a>(docs: &'a [Document], user_uid: &str) -> Option<&'a Document> {
    let mut latest: Option<(Timestamp, &Document)> = None;
    for doc in docs {
        if doc.fields.get("requesterUid").and_then(Value::as_str) != Some(user_uid) {
            continue;
        }
        let at = doc.timestamp("requestedAt").unwrap_or(Timestamp::EPOCH);
        if latest.map_or(true, |(best, _)| at >= best) {
            latest = Some((at, doc));
        }
    }
    latest.map(|(_, doc)| doc)
}

fn decision_message(decision: Decision, context: &StatusContext) -> String {
    match decision {
        Decision::Accepted => {
            let contact = match context.publisher_phone.as_deref() {
                Some(phone) if !phone.is_empty() => {
                    format!("Contact: {} / Phone: {}", context.publisher_email, phone)
                }
                _ => format!("Contact: {}", context.publisher_email),
            };
            format!(
                "Your request for \"{}\" has been accepted by {}. {}",
                context.book_title, context.publisher_email, contact
            )
        }
        Decision::Rejected => format!(
            "Your request for \"{}\" has been rejected by the publisher",
            context.book_title
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(phone: Option<&str>) -> StatusContext {
        StatusContext {
            publisher_email: "owner@example.com".into(),
            publisher_phone: phone.map(Into::into),
            requester_uid: "reader".into(),
            book_title: "Dune".into(),
        }
    }

    #[test]
    fn accepted_message_includes_phone_when_present() {
        assert_eq!(
            decision_message(Decision::Accepted, &context(Some("555-0100"))),
            "Your request for \"Dune\" has been accepted by owner@example.com. \
             Contact: owner@example.com / Phone: 555-0100"
        );
        assert_eq!(
            decision_message(Decision::Accepted, &context(Some(""))),
            "Your request for \"Dune\" has been accepted by owner@example.com. \
             Contact: owner@example.com"
        );
    }

    fn filed(id: &str, requester: &str, requested_at: Value) -> Document {
        let mut fields = Fields::new();
        fields.insert("requesterUid".into(), json!(requester));
        fields.insert("requestedAt".into(), requested_at);
        fields.insert("status".into(), json!("pending"));
        Document {
            id: id.into(),
            fields,
        }
    }

    #[test]
    fn server_timestamp_placeholder_counts_as_epoch() {
        let docs = vec![
            filed("resolved", "reader", json!(1_000)),
            filed("placeholder", "reader", server_timestamp()),
            filed("other", "someone-else", json!(5_000)),
        ];
        assert_eq!(latest_of(&docs, "reader").map(|doc| doc.id.as_str()), Some("resolved"));

        let lone = vec![filed("placeholder", "reader", server_timestamp())];
        assert_eq!(
            latest_of(&lone, "reader").map(|doc| doc.id.as_str()),
            Some("placeholder")
        );
        assert!(latest_of(&lone, "nobody").is_none());
    }

    #[test]
    fn equal_timestamps_go_to_the_later_entry() {
        let docs = vec![
            filed("first", "reader", json!(7)),
            filed("second", "reader", json!(7)),
        ];
        assert_eq!(latest_of(&docs, "reader").map(|doc| doc.id.as_str()), Some("second"));
    }

    #[test]
    fn rejected_message_carries_no_contact() {
        let message = decision_message(Decision::Rejected, &context(Some("555-0100")));
        assert_eq!(message, "Your request for \"Dune\" has been rejected by the publisher");
        assert!(!message.contains("Contact"));
    }
}
