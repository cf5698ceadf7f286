use std::sync::Arc;

use bookloop_app::error::{ConflictKind, ServiceError};
use bookloop_app::modules::auth::{MemoryIdentityProvider, Principal};
use bookloop_app::modules::books::models::{Book, NewBook, RequestStatus};
use bookloop_app::modules::notifications::mailbox::Mailbox;
use bookloop_app::outcome::SideEffect;
use bookloop_app::workflow::StatusContext;
use bookloop_app::Services;
use bookloop_db::{
    server_timestamp, CollectionPath, DocumentStore, Fields, MemoryStore, StoreOp,
};
use bookloop_kernel::settings::Settings;
use serde_json::json;

struct Harness {
    store: Arc<MemoryStore>,
    services: Services,
}

impl Harness {
    fn new() -> Self {
        let settings = Settings::default();
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(MemoryIdentityProvider::new(settings.auth.clone()));
        let services = Services::new(store.clone(), identity, &settings);
        Self { store, services }
    }

    async fn publish(&self, owner: &Principal, title: &str, phone: &str) -> Book {
        self.services
            .catalog
            .publish(
                owner,
                NewBook {
                    title: Some(title.into()),
                    author: Some("Author".into()),
                    price: Some(10.0),
                    owner_phone: Some(phone.into()),
                    ..NewBook::default()
                },
            )
            .await
            .unwrap()
    }

    async fn context(&self, book: &Book, request_id: &str, owner: &Principal) -> StatusContext {
        self.services
            .workflow
            .status_context(&book.id, request_id, owner)
            .await
            .unwrap()
    }

    fn requests(&self, book_id: &str) -> CollectionPath {
        CollectionPath::new("books").sub(book_id, "requests")
    }
}

fn user(uid: &str, name: Option<&str>) -> Principal {
    Principal {
        uid: uid.into(),
        display_name: name.map(Into::into),
        email: format!("{uid}@example.com"),
        email_verified: true,
    }
}

#[tokio::test]
async fn first_request_files_one_request_and_one_alert() {
    let h = Harness::new();
    let owner = user("owner", Some("Olive"));
    let reader = user("reader", Some("Rae"));
    let book = h.publish(&owner, "Dune", "").await;

    let outcome = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap();
    assert!(outcome.is_clean());

    let requests = h.services.workflow.requests_for_book(&owner, &book.id).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, outcome.value.request_id);
    assert_eq!(requests[0].status, RequestStatus::Pending);
    assert_eq!(requests[0].requester_name, "Rae");
    assert!(requests[0].requested_at.is_some());

    let inbox = h.services.mailbox.list("owner").await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].message, "New request for your book \"Dune\" from Rae");
    assert_eq!(inbox[0].status, RequestStatus::Pending);
    assert_eq!(inbox[0].request_id, None);
    assert_eq!(inbox[0].requester_uid.as_deref(), Some("reader"));
    assert_eq!(inbox[0].publisher_email.as_deref(), Some("owner@example.com"));
    assert!(!inbox[0].read);
}

#[tokio::test]
async fn requester_without_display_name_is_named_by_email() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;

    h.services
        .workflow
        .submit_request(&book.id, &user("anon", None))
        .await
        .unwrap();

    let inbox = h.services.mailbox.list("owner").await.unwrap();
    assert_eq!(
        inbox[0].message,
        "New request for your book \"Dune\" from anon@example.com"
    );
}

#[tokio::test]
async fn second_pending_request_conflicts() {
    let h = Harness::new();
    let owner = user("owner", None);
    let reader = user("reader", None);
    let book = h.publish(&owner, "Dune", "").await;

    h.services.workflow.submit_request(&book.id, &reader).await.unwrap();
    let err = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Conflict(ConflictKind::AlreadyPending)));
    assert_eq!(
        err.to_string(),
        "You already requested this book. Please wait for the publisher to respond."
    );
    let requests = h.services.workflow.requests_for_book(&owner, &book.id).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(h.services.mailbox.list("owner").await.unwrap().len(), 1);
}

#[tokio::test]
async fn request_after_acceptance_conflicts() {
    let h = Harness::new();
    let owner = user("owner", None);
    let reader = user("reader", None);
    let book = h.publish(&owner, "Dune", "").await;

    let submitted = h.services.workflow.submit_request(&book.id, &reader).await.unwrap();
    let rid = submitted.value.request_id;
    let ctx = h.context(&book, &rid, &owner).await;
    h.services
        .workflow
        .set_request_status(&book.id, &rid, "accepted", &ctx)
        .await
        .unwrap();

    let err = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(ConflictKind::AlreadyAccepted)));
}

#[tokio::test]
async fn rejected_requester_may_ask_again() {
    let h = Harness::new();
    let owner = user("owner", None);
    let reader = user("reader", None);
    let book = h.publish(&owner, "Dune", "").await;

    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;
    h.services
        .workflow
        .set_request_status(&book.id, &rid, "rejected", &ctx)
        .await
        .unwrap();

    let again = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap();
    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, again.value.request_id);
    assert_eq!(latest.status, RequestStatus::Pending);
}

#[tokio::test]
async fn owner_cannot_request_own_book() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;

    let err = h
        .services
        .workflow
        .submit_request(&book.id, &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(ref m) if m == "You can't request your own book."));
    assert!(h.services.mailbox.list("owner").await.unwrap().is_empty());
}

#[tokio::test]
async fn requesting_a_missing_book_is_not_found() {
    let h = Harness::new();
    let err = h
        .services
        .workflow
        .submit_request("nope", &user("reader", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn accepting_marks_unavailable_and_shares_contact() {
    let h = Harness::new();
    let owner = user("owner", None);
    let reader = user("reader", None);
    let book = h.publish(&owner, "Dune", "555-0100").await;

    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;
    let outcome = h
        .services
        .workflow
        .set_request_status(&book.id, &rid, "accepted", &ctx)
        .await
        .unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.value.status, RequestStatus::Accepted);

    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, RequestStatus::Accepted);
    assert!(!h.services.catalog.require(&book.id).await.unwrap().available);

    let inbox = h.services.mailbox.list("reader").await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(
        inbox[0].message,
        "Your request for \"Dune\" has been accepted by owner@example.com. \
         Contact: owner@example.com / Phone: 555-0100"
    );
    assert_eq!(inbox[0].status, RequestStatus::Accepted);
    assert_eq!(inbox[0].request_id.as_deref(), Some(rid.as_str()));
}

#[tokio::test]
async fn accepting_without_phone_omits_it() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &user("reader", None))
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;
    h.services
        .workflow
        .set_request_status(&book.id, &rid, "accepted", &ctx)
        .await
        .unwrap();

    let inbox = h.services.mailbox.list("reader").await.unwrap();
    assert!(inbox[0].message.ends_with("Contact: owner@example.com"));
    assert!(!inbox[0].message.contains("Phone"));
}

#[tokio::test]
async fn rejecting_keeps_the_book_available() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "555-0100").await;
    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &user("reader", None))
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;
    h.services
        .workflow
        .set_request_status(&book.id, &rid, "rejected", &ctx)
        .await
        .unwrap();

    assert!(h.services.catalog.require(&book.id).await.unwrap().available);
    let inbox = h.services.mailbox.list("reader").await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(
        inbox[0].message,
        "Your request for \"Dune\" has been rejected by the publisher"
    );
    assert!(!inbox[0].message.contains("Contact"));
}

#[tokio::test]
async fn unknown_status_changes_nothing() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &user("reader", None))
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;

    for status in ["maybe", "pending", ""] {
        let err = h
            .services
            .workflow
            .set_request_status(&book.id, &rid, status, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, RequestStatus::Pending);
    assert!(h.services.catalog.require(&book.id).await.unwrap().available);
    assert!(h.services.mailbox.list("reader").await.unwrap().is_empty());
}

#[tokio::test]
async fn answering_a_missing_request_is_not_found() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;

    let err = h
        .services
        .workflow
        .status_context(&book.id, "missing", &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(ref m) if m == "Request not found"));

    let ctx = StatusContext {
        publisher_email: "owner@example.com".into(),
        publisher_phone: None,
        requester_uid: "reader".into(),
        book_title: "Dune".into(),
    };
    let err = h
        .services
        .workflow
        .set_request_status(&book.id, "missing", "accepted", &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert!(h.services.catalog.require(&book.id).await.unwrap().available);
}

#[tokio::test]
async fn answered_request_cannot_be_answered_again() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &user("reader", None))
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;
    h.services
        .workflow
        .set_request_status(&book.id, &rid, "accepted", &ctx)
        .await
        .unwrap();

    for status in ["rejected", "accepted"] {
        let err = h
            .services
            .workflow
            .set_request_status(&book.id, &rid, status, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ConflictKind::AlreadyAnswered)));
    }

    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, RequestStatus::Accepted);
    assert!(!h.services.catalog.require(&book.id).await.unwrap().available);
    assert_eq!(h.services.mailbox.list("reader").await.unwrap().len(), 1);
}

#[tokio::test]
async fn only_the_owner_builds_a_status_context() {
    let h = Harness::new();
    let owner = user("owner", None);
    let reader = user("reader", None);
    let book = h.publish(&owner, "Dune", "").await;
    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap()
        .value
        .request_id;

    let err = h
        .services
        .workflow
        .status_context(&book.id, &rid, &reader)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = h
        .services
        .workflow
        .requests_for_book(&reader, &book.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn mailbox_keeps_the_newest_twenty() {
    let h = Harness::new();
    let owner = user("owner", None);
    let mut titles = Vec::new();
    for n in 0..25 {
        let title = format!("Book {n}");
        let book = h.publish(&owner, &title, "").await;
        h.services
            .workflow
            .submit_request(&book.id, &user("reader", None))
            .await
            .unwrap();
        titles.push(title);
    }

    let inbox = h.services.mailbox.list("owner").await.unwrap();
    assert_eq!(inbox.len(), 20);
    let expected: Vec<String> = titles
        .iter()
        .rev()
        .take(20)
        .map(|t| format!("New request for your book \"{t}\" from reader@example.com"))
        .collect();
    let messages: Vec<String> = inbox.into_iter().map(|n| n.message).collect();
    assert_eq!(messages, expected);
}

#[tokio::test]
async fn later_request_wins_latest_lookup() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let path = h.requests(&book.id);

    let seed = |at: i64, status: &str| {
        let mut fields = Fields::new();
        fields.insert("requesterUid".into(), json!("reader"));
        fields.insert("requestedAt".into(), json!(at));
        fields.insert("status".into(), json!(status));
        fields
    };
    let newer = h.store.create(&path, seed(2_000, "pending")).await.unwrap();
    h.store.create(&path, seed(1_000, "rejected")).await.unwrap();

    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, newer);
}

#[tokio::test]
async fn equal_timestamps_pick_the_later_listed_entry() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let path = h.requests(&book.id);

    let seed = |status: &str| {
        let mut fields = Fields::new();
        fields.insert("requesterUid".into(), json!("reader"));
        fields.insert("requestedAt".into(), json!(5_000));
        fields.insert("status".into(), json!(status));
        fields
    };
    h.store.create(&path, seed("rejected")).await.unwrap();
    let second = h.store.create(&path, seed("pending")).await.unwrap();

    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, second);
}

#[tokio::test]
async fn latest_lookup_ignores_other_users_and_blank_ids() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    h.services
        .workflow
        .submit_request(&book.id, &user("other", None))
        .await
        .unwrap();

    let workflow = &h.services.workflow;
    assert!(workflow.latest_request_for_user(&book.id, "reader").await.unwrap().is_none());
    assert!(workflow.latest_request_for_user(&book.id, "").await.unwrap().is_none());
    assert!(workflow.latest_request_for_user("", "other").await.unwrap().is_none());
}

#[tokio::test]
async fn availability_failure_is_reported_not_fatal() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &user("reader", None))
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;

    h.store.fail(StoreOp::Update, format!("books/{}", book.id));
    let outcome = h
        .services
        .workflow
        .set_request_status(&book.id, &rid, "accepted", &ctx)
        .await
        .unwrap();

    assert_eq!(outcome.advisories.len(), 1);
    assert_eq!(
        outcome.advisories[0].effect,
        SideEffect::MarkUnavailable {
            book_id: book.id.clone()
        }
    );
    h.store.clear_failures();
    assert!(h.services.catalog.require(&book.id).await.unwrap().available);
    assert_eq!(h.services.mailbox.list("reader").await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_eviction_does_not_block_the_others() {
    let h = Harness::new();
    let owner = user("owner", None);
    for n in 0..20 {
        let book = h.publish(&owner, &format!("Book {n}"), "").await;
        h.services
            .workflow
            .submit_request(&book.id, &user("reader", None))
            .await
            .unwrap();
    }
    let oldest = h.services.mailbox.list("owner").await.unwrap();
    let doomed: Vec<String> = oldest.iter().rev().take(2).map(|n| n.id.clone()).collect();

    let inbox = Mailbox::path("owner");
    h.store.fail(StoreOp::Delete, inbox.doc_path(&doomed[0]));

    for n in 20..22 {
        let book = h.publish(&owner, &format!("Book {n}"), "").await;
        let outcome = h
            .services
            .workflow
            .submit_request(&book.id, &user("reader", None))
            .await
            .unwrap();
        assert!(!outcome.is_clean());
        assert!(outcome.advisories.iter().all(|a| matches!(
            &a.effect,
            SideEffect::EvictNotification { notification_id, .. } if notification_id == &doomed[0]
        )));
    }

    let remaining = h.services.mailbox.list("owner").await.unwrap();
    assert_eq!(remaining.len(), 21);
    assert!(remaining.iter().any(|n| n.id == doomed[0]));
    assert!(!remaining.iter().any(|n| n.id == doomed[1]));

    h.store.clear_failures();
    let advisories = h.services.mailbox.prune("owner").await;
    assert!(advisories.is_empty());
    assert_eq!(h.services.mailbox.list("owner").await.unwrap().len(), 20);
}

#[tokio::test]
async fn failed_alert_leaves_the_request_filed() {
    let h = Harness::new();
    let owner = user("owner", None);
    let reader = user("reader", None);
    let book = h.publish(&owner, "Dune", "").await;

    h.store
        .fail(StoreOp::Create, Mailbox::path("owner").as_str());
    let err = h
        .services
        .workflow
        .submit_request(&book.id, &reader)
        .await
        .unwrap_err();
    assert!(err.is_dependency_failure());

    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap();
    assert_eq!(latest.map(|r| r.status), Some(RequestStatus::Pending));
}

#[tokio::test]
async fn failed_status_write_propagates() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let rid = h
        .services
        .workflow
        .submit_request(&book.id, &user("reader", None))
        .await
        .unwrap()
        .value
        .request_id;
    let ctx = h.context(&book, &rid, &owner).await;

    h.store.fail(StoreOp::Update, h.requests(&book.id).doc_path(&rid));
    let err = h
        .services
        .workflow
        .set_request_status(&book.id, &rid, "accepted", &ctx)
        .await
        .unwrap_err();
    assert!(err.is_dependency_failure());
    assert!(h.services.catalog.require(&book.id).await.unwrap().available);
    assert!(h.services.mailbox.list("reader").await.unwrap().is_empty());
}

#[tokio::test]
async fn unresolved_timestamps_lose_to_resolved_ones() {
    let h = Harness::new();
    let owner = user("owner", None);
    let book = h.publish(&owner, "Dune", "").await;
    let path = h.requests(&book.id);

    let mut resolved = Fields::new();
    resolved.insert("requesterUid".into(), json!("reader"));
    resolved.insert("requestedAt".into(), server_timestamp());
    resolved.insert("status".into(), json!("rejected"));
    let resolved_id = h.store.create(&path, resolved).await.unwrap();

    let mut unresolved = Fields::new();
    unresolved.insert("requesterUid".into(), json!("reader"));
    unresolved.insert("requestedAt".into(), serde_json::Value::Null);
    unresolved.insert("status".into(), json!("pending"));
    h.store.create(&path, unresolved).await.unwrap();

    let latest = h
        .services
        .workflow
        .latest_request_for_user(&book.id, "reader")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, resolved_id);
}

#[tokio::test]
async fn data_structures_walkthrough() {
    let h = Harness::new();
    let alice = user("alice", Some("Alice"));
    let bob = user("bob", Some("Bob"));
    let carol = user("carol", Some("Carol"));
    let book = h
        .services
        .catalog
        .publish(
            &alice,
            NewBook {
                title: Some("Data Structures".into()),
                author: Some("Author".into()),
                is_free: true,
                owner_phone: Some("555-0100".into()),
                ..NewBook::default()
            },
        )
        .await
        .unwrap();
    assert!(book.is_free);
    assert_eq!(book.price, 0.0);

    let submitted = h.services.workflow.submit_request(&book.id, &bob).await.unwrap();
    let alice_inbox = h.services.mailbox.list("alice").await.unwrap();
    assert_eq!(alice_inbox.len(), 1);
    assert_eq!(
        alice_inbox[0].message,
        "New request for your book \"Data Structures\" from Bob"
    );

    assert!(matches!(
        h.services.workflow.submit_request(&book.id, &bob).await,
        Err(ServiceError::Conflict(ConflictKind::AlreadyPending))
    ));
    assert_eq!(h.services.mailbox.list("alice").await.unwrap().len(), 1);

    let rid = submitted.value.request_id;
    let ctx = h.context(&book, &rid, &alice).await;
    h.services
        .workflow
        .set_request_status(&book.id, &rid, "accepted", &ctx)
        .await
        .unwrap();

    let book_now = h.services.catalog.require(&book.id).await.unwrap();
    assert!(!book_now.available);
    let bob_inbox = h.services.mailbox.list("bob").await.unwrap();
    assert_eq!(bob_inbox.len(), 1);
    assert!(bob_inbox[0].message.contains("Contact: alice@example.com / Phone: 555-0100"));

    assert!(matches!(
        h.services.workflow.submit_request(&book.id, &bob).await,
        Err(ServiceError::Conflict(ConflictKind::AlreadyAccepted))
    ));

    // Availability is not checked on submit.
    h.services.workflow.submit_request(&book.id, &carol).await.unwrap();
    assert_eq!(h.services.mailbox.list("alice").await.unwrap().len(), 2);
    let requests = h.services.workflow.requests_for_book(&alice, &book.id).await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].requester_uid, "carol");
    assert_eq!(requests[0].status, RequestStatus::Pending);
}
