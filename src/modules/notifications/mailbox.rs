use std::sync::Arc;

use bookloop_db::{server_timestamp, to_fields, CollectionPath, DocumentStore, Fields, OrderBy};
use serde_json::Value;

use super::models::{NewNotification, Notification};
use crate::error::{ServiceError, ServiceResult};
use crate::outcome::{Advisory, Outcome, SideEffect};

const NOTIFICATIONS: &str = "notifications";
const ITEMS: &str = "items";

/// Per-user notification mailboxes with bounded retention.
#[derive(Clone)]
pub struct Mailbox {
    store: Arc<dyn DocumentStore>,
    capacity: usize,
}

impl Mailbox {
    pub fn new(store: Arc<dyn DocumentStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    /// Collection holding the mailbox of `recipient_uid`.
    pub fn path(recipient_uid: &str) -> CollectionPath {
        CollectionPath::new(NOTIFICATIONS).sub(recipient_uid, ITEMS)
    }

    /// Insert a notification, then prune the mailbox.
    ///
    /// The insert is critical and its failure is returned as an error.
    /// Pruning failures are reported as advisories.
    pub async fn deliver(
        &self,
        recipient_uid: &str,
        notification: NewNotification,
    ) -> ServiceResult<Outcome<String>> {
        let mut fields = to_fields(&notification)?;
        fields.insert("createdAt".to_string(), server_timestamp());
        fields.insert("read".to_string(), Value::Bool(false));

        let id = self.store.create(&Self::path(recipient_uid), fields).await?;
        tracing::info!(
            recipient = recipient_uid,
            notification_id = %id,
            status = notification.status.as_str(),
            "notification delivered"
        );

        let advisories = self.prune(recipient_uid).await;
        Ok(Outcome::with_advisories(id, advisories))
    }

    /// Evict every entry past the newest `capacity` ones.
    ///
    /// Deletions run one after another; a failed deletion does not stop the
    /// rest.
    pub async fn prune(&self, recipient_uid: &str) -> Vec<Advisory> {
        let path = Self::path(recipient_uid);
        let docs = match self
            .store
            .list(&path, Some(&OrderBy::desc("createdAt")))
            .await
        {
            Ok(docs) => docs,
            Err(err) => {
                return vec![Advisory::record(
                    SideEffect::ListMailbox {
                        recipient_uid: recipient_uid.to_string(),
                    },
                    &err,
                )];
            }
        };

        let mut advisories = Vec::new();
        let mut evicted = 0usize;
        for doc in docs.iter().skip(self.capacity) {
            match self.store.delete(&path, &doc.id).await {
                Ok(()) => evicted += 1,
                Err(err) => advisories.push(Advisory::record(
                    SideEffect::EvictNotification {
                        recipient_uid: recipient_uid.to_string(),
                        notification_id: doc.id.clone(),
                    },
                    &err,
                )),
            }
        }
        if evicted > 0 {
            tracing::debug!(recipient = recipient_uid, evicted, "mailbox pruned");
        }
        advisories
    }

    /// The mailbox of `recipient_uid`, newest first.
    pub async fn list(&self, recipient_uid: &str) -> ServiceResult<Vec<Notification>> {
        let docs = self
            .store
            .list(&Self::path(recipient_uid), Some(&OrderBy::desc("createdAt")))
            .await?;
        docs.iter()
            .map(|doc| doc.decode::<Notification>().map_err(ServiceError::from))
            .collect()
    }

    pub async fn mark_read(&self, recipient_uid: &str, notification_id: &str) -> ServiceResult<()> {
        let path = Self::path(recipient_uid);
        if self.store.get(&path, notification_id).await?.is_none() {
            return Err(ServiceError::not_found("Notification not found"));
        }
        let mut fields = Fields::new();
        fields.insert("read".to_string(), Value::Bool(true));
        self.store.update(&path, notification_id, fields).await?;
        Ok(())
    }
}
