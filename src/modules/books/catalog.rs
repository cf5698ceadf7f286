use std::sync::Arc;

use bookloop_authz::{ensure_owner, Action};
use bookloop_db::{server_timestamp, to_fields, CollectionPath, DocumentStore, Fields, OrderBy};
use serde_json::{json, Value};

use super::models::{Book, NewBook};
use crate::error::{ServiceError, ServiceResult};
use crate::modules::auth::Principal;
use crate::utils::non_blank;

pub const BOOKS: &str = "books";

/// Book listings in the `books` collection.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn DocumentStore>,
    books: CollectionPath,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            books: CollectionPath::new(BOOKS),
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.books
    }

    /// Publish a listing owned by `owner`.
    pub async fn publish(&self, owner: &Principal, book: NewBook) -> ServiceResult<Book> {
        let fields = listing_fields(owner, book)?;
        let id = self.store.create(&self.books, fields).await?;
        tracing::info!(book_id = %id, owner = %owner.uid, "book published");
        self.require(&id).await
    }

    /// Every listing, newest first.
    pub async fn list(&self) -> ServiceResult<Vec<Book>> {
        let docs = self
            .store
            .list(&self.books, Some(&OrderBy::desc("createdAt")))
            .await?;
        docs.iter()
            .map(|doc| doc.decode::<Book>().map_err(ServiceError::from))
            .collect()
    }

    pub async fn get(&self, id: &str) -> ServiceResult<Option<Book>> {
        match self.store.get(&self.books, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Like [`Catalog::get`], but a missing book is an error.
    pub async fn require(&self, id: &str) -> ServiceResult<Book> {
        self.get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book not found"))
    }

    /// Delete a listing. Only its owner may do so.
    pub async fn delete(&self, actor: &Principal, id: &str) -> ServiceResult<()> {
        let book = self.require(id).await?;
        ensure_owner(&actor.uid, &book.owner_uid, Action::DeleteBook)?;
        self.store.delete(&self.books, id).await?;
        tracing::info!(book_id = %id, "book deleted");
        Ok(())
    }

    /// Flip the `available` flag without any ownership check.
    pub async fn set_availability(&self, id: &str, available: bool) -> ServiceResult<()> {
        let mut fields = Fields::new();
        fields.insert("available".to_string(), Value::Bool(available));
        self.store.update(&self.books, id, fields).await?;
        tracing::debug!(book_id = %id, available, "availability updated");
        Ok(())
    }

    /// Owner-initiated availability change.
    pub async fn change_availability(
        &self,
        actor: &Principal,
        id: &str,
        available: bool,
    ) -> ServiceResult<Book> {
        let book = self.require(id).await?;
        ensure_owner(&actor.uid, &book.owner_uid, Action::ChangeAvailability)?;
        self.set_availability(id, available).await?;
        Ok(Book { available, ..book })
    }
}

fn listing_fields(owner: &Principal, book: NewBook) -> ServiceResult<Fields> {
    let title = non_blank(book.title.as_deref())
        .ok_or_else(|| ServiceError::invalid("Title is required"))?;
    let author = non_blank(book.author.as_deref())
        .ok_or_else(|| ServiceError::invalid("Author is required"))?;

    let price = if book.is_free {
        0.0
    } else {
        match book.price {
            Some(price) if !price.is_finite() || price < 0.0 => {
                return Err(ServiceError::invalid("Price must be a non-negative number"));
            }
            Some(price) => price,
            None => 0.0,
        }
    };

    let text = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();

    Ok(to_fields(&json!({
        "title": title,
        "author": author,
        "edition": text(book.edition),
        "condition": text(book.condition),
        "price": price,
        "isFree": book.is_free,
        "description": text(book.description),
        "ownerUid": owner.uid,
        "ownerName": owner.display_label(),
        "ownerEmail": owner.email,
        "ownerPhone": text(book.owner_phone),
        "createdAt": server_timestamp(),
        "available": true,
    }))?)
}
