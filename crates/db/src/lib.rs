//! Document store facade for Bookloop.
//!
//! The application never talks to a concrete database. Everything goes
//! through [`DocumentStore`], which models a managed document database:
//! collections addressed by path, store-assigned ids, partial field updates,
//! timestamp-ordered listing and server-assigned timestamps.

use std::sync::Arc;

use async_trait::async_trait;
use bookloop_kernel::settings::{StoreBackend, StoreSettings};

pub mod document;
pub mod error;
pub mod memory;

pub use document::{server_timestamp, to_fields, CollectionPath, Document, Fields, OrderBy, Timestamp};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreOp};

/// Operations the application requires from the backing document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document and return its store-assigned id.
    ///
    /// Values produced by [`server_timestamp`] are replaced with the
    /// store's clock at write time.
    async fn create(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String>;

    /// Fetch a single document, `None` when it does not exist.
    async fn get(&self, collection: &CollectionPath, id: &str) -> StoreResult<Option<Document>>;

    /// List every document in a collection, optionally ordered by a
    /// timestamp field.
    async fn list(
        &self,
        collection: &CollectionPath,
        order: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>>;

    /// Merge `fields` into an existing document. Fails with
    /// [`StoreError::NotFound`] when the document is missing.
    async fn update(&self, collection: &CollectionPath, id: &str, fields: Fields)
        -> StoreResult<()>;

    /// Remove a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &CollectionPath, id: &str) -> StoreResult<()>;
}

/// Build the store selected by configuration.
pub fn connect(settings: &StoreSettings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match settings.backend {
        StoreBackend::Memory => {
            tracing::info!(target: "bookloop-db", backend = "memory", "document store ready");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
