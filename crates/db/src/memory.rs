use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::document::{is_server_timestamp, CollectionPath, Document, Fields, OrderBy, Timestamp};
use crate::error::{StoreError, StoreResult};
use crate::DocumentStore;

/// Store operation kinds, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Create,
    Get,
    List,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
enum PathMatch {
    Exact(String),
    Prefix(String),
}

impl PathMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Exact(target) => path == target,
            PathMatch::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    op: StoreOp,
    path: PathMatch,
}

/// Process-local document store.
///
/// Documents keep insertion order inside their collection. Server
/// timestamps are strictly increasing across the whole store, even when the
/// wall clock stalls or steps backwards.
pub struct MemoryStore {
    collections: RwLock<BTreeMap<CollectionPath, Vec<Document>>>,
    clock: Mutex<Timestamp>,
    failures: Mutex<Vec<InjectedFailure>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            clock: Mutex::new(Timestamp::EPOCH),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Make every `op` against exactly `path` fail with
    /// [`StoreError::Unavailable`]. For document operations `path` is the
    /// document path, for `Create` and `List` it is the collection path.
    pub fn fail(&self, op: StoreOp, path: impl Into<String>) {
        self.push_failure(InjectedFailure {
            op,
            path: PathMatch::Exact(path.into()),
        });
    }

    /// Make every `op` against any path starting with `prefix` fail.
    pub fn fail_under(&self, op: StoreOp, prefix: impl Into<String>) {
        self.push_failure(InjectedFailure {
            op,
            path: PathMatch::Prefix(prefix.into()),
        });
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    fn push_failure(&self, failure: InjectedFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure);
        }
    }

    fn check(&self, op: StoreOp, path: &str) -> StoreResult<()> {
        let failures = self
            .failures
            .lock()
            .map_err(|_| StoreError::LockPoisoned("failure check"))?;
        if failures.iter().any(|f| f.op == op && f.path.matches(path)) {
            return Err(StoreError::Unavailable(format!(
                "injected {op:?} failure on {path}"
            )));
        }
        Ok(())
    }

    fn next_timestamp(&self) -> StoreResult<Timestamp> {
        let mut last = self
            .clock
            .lock()
            .map_err(|_| StoreError::LockPoisoned("clock"))?;
        let now = Timestamp::now();
        let assigned = if now > *last { now } else { last.next() };
        *last = assigned;
        Ok(assigned)
    }

    fn resolve_sentinels(&self, fields: &mut Fields) -> StoreResult<()> {
        let pending: Vec<String> = fields
            .iter()
            .filter(|(_, value)| is_server_timestamp(value))
            .map(|(key, _)| key.clone())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        // One write, one instant: every sentinel in it gets the same value.
        let stamp = self.next_timestamp()?;
        for key in pending {
            fields.insert(key, Value::from(stamp.as_micros()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &CollectionPath, mut fields: Fields) -> StoreResult<String> {
        self.check(StoreOp::Create, collection.as_str())?;
        self.resolve_sentinels(&mut fields)?;

        let id = Uuid::now_v7().simple().to_string();
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned("create"))?;
        collections
            .entry(collection.clone())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });

        tracing::debug!(target: "bookloop-db", path = %collection.doc_path(&id), "document created");
        Ok(id)
    }

    async fn get(&self, collection: &CollectionPath, id: &str) -> StoreResult<Option<Document>> {
        self.check(StoreOp::Get, &collection.doc_path(id))?;
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned("get"))?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .cloned())
    }

    async fn list(
        &self,
        collection: &CollectionPath,
        order: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>> {
        self.check(StoreOp::List, collection.as_str())?;
        let mut docs = {
            let collections = self
                .collections
                .read()
                .map_err(|_| StoreError::LockPoisoned("list"))?;
            collections.get(collection).cloned().unwrap_or_default()
        };

        if let Some(order) = order {
            // Stable sort: equal keys keep insertion order. Missing values
            // sort lowest.
            docs.sort_by(|a, b| {
                let (ka, kb) = (a.timestamp(&order.field), b.timestamp(&order.field));
                if order.descending {
                    kb.cmp(&ka)
                } else {
                    ka.cmp(&kb)
                }
            });
        }
        Ok(docs)
    }

    async fn update(
        &self,
        collection: &CollectionPath,
        id: &str,
        mut fields: Fields,
    ) -> StoreResult<()> {
        let path = collection.doc_path(id);
        self.check(StoreOp::Update, &path)?;
        self.resolve_sentinels(&mut fields)?;

        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned("update"))?;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
            .ok_or(StoreError::NotFound { path })?;
        doc.fields.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> StoreResult<()> {
        self.check(StoreOp::Delete, &collection.doc_path(id))?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned("delete"))?;
        if let Some(docs) = collections.get_mut(collection) {
            docs.retain(|doc| doc.id != id);
        }
        Ok(())
    }
}
