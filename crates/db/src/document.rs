use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};

/// Top-level fields of a document.
pub type Fields = Map<String, Value>;

const SENTINEL_KEY: &str = "__sentinel__";
const SERVER_TIMESTAMP: &str = "serverTimestamp";

/// Placeholder value asking the store to stamp the field with its own clock.
pub fn server_timestamp() -> Value {
    json!({ SENTINEL_KEY: SERVER_TIMESTAMP })
}

pub(crate) fn is_server_timestamp(value: &Value) -> bool {
    value
        .get(SENTINEL_KEY)
        .and_then(Value::as_str)
        .is_some_and(|kind| kind == SERVER_TIMESTAMP)
}

/// Serialize a value into document fields. The value must serialize to a
/// JSON object.
pub fn to_fields<T: Serialize>(value: &T) -> StoreResult<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Malformed {
            path: String::from("<new document>"),
            reason: format!("expected an object, got {other}"),
        }),
    }
}

/// Microseconds since the Unix epoch, as assigned by the store.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        let micros = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
        Self(i64::try_from(micros).unwrap_or(i64::MAX))
    }

    /// The smallest timestamp strictly after `self`.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slash-separated address of a collection, e.g. `books/{id}/requests`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Address a sub-collection of the document `doc_id` in this collection.
    pub fn sub(&self, doc_id: &str, name: &str) -> Self {
        Self(format!("{}/{}/{}", self.0, doc_id, name))
    }

    /// Full path of a document inside this collection.
    pub fn doc_path(&self, id: &str) -> String {
        format!("{}/{}", self.0, id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordering applied by [`crate::DocumentStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

/// A stored document: its id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Read a timestamp field. Missing, null or unresolved values yield
    /// `None`.
    pub fn timestamp(&self, field: &str) -> Option<Timestamp> {
        self.fields
            .get(field)
            .and_then(Value::as_i64)
            .map(Timestamp::from_micros)
    }

    /// Deserialize the document into a model. The document id is exposed to
    /// the model as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}
