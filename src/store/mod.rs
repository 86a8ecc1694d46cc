//! Schemaless document store.
//!
//! Documents are JSON objects addressed by `collection/id` paths, where a
//! collection may itself live under a document (`rooms/{id}/messages`).
//! Writes publish a [`Change`] after they commit; [`subscription`] turns that
//! feed into live, cancellable snapshots.

mod sqlite;
pub mod subscription;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use sqlite::SqliteStore;
pub use subscription::{Subscription, watch_document, watch_query};

pub const USERS: &str = "users";
pub const ROOMS: &str = "rooms";
pub const MESSAGES: &str = "messages";

pub type Store = Arc<dyn DocumentStore>;
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed document {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("document {0} does not exist")]
    NotFound(DocRef),

    #[error("invalid path {0:?}")]
    InvalidPath(String),
}

/// Reference to a single document, serialized as its full path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocRef {
    collection: String,
    id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DocRef {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of a collection nested under this document.
    pub fn child(&self, collection: &str) -> String {
        format!("{self}/{collection}")
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl TryFrom<String> for DocRef {
    type Error = StoreError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidPath(path));
        }

        let (collection, id) = path.rsplit_once('/').ok_or_else(|| StoreError::InvalidPath(path.clone()))?;
        Ok(DocRef::new(collection, id))
    }
}

impl From<DocRef> for String {
    fn from(doc: DocRef) -> Self {
        doc.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub reference: DocRef,
    pub data: Value,
}

impl Document {
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|source| StoreError::Malformed {
            path: self.reference.to_string(),
            source,
        })
    }
}

/// Published by a store after a write commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
    pub id: String,
}

impl Change {
    pub fn touches(&self, doc: &DocRef) -> bool {
        self.collection == doc.collection() && self.id == doc.id()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    IdIn(Vec<String>),
    FieldEq(String, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Query {
            collection: collection.into(),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn where_id_in(mut self, ids: Vec<String>) -> Self {
        self.filter = Some(Filter::IdIn(ids));
        self
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filter = Some(Filter::FieldEq(field.into(), value));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a write described by `change` can alter this query's result.
    pub fn affected_by(&self, change: &Change) -> bool {
        if change.collection != self.collection {
            return false;
        }
        match &self.filter {
            Some(Filter::IdIn(ids)) => ids.iter().any(|id| *id == change.id),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(String, Value),
    /// Appends the values not already present in the array field.
    ArrayUnion(String, Vec<Value>),
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::Set(field.into(), value.into())
    }

    pub fn array_union(field: impl Into<String>, values: Vec<Value>) -> Self {
        FieldUpdate::ArrayUnion(field.into(), values)
    }
}

/// Applies field updates to a document body in place.
///
/// A non-object body is replaced by an empty object first, and an
/// array-union against a missing or non-array field starts a new array.
pub fn apply_updates(data: &mut Value, updates: Vec<FieldUpdate>) {
    if !data.is_object() {
        *data = Value::Object(Default::default());
    }
    let Some(fields) = data.as_object_mut() else {
        return;
    };

    for update in updates {
        match update {
            FieldUpdate::Set(field, value) => {
                fields.insert(field, value);
            }
            FieldUpdate::ArrayUnion(field, values) => {
                let entry = fields.entry(field).or_insert_with(|| Value::Array(vec![]));
                if !entry.is_array() {
                    *entry = Value::Array(vec![]);
                }
                if let Value::Array(items) = entry {
                    for value in values {
                        if !items.contains(&value) {
                            items.push(value);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, doc: &DocRef) -> StoreResult<Option<Document>>;

    /// Creates or replaces a document under a caller-chosen id.
    async fn set(&self, doc: &DocRef, data: Value) -> StoreResult<()>;

    /// Creates a document under a generated id.
    async fn add(&self, collection: &str, data: Value) -> StoreResult<DocRef>;

    /// Fails with [`StoreError::NotFound`] when the document is missing.
    async fn update(&self, doc: &DocRef, updates: Vec<FieldUpdate>) -> StoreResult<()>;

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    fn changes(&self) -> broadcast::Receiver<Change>;
}
