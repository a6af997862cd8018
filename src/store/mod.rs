//! Document store abstraction.
//!
//! Persistence is schema-light: every entity is a JSON document in a
//! named collection, addressed by UUID. Two implementations are
//! provided, an in-memory store for tests and development and a
//! SQLite-backed store for production. Both enforce the same
//! uniqueness rules and the same monotonic per-document version, so
//! engine behavior is identical against either.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Collection names used throughout the engine.
pub mod collections {
    pub const USERS: &str = "users";
    pub const RECORDS: &str = "records";
    pub const CORRECTIONS: &str = "correction_requests";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const OUTBOX: &str = "outbox";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Stale version for {collection}/{id}: expected {expected}, found {found}")]
    VersionMismatch {
        collection: String,
        id: String,
        expected: i64,
        found: i64,
    },

    #[error("Unique constraint violated in {collection}: {detail}")]
    UniqueViolation { collection: String, detail: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid filter field: {0}")]
    InvalidField(String),

    #[error("Invalid filter value for {0}")]
    InvalidFilterValue(String),

    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// A stored document plus its version. The version starts at 1 and
/// increases by 1 on every successful update.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub version: i64,
    pub body: Value,
}

impl Document {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Serialize a model into a document body.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Query over top-level document fields: equality / inequality
/// conditions, optional ordering, optional limit. Fields referenced
/// here must be plain identifiers; nested paths are not supported.
/// A condition value that fails to serialize marks the whole filter
/// invalid and stores refuse to run it, rather than matching nothing.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub(crate) conditions: Vec<(String, Cmp, Value)>,
    pub(crate) order_by: Option<(String, Order)>,
    pub(crate) limit: Option<usize>,
    pub(crate) invalid: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Serialize) -> Self {
        self.push(field, Cmp::Eq, value);
        self
    }

    pub fn ne(mut self, field: &str, value: impl Serialize) -> Self {
        self.push(field, Cmp::Ne, value);
        self
    }

    fn push(&mut self, field: &str, cmp: Cmp, value: impl Serialize) {
        match serde_json::to_value(value) {
            Ok(v) => self.conditions.push((field.to_string(), cmp, v)),
            Err(e) => {
                // First failure wins; surfaced when the filter runs
                if self.invalid.is_none() {
                    self.invalid = Some(format!("{field}: {e}"));
                }
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        match &self.invalid {
            Some(detail) => Err(StoreError::InvalidFilterValue(detail.clone())),
            None => Ok(()),
        }
    }

    pub fn order_asc(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), Order::Asc));
        self
    }

    pub fn order_desc(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), Order::Desc));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Storage contract the engine is written against.
///
/// `update` takes an optional expected version: when supplied and the
/// stored version differs, the write fails with `VersionMismatch` and
/// the document is left untouched. `delete` is idempotent.
pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<Document, StoreError>;

    fn update(
        &self,
        collection: &str,
        id: Uuid,
        body: Value,
        expected_version: Option<i64>,
    ) -> Result<Document, StoreError>;

    fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError>;
}
