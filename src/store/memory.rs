use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;
use uuid::Uuid;

use super::{collections, Cmp, Document, DocumentStore, Filter, Order, StoreError};

#[derive(Debug, Clone)]
struct Stored {
    version: i64,
    body: Value,
}

/// In-memory store for tests and development. Mirrors the uniqueness
/// rules the SQLite store enforces with partial indexes, so engine
/// code sees the same failures against either backend.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, BTreeMap<Uuid, Stored>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn field(body: &Value, name: &str) -> Value {
    body.get(name).cloned().unwrap_or(Value::Null)
}

fn matches(body: &Value, filter: &Filter) -> bool {
    filter.conditions.iter().all(|(name, cmp, want)| {
        let have = field(body, name);
        match cmp {
            Cmp::Eq => have == *want,
            Cmp::Ne => have != *want,
        }
    })
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over scalar JSON values. RFC 3339 timestamps sort
/// correctly as strings, which covers the ordering the engine needs.
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Uniqueness rules shared with the SQLite store: one account per
/// email, at most one pending correction request per record.
fn unique_conflict(
    collection: &str,
    docs: &BTreeMap<Uuid, Stored>,
    id: Uuid,
    body: &Value,
) -> Option<String> {
    match collection {
        collections::USERS => {
            let email = field(body, "email");
            if email != Value::Null
                && docs
                    .iter()
                    .any(|(other, doc)| *other != id && field(&doc.body, "email") == email)
            {
                return Some(format!("email {email} is already registered"));
            }
        }
        collections::CORRECTIONS => {
            if field(body, "state") == Value::String("pending".into()) {
                let record_id = field(body, "record_id");
                let clash = docs.iter().any(|(other, doc)| {
                    *other != id
                        && field(&doc.body, "record_id") == record_id
                        && field(&doc.body, "state") == Value::String("pending".into())
                });
                if clash {
                    return Some(format!(
                        "record {record_id} already has a pending correction request"
                    ));
                }
            }
        }
        _ => {}
    }
    None
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(data
            .get(collection)
            .and_then(|docs| docs.get(&id))
            .map(|stored| Document {
                id,
                version: stored.version,
                body: stored.body.clone(),
            }))
    }

    fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        filter.validate()?;
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        let mut hits: Vec<Document> = data
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, stored)| matches(&stored.body, filter))
                    .map(|(id, stored)| Document {
                        id: *id,
                        version: stored.version,
                        body: stored.body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some((name, order)) = &filter.order_by {
            hits.sort_by(|a, b| {
                let ord = cmp_values(&field(&a.body, name), &field(&b.body, name));
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }
        if let Some(n) = filter.limit {
            hits.truncate(n);
        }
        Ok(hits)
    }

    fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<Document, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        let docs = data.entry(collection.to_string()).or_default();

        if docs.contains_key(&id) {
            return Err(StoreError::UniqueViolation {
                collection: collection.into(),
                detail: format!("document {id} already exists"),
            });
        }
        if let Some(detail) = unique_conflict(collection, docs, id, &body) {
            return Err(StoreError::UniqueViolation {
                collection: collection.into(),
                detail,
            });
        }

        docs.insert(
            id,
            Stored {
                version: 1,
                body: body.clone(),
            },
        );
        Ok(Document {
            id,
            version: 1,
            body,
        })
    }

    fn update(
        &self,
        collection: &str,
        id: Uuid,
        body: Value,
        expected_version: Option<i64>,
    ) -> Result<Document, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        let docs = data
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.into(),
                id: id.to_string(),
            })?;

        let found = docs
            .get(&id)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.into(),
                id: id.to_string(),
            })?
            .version;

        if let Some(expected) = expected_version {
            if expected != found {
                return Err(StoreError::VersionMismatch {
                    collection: collection.into(),
                    id: id.to_string(),
                    expected,
                    found,
                });
            }
        }
        if let Some(detail) = unique_conflict(collection, docs, id, &body) {
            return Err(StoreError::UniqueViolation {
                collection: collection.into(),
                detail,
            });
        }

        let stored = docs.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            collection: collection.into(),
            id: id.to_string(),
        })?;
        stored.version = found + 1;
        stored.body = body.clone();
        Ok(Document {
            id,
            version: found + 1,
            body,
        })
    }

    fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(docs) = data.get_mut(collection) {
            docs.remove(&id);
        }
        Ok(())
    }
}
