use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use super::{Cmp, Document, DocumentStore, Filter, Order, StoreError};

/// SQLite-backed store. Documents live in a single table as JSON text
/// with a version column; filters compile to `json_extract`
/// expressions and the uniqueness rules are partial expression indexes
/// in the schema.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of documents in a collection (for verification).
    pub fn count(&self, collection: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_documents.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Only plain identifiers may reach the SQL text; everything else is
/// bound as a parameter.
fn json_path(field: &str) -> Result<String, StoreError> {
    if field.is_empty()
        || !field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    Ok(format!("$.{field}"))
}

/// `json_extract` yields SQL NULL for missing keys, 0/1 for booleans
/// and native text/numbers otherwise; bindings follow the same shape.
fn bind_value(value: &Value) -> Box<dyn rusqlite::ToSql> {
    match value {
        Value::Null => Box::new(rusqlite::types::Null),
        Value::Bool(b) => Box::new(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else {
                Box::new(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}

fn map_constraint(collection: &str, e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::UniqueViolation {
                collection: collection.into(),
                detail: msg
                    .clone()
                    .unwrap_or_else(|| "constraint violation".into()),
            }
        }
        _ => StoreError::Sqlite(e),
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let row = conn
            .query_row(
                "SELECT version, body FROM documents WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id.to_string()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((version, body)) => Ok(Some(Document {
                id,
                version,
                body: serde_json::from_str(&body)?,
            })),
            None => Ok(None),
        }
    }

    fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        filter.validate()?;
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

        let mut sql = String::from("SELECT id, version, body FROM documents WHERE collection = ?");
        let mut binds: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(collection.to_string())];

        for (field, cmp, value) in &filter.conditions {
            let path = json_path(field)?;
            let op = match cmp {
                Cmp::Eq => "IS",
                Cmp::Ne => "IS NOT",
            };
            sql.push_str(&format!(" AND json_extract(body, '{path}') {op} ?"));
            binds.push(bind_value(value));
        }
        if let Some((field, order)) = &filter.order_by {
            let path = json_path(field)?;
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY json_extract(body, '{path}') {dir}"));
        }
        if let Some(n) = filter.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(binds.iter().map(|b| b.as_ref())),
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, version, body) = row?;
            docs.push(Document {
                id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
                version,
                body: serde_json::from_str(&body)?,
            });
        }
        Ok(docs)
    }

    fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<Document, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO documents (collection, id, version, body) VALUES (?1, ?2, 1, ?3)",
            rusqlite::params![collection, id.to_string(), body.to_string()],
        )
        .map_err(|e| map_constraint(collection, e))?;
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
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

        let found: i64 = conn
            .query_row(
                "SELECT version FROM documents WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.into(),
                id: id.to_string(),
            })?;

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

        // The connection mutex is held, so the row cannot move between
        // the read above and this guarded write.
        conn.execute(
            "UPDATE documents SET version = ?1, body = ?2
             WHERE collection = ?3 AND id = ?4 AND version = ?5",
            rusqlite::params![found + 1, body.to_string(), collection, id.to_string(), found],
        )
        .map_err(|e| map_constraint(collection, e))?;

        Ok(Document {
            id,
            version: found + 1,
            body,
        })
    }

    fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collections;
    use serde_json::json;

    #[test]
    fn schema_version_is_current() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        // Run migrations again — should not error
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn store_opens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verimed.db");
        let id = Uuid::new_v4();
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .insert("records", id, json!({"disease": "Flu"}))
                .unwrap();
        }
        // Re-open — data and schema survive
        let store = SqliteStore::open(&path).unwrap();
        let doc = store.get("records", id).unwrap().unwrap();
        assert_eq!(doc.body["disease"], "Flu");
        assert_eq!(store.count("records").unwrap(), 1);
    }

    #[test]
    fn insert_get_update_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.insert("records", id, json!({"n": 1})).unwrap();

        let doc = store.get("records", id).unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.body["n"], 1);

        let doc = store
            .update("records", id, json!({"n": 2}), Some(1))
            .unwrap();
        assert_eq!(doc.version, 2);

        let doc = store.get("records", id).unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.body["n"], 2);
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.insert("records", id, json!({"n": 1})).unwrap();
        store.update("records", id, json!({"n": 2}), None).unwrap();

        let err = store
            .update("records", id, json!({"n": 99}), Some(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { .. }));
        let doc = store.get("records", id).unwrap().unwrap();
        assert_eq!(doc.body["n"], 2);
    }

    #[test]
    fn update_missing_document_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .update("records", Uuid::new_v4(), json!({}), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn query_compiles_filters_to_json_extract() {
        let store = SqliteStore::open_in_memory().unwrap();
        let patient = Uuid::new_v4();
        for (day, state, deleted) in [
            ("2025-03-01T10:00:00Z", "verified", false),
            ("2025-03-03T10:00:00Z", "pending_verification", false),
            ("2025-03-02T10:00:00Z", "verified", true),
        ] {
            store
                .insert(
                    "records",
                    Uuid::new_v4(),
                    json!({
                        "patient_id": patient,
                        "state": state,
                        "created_at": day,
                        "deleted": deleted,
                    }),
                )
                .unwrap();
        }

        let hits = store
            .query(
                "records",
                &Filter::new()
                    .eq("patient_id", patient)
                    .eq("deleted", false)
                    .order_desc("created_at"),
            )
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].body["created_at"], "2025-03-03T10:00:00Z");

        let hits = store
            .query(
                "records",
                &Filter::new()
                    .eq("patient_id", patient)
                    .ne("state", "verified")
                    .limit(5),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body["state"], "pending_verification");
    }

    #[test]
    fn filter_field_names_are_validated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .query("records", &Filter::new().eq("state; DROP TABLE documents", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidField(_)));
    }

    #[test]
    fn invalid_filter_value_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let bad = std::collections::HashMap::from([(vec![1u8], true)]);
        let err = store
            .query("records", &Filter::new().eq("state", bad))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilterValue(_)));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(
                collections::USERS,
                Uuid::new_v4(),
                json!({"email": "a@ex.com", "role": "patient"}),
            )
            .unwrap();

        let err = store
            .insert(
                collections::USERS,
                Uuid::new_v4(),
                json!({"email": "a@ex.com", "role": "doctor"}),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[test]
    fn second_pending_correction_is_rejected_by_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = Uuid::new_v4();
        store
            .insert(
                collections::CORRECTIONS,
                Uuid::new_v4(),
                json!({"record_id": record, "state": "pending"}),
            )
            .unwrap();

        let err = store
            .insert(
                collections::CORRECTIONS,
                Uuid::new_v4(),
                json!({"record_id": record, "state": "pending"}),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));

        // Resolved requests do not occupy the slot
        let other = Uuid::new_v4();
        store
            .insert(
                collections::CORRECTIONS,
                Uuid::new_v4(),
                json!({"record_id": other, "state": "rejected"}),
            )
            .unwrap();
        store
            .insert(
                collections::CORRECTIONS,
                Uuid::new_v4(),
                json!({"record_id": other, "state": "pending"}),
            )
            .unwrap();
    }

    #[test]
    fn reopening_pending_via_update_hits_the_index() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = Uuid::new_v4();
        let resolved = Uuid::new_v4();
        store
            .insert(
                collections::CORRECTIONS,
                resolved,
                json!({"record_id": record, "state": "approved"}),
            )
            .unwrap();
        store
            .insert(
                collections::CORRECTIONS,
                Uuid::new_v4(),
                json!({"record_id": record, "state": "pending"}),
            )
            .unwrap();

        // Flipping the resolved one back to pending would make two
        let err = store
            .update(
                collections::CORRECTIONS,
                resolved,
                json!({"record_id": record, "state": "pending"}),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.insert("outbox", id, json!({"dispatched": false})).unwrap();
        store.delete("outbox", id).unwrap();
        store.delete("outbox", id).unwrap();
        assert!(store.get("outbox", id).unwrap().is_none());
    }
}
