//! Record lifecycle engine.
//!
//! One struct owns the document store and exposes every operation of
//! the service: record lifecycle transitions, the correction workflow,
//! the account status workflow and notification reads. Operations are
//! single-attempt and fail fast. Each one receives the acting
//! principal explicitly; nothing reads an ambient current user.
//!
//! Notification side effects are decoupled from the operations: an
//! operation appends durable outbox entries after its state mutation
//! lands, and the dispatcher in `notifications` drains them into
//! in-app notifications plus the external channel.

pub mod accounts;
pub mod corrections;
pub mod error;
pub mod notifications;
pub mod policy;
pub mod records;

pub use error::EngineError;
pub use notifications::Dispatcher;

use std::sync::Arc;

use uuid::Uuid;

use crate::models::{CorrectionRequest, OutboxEntry, Principal, Record};
use crate::store::{collections, encode, DocumentStore};

pub struct Engine {
    pub(crate) store: Arc<dyn DocumentStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load a record with its store version. Callers apply their own
    /// visibility or assignment checks on top: reads hide invisible
    /// records as missing, mutations report a wrong actor explicitly.
    fn load_record(&self, id: Uuid) -> Result<(Record, i64), EngineError> {
        let doc = self
            .store
            .get(collections::RECORDS, id)?
            .ok_or_else(|| EngineError::NotFound(format!("Record {id} not found")))?;
        Ok((doc.parse()?, doc.version))
    }

    fn load_correction(&self, id: Uuid) -> Result<(CorrectionRequest, i64), EngineError> {
        let doc = self
            .store
            .get(collections::CORRECTIONS, id)?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Correction request {id} not found"))
            })?;
        Ok((doc.parse()?, doc.version))
    }

    pub fn get_principal(&self, id: Uuid) -> Result<Principal, EngineError> {
        let doc = self
            .store
            .get(collections::USERS, id)?
            .ok_or_else(|| EngineError::NotFound(format!("Account {id} not found")))?;
        doc.parse().map_err(Into::into)
    }

    /// Conditional write: fails with `Conflict` when the record moved
    /// since it was read.
    fn save_record(&self, record: &Record, expected_version: i64) -> Result<(), EngineError> {
        self.store.update(
            collections::RECORDS,
            record.id,
            encode(record)?,
            Some(expected_version),
        )?;
        Ok(())
    }

    fn save_correction(
        &self,
        request: &CorrectionRequest,
        expected_version: i64,
    ) -> Result<(), EngineError> {
        self.store.update(
            collections::CORRECTIONS,
            request.id,
            encode(request)?,
            Some(expected_version),
        )?;
        Ok(())
    }

    /// Durable notification staging. Called after the state mutation of
    /// the surrounding operation; delivery happens on the dispatcher
    /// tick.
    pub(crate) fn enqueue(&self, entry: OutboxEntry) -> Result<(), EngineError> {
        self.store
            .insert(collections::OUTBOX, entry.id, encode(&entry)?)?;
        Ok(())
    }
}
