use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CorrectionPriority, CorrectionState};
use super::record::{Record, RecordChanges};

/// A patient's challenge against a verified record. At most one pending
/// request may exist per record at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub id: Uuid,
    pub record_id: Uuid,
    pub patient_id: Uuid,
    /// Doctor assigned to the record when the request was filed.
    pub doctor_id: Uuid,
    pub reason: String,
    pub proposed_changes: Option<RecordChanges>,
    pub priority: CorrectionPriority,
    pub state: CorrectionState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Doctor's note attached at resolution time.
    pub response: Option<String>,
}

impl CorrectionRequest {
    pub fn new(
        record: &Record,
        reason: impl Into<String>,
        proposed_changes: Option<RecordChanges>,
        priority: CorrectionPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id: record.id,
            patient_id: record.patient_id,
            doctor_id: record.doctor_id,
            reason: reason.into(),
            proposed_changes,
            priority,
            state: CorrectionState::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            response: None,
        }
    }
}
