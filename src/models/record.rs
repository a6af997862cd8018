use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CaseStatus, RecordState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub medicine: String,
    pub dosage: String,
    pub frequency: String,
    pub interval: Option<String>,
}

/// Input for record creation. The engine fills in identity, timestamps
/// and lifecycle fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDraft {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub disease: String,
    pub prescriptions: Vec<Prescription>,
    pub recommendations: Option<String>,
    pub case_status: CaseStatus,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Partial update applied by edit and by approved corrections.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordChanges {
    pub disease: Option<String>,
    pub prescriptions: Option<Vec<Prescription>>,
    pub recommendations: Option<String>,
    pub case_status: Option<CaseStatus>,
    pub attachments: Option<Vec<String>>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        self.disease.is_none()
            && self.prescriptions.is_none()
            && self.recommendations.is_none()
            && self.case_status.is_none()
            && self.attachments.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// Management principal who entered the record.
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub disease: String,
    pub prescriptions: Vec<Prescription>,
    pub recommendations: Option<String>,
    pub case_status: CaseStatus,
    /// Opaque references into external file storage.
    pub attachments: Vec<String>,
    pub state: RecordState,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// True while an unresolved correction request references this record.
    pub correction_requested: bool,
    /// Soft-delete flag. Deleted records stay in the store for audit.
    pub deleted: bool,
}

impl Record {
    /// Build a fresh record from a draft. Initial state is always
    /// `pending_verification`.
    pub fn from_draft(author_id: Uuid, draft: RecordDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id: draft.patient_id,
            doctor_id: draft.doctor_id,
            author_id,
            created_at: Utc::now(),
            disease: draft.disease,
            prescriptions: draft.prescriptions,
            recommendations: draft.recommendations,
            case_status: draft.case_status,
            attachments: draft.attachments,
            state: RecordState::PendingVerification,
            verified_by: None,
            verified_at: None,
            rejection_reason: None,
            correction_requested: false,
            deleted: false,
        }
    }

    /// Apply a partial update to the clinical fields. Lifecycle fields
    /// are the engine's business and are not touched here.
    pub fn apply(&mut self, changes: RecordChanges) {
        if let Some(disease) = changes.disease {
            self.disease = disease;
        }
        if let Some(prescriptions) = changes.prescriptions {
            self.prescriptions = prescriptions;
        }
        if let Some(recommendations) = changes.recommendations {
            self.recommendations = Some(recommendations);
        }
        if let Some(case_status) = changes.case_status {
            self.case_status = case_status;
        }
        if let Some(attachments) = changes.attachments {
            self.attachments = attachments;
        }
    }
}
