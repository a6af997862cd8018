//! Record lifecycle operations.
//!
//! State machine:
//!   pending_verification -> verified   (assigned doctor verifies)
//!   pending_verification -> rejected   (assigned doctor rejects, with reason)
//!   verified -> pending_verification   (any edit invalidates verification)
//!
//! `pending_verification` is the only initial state. Rejected records
//! are terminal and cannot be edited back to life.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    CorrectionRequest, CorrectionState, NotificationKind, OutboxEntry, Prescription, Principal,
    Record, RecordChanges, RecordDraft, RecordState, Role,
};
use crate::store::{collections, encode, Filter};

use super::error::EngineError;
use super::{policy, Engine};

pub(super) fn validate_prescriptions(prescriptions: &[Prescription]) -> Result<(), EngineError> {
    if prescriptions.is_empty() {
        return Err(EngineError::Validation(
            "At least one prescription is required".into(),
        ));
    }
    for p in prescriptions {
        if p.medicine.trim().is_empty()
            || p.dosage.trim().is_empty()
            || p.frequency.trim().is_empty()
        {
            return Err(EngineError::Validation(
                "Every prescription needs medicine, dosage and frequency".into(),
            ));
        }
    }
    Ok(())
}

fn validate_draft(draft: &RecordDraft) -> Result<(), EngineError> {
    if draft.disease.trim().is_empty() {
        return Err(EngineError::Validation("Disease is required".into()));
    }
    validate_prescriptions(&draft.prescriptions)
}

impl Engine {
    /// Enter a new record on behalf of a patient. Management only; the
    /// record starts in `pending_verification` and the assigned doctor
    /// is asked to verify it.
    pub fn create_record(
        &self,
        author: &Principal,
        draft: RecordDraft,
    ) -> Result<Record, EngineError> {
        policy::require_role(author, Role::Management, "create records")?;
        validate_draft(&draft)?;

        let patient = match self.store.get(collections::USERS, draft.patient_id)? {
            Some(doc) => doc.parse::<Principal>()?,
            None => return Err(EngineError::Validation("Unknown patient".into())),
        };
        if patient.role != Role::Patient {
            return Err(EngineError::Validation(
                "patient_id must reference a patient account".into(),
            ));
        }
        if !patient.is_approved() {
            return Err(EngineError::Validation(
                "Patient account is not approved".into(),
            ));
        }
        let doctor = match self.store.get(collections::USERS, draft.doctor_id)? {
            Some(doc) => doc.parse::<Principal>()?,
            None => return Err(EngineError::Validation("Unknown doctor".into())),
        };
        if doctor.role != Role::Doctor {
            return Err(EngineError::Validation(
                "doctor_id must reference a doctor account".into(),
            ));
        }

        let record = Record::from_draft(author.id, draft);
        self.store
            .insert(collections::RECORDS, record.id, encode(&record)?)?;

        self.enqueue(
            OutboxEntry::new(
                record.doctor_id,
                NotificationKind::NewRecordVerification,
                "New record to verify",
                format!("A record for {} is awaiting your verification", patient.name),
            )
            .about_record(record.id),
        )?;
        self.enqueue(
            OutboxEntry::new(
                record.patient_id,
                NotificationKind::RecordAdded,
                "New record on your file",
                format!(
                    "{} added a record to your file, pending verification by {}",
                    author.name, doctor.name
                ),
            )
            .about_record(record.id),
        )?;

        tracing::info!(record_id = %record.id, "Record created");
        Ok(record)
    }

    /// Confirm a pending record. Assigned doctor only.
    pub fn verify_record(
        &self,
        doctor: &Principal,
        record_id: Uuid,
    ) -> Result<Record, EngineError> {
        policy::require_role(doctor, Role::Doctor, "verify records")?;
        let (mut record, version) = self.load_record(record_id)?;
        if record.deleted {
            return Err(EngineError::NotFound(format!("Record {record_id} not found")));
        }
        if record.doctor_id != doctor.id {
            return Err(EngineError::Authorization(
                "Only the assigned doctor can verify this record".into(),
            ));
        }
        if record.state != RecordState::PendingVerification {
            return Err(EngineError::InvalidState(format!(
                "Record is {}, only pending_verification records can be verified",
                record.state.as_str()
            )));
        }

        record.state = RecordState::Verified;
        record.verified_by = Some(doctor.id);
        record.verified_at = Some(Utc::now());
        record.rejection_reason = None;
        self.save_record(&record, version)?;

        self.enqueue(
            OutboxEntry::new(
                record.patient_id,
                NotificationKind::RecordVerified,
                "Record verified",
                format!("{} verified your record", doctor.name),
            )
            .about_record(record.id),
        )?;

        tracing::info!(record_id = %record.id, "Record verified");
        Ok(record)
    }

    /// Refuse a pending record, with a reason the patient will see.
    pub fn reject_record(
        &self,
        doctor: &Principal,
        record_id: Uuid,
        reason: &str,
    ) -> Result<Record, EngineError> {
        policy::require_role(doctor, Role::Doctor, "reject records")?;
        if reason.trim().is_empty() {
            return Err(EngineError::Validation(
                "A rejection reason is required".into(),
            ));
        }
        let (mut record, version) = self.load_record(record_id)?;
        if record.deleted {
            return Err(EngineError::NotFound(format!("Record {record_id} not found")));
        }
        if record.doctor_id != doctor.id {
            return Err(EngineError::Authorization(
                "Only the assigned doctor can reject this record".into(),
            ));
        }
        if record.state != RecordState::PendingVerification {
            return Err(EngineError::InvalidState(format!(
                "Record is {}, only pending_verification records can be rejected",
                record.state.as_str()
            )));
        }

        record.state = RecordState::Rejected;
        record.rejection_reason = Some(reason.trim().to_string());
        record.verified_by = None;
        record.verified_at = None;
        self.save_record(&record, version)?;

        self.enqueue(
            OutboxEntry::new(
                record.patient_id,
                NotificationKind::RecordRejected,
                "Record rejected",
                format!("{} rejected your record: {}", doctor.name, reason.trim()),
            )
            .about_record(record.id),
        )?;

        tracing::info!(record_id = %record.id, "Record rejected");
        Ok(record)
    }

    /// Apply a partial update. Editing a verified record sends it back
    /// to `pending_verification`; rejected records cannot be edited.
    pub fn edit_record(
        &self,
        doctor: &Principal,
        record_id: Uuid,
        changes: RecordChanges,
    ) -> Result<Record, EngineError> {
        policy::require_role(doctor, Role::Doctor, "edit records")?;
        if changes.is_empty() {
            return Err(EngineError::Validation("No changes supplied".into()));
        }
        if let Some(disease) = &changes.disease {
            if disease.trim().is_empty() {
                return Err(EngineError::Validation("Disease cannot be empty".into()));
            }
        }
        if let Some(prescriptions) = &changes.prescriptions {
            validate_prescriptions(prescriptions)?;
        }

        let (mut record, version) = self.load_record(record_id)?;
        if record.deleted {
            return Err(EngineError::NotFound(format!("Record {record_id} not found")));
        }
        if record.doctor_id != doctor.id {
            return Err(EngineError::Authorization(
                "Only the assigned doctor can edit this record".into(),
            ));
        }
        match record.state {
            RecordState::Rejected => {
                return Err(EngineError::InvalidState(
                    "Rejected records cannot be edited".into(),
                ));
            }
            RecordState::Verified => {
                // Any edit invalidates the earlier verification
                record.state = RecordState::PendingVerification;
                record.verified_by = None;
                record.verified_at = None;
            }
            RecordState::PendingVerification => {}
        }

        record.apply(changes);
        self.save_record(&record, version)?;

        self.enqueue(
            OutboxEntry::new(
                record.patient_id,
                NotificationKind::RecordUpdated,
                "Record updated",
                format!("{} updated your record", doctor.name),
            )
            .about_record(record.id),
        )?;

        tracing::info!(record_id = %record.id, "Record edited");
        Ok(record)
    }

    /// Fetch one record, hiding records outside the caller's view.
    pub fn get_record(&self, principal: &Principal, record_id: Uuid) -> Result<Record, EngineError> {
        let (record, _) = self.load_record(record_id)?;
        if !policy::can_view_record(principal, &record) {
            return Err(EngineError::NotFound(format!("Record {record_id} not found")));
        }
        Ok(record)
    }

    /// Role-scoped listing, newest first. Patients see their own
    /// records, doctors their assigned ones, management the ones they
    /// authored, admins everything including soft-deleted rows.
    pub fn list_records(&self, principal: &Principal) -> Result<Vec<Record>, EngineError> {
        let filter = match principal.role {
            Role::Patient => Filter::new()
                .eq("patient_id", principal.id)
                .eq("deleted", false),
            Role::Doctor => Filter::new()
                .eq("doctor_id", principal.id)
                .eq("deleted", false),
            Role::Management => Filter::new()
                .eq("author_id", principal.id)
                .eq("deleted", false),
            Role::Admin => Filter::new(),
        }
        .order_desc("created_at");

        self.store
            .query(collections::RECORDS, &filter)?
            .iter()
            .map(|doc| doc.parse::<Record>().map_err(Into::into))
            .collect()
    }

    /// Soft delete. The row stays in the store for audit and remains
    /// visible to admins. A pending correction request against the
    /// record is rejected on the way out; its patient is told why.
    pub fn delete_record(&self, admin: &Principal, record_id: Uuid) -> Result<(), EngineError> {
        policy::require_role(admin, Role::Admin, "delete records")?;
        let (mut record, version) = self.load_record(record_id)?;
        if record.deleted {
            return Err(EngineError::InvalidState("Record is already deleted".into()));
        }

        record.deleted = true;
        record.correction_requested = false;
        self.save_record(&record, version)?;

        // A challenge against a removed record cannot be acted on any
        // more; close it rather than leaving it pending forever.
        let pending = self.store.query(
            collections::CORRECTIONS,
            &Filter::new()
                .eq("record_id", record_id)
                .eq("state", CorrectionState::Pending),
        )?;
        for doc in &pending {
            let mut request: CorrectionRequest = doc.parse()?;
            request.state = CorrectionState::Rejected;
            request.resolved_at = Some(Utc::now());
            request.response = Some("The record was removed".into());
            self.save_correction(&request, doc.version)?;

            self.enqueue(
                OutboxEntry::new(
                    request.patient_id,
                    NotificationKind::CorrectionRejected,
                    "Correction rejected",
                    "Your correction request was closed because the record was removed",
                )
                .about_record(record.id)
                .about_correction(request.id),
            )?;
        }

        tracing::info!(record_id = %record.id, "Record soft-deleted");
        Ok(())
    }
}
