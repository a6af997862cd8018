//! Correction request workflow.
//!
//! A patient challenges a verified record; the assigned doctor
//! approves or rejects the challenge. At most one pending request may
//! exist per record, enforced by a pre-check here and again by the
//! store's uniqueness rule for the race the pre-check cannot see.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    CorrectionPriority, CorrectionRequest, CorrectionState, NotificationKind, OutboxEntry,
    Principal, RecordChanges, RecordState, Resolution, Role,
};
use crate::store::{collections, encode, Filter};

use super::error::EngineError;
use super::records::validate_prescriptions;
use super::{policy, Engine};

impl Engine {
    /// File a correction request against one of the caller's verified
    /// records. The record's doctor is notified and the record carries
    /// `correction_requested` until the request is resolved.
    pub fn request_correction(
        &self,
        patient: &Principal,
        record_id: Uuid,
        reason: &str,
        proposed_changes: Option<RecordChanges>,
        priority: CorrectionPriority,
    ) -> Result<CorrectionRequest, EngineError> {
        policy::require_role(patient, Role::Patient, "request corrections")?;
        if reason.trim().is_empty() {
            return Err(EngineError::Validation(
                "A reason for the correction is required".into(),
            ));
        }

        let (mut record, record_version) = self.load_record(record_id)?;
        if record.deleted {
            return Err(EngineError::NotFound(format!("Record {record_id} not found")));
        }
        if record.patient_id != patient.id {
            return Err(EngineError::Authorization(
                "You can only challenge your own records".into(),
            ));
        }
        if record.state != RecordState::Verified {
            return Err(EngineError::InvalidState(format!(
                "Record is {}, only verified records can be challenged",
                record.state.as_str()
            )));
        }

        let pending = self.store.query(
            collections::CORRECTIONS,
            &Filter::new()
                .eq("record_id", record_id)
                .eq("state", CorrectionState::Pending),
        )?;
        if !pending.is_empty() {
            return Err(EngineError::Conflict(
                "A pending correction request already exists for this record".into(),
            ));
        }

        // Flag first: competing requesters serialize on the record
        // version, and the store's unique rule backstops the rest.
        record.correction_requested = true;
        self.save_record(&record, record_version)?;

        let request = CorrectionRequest::new(&record, reason.trim(), proposed_changes, priority);
        if let Err(e) = self
            .store
            .insert(collections::CORRECTIONS, request.id, encode(&request)?)
        {
            // The request did not land; put the flag back
            record.correction_requested = false;
            let _ = self.save_record(&record, record_version + 1);
            return Err(e.into());
        }

        self.enqueue(
            OutboxEntry::new(
                record.doctor_id,
                NotificationKind::CorrectionRequested,
                "Correction requested",
                format!(
                    "{} requested a correction ({} priority): {}",
                    patient.name,
                    request.priority.as_str(),
                    request.reason
                ),
            )
            .about_record(record.id)
            .about_correction(request.id),
        )?;

        tracing::info!(request_id = %request.id, record_id = %record.id, "Correction requested");
        Ok(request)
    }

    /// Settle a pending request. Approving may carry record changes,
    /// which are applied with edit semantics: a verified record drops
    /// back to `pending_verification`. Rejecting leaves the record as
    /// it was, apart from clearing the `correction_requested` flag.
    pub fn resolve_correction(
        &self,
        doctor: &Principal,
        request_id: Uuid,
        resolution: Resolution,
        response: Option<String>,
        record_changes: Option<RecordChanges>,
    ) -> Result<CorrectionRequest, EngineError> {
        policy::require_role(doctor, Role::Doctor, "resolve correction requests")?;

        let (mut request, request_version) = self.load_correction(request_id)?;
        if request.doctor_id != doctor.id {
            return Err(EngineError::Authorization(
                "Only the assigned doctor can resolve this request".into(),
            ));
        }
        if request.state != CorrectionState::Pending {
            return Err(EngineError::InvalidState(format!(
                "Request is already {}",
                request.state.as_str()
            )));
        }

        let approve = resolution == Resolution::Approve;
        if approve {
            if let Some(changes) = &record_changes {
                if let Some(disease) = &changes.disease {
                    if disease.trim().is_empty() {
                        return Err(EngineError::Validation("Disease cannot be empty".into()));
                    }
                }
                if let Some(prescriptions) = &changes.prescriptions {
                    validate_prescriptions(prescriptions)?;
                }
            }
        }

        // Record first: competing resolutions serialize on its version
        // before either can touch the request.
        let (mut record, record_version) = self.load_record(request.record_id)?;
        if record.deleted {
            return Err(EngineError::NotFound(format!(
                "Record {} not found",
                request.record_id
            )));
        }
        record.correction_requested = false;
        if approve {
            if let Some(changes) = record_changes {
                if !changes.is_empty() {
                    if record.state == RecordState::Verified {
                        record.state = RecordState::PendingVerification;
                        record.verified_by = None;
                        record.verified_at = None;
                    }
                    record.apply(changes);
                }
            }
        }
        self.save_record(&record, record_version)?;

        request.state = if approve {
            CorrectionState::Approved
        } else {
            CorrectionState::Rejected
        };
        request.resolved_at = Some(Utc::now());
        request.response = response;
        self.save_correction(&request, request_version)?;

        let verb = if approve { "approved" } else { "rejected" };
        let message = match &request.response {
            Some(text) => format!("{} {verb} your correction request: {text}", doctor.name),
            None => format!("{} {verb} your correction request", doctor.name),
        };
        self.enqueue(
            OutboxEntry::new(
                request.patient_id,
                if approve {
                    NotificationKind::CorrectionApproved
                } else {
                    NotificationKind::CorrectionRejected
                },
                if approve {
                    "Correction approved"
                } else {
                    "Correction rejected"
                },
                message,
            )
            .about_record(request.record_id)
            .about_correction(request.id),
        )?;

        tracing::info!(request_id = %request.id, resolution = verb, "Correction request resolved");
        Ok(request)
    }

    /// Role-scoped listing: patients see their own requests, doctors
    /// the ones assigned to them, admins everything. Pending requests
    /// sort first, newest within each group.
    pub fn list_corrections(
        &self,
        principal: &Principal,
    ) -> Result<Vec<CorrectionRequest>, EngineError> {
        let filter = match principal.role {
            Role::Patient => Filter::new().eq("patient_id", principal.id),
            Role::Doctor => Filter::new().eq("doctor_id", principal.id),
            Role::Admin => Filter::new(),
            Role::Management => {
                return Err(EngineError::Authorization(
                    "Management accounts cannot view correction requests".into(),
                ));
            }
        };

        let mut requests: Vec<CorrectionRequest> = self
            .store
            .query(collections::CORRECTIONS, &filter)?
            .iter()
            .map(|doc| doc.parse::<CorrectionRequest>().map_err(Into::into))
            .collect::<Result<_, EngineError>>()?;

        requests.sort_by(|a, b| {
            let rank = |r: &CorrectionRequest| u8::from(r.state != CorrectionState::Pending);
            rank(a)
                .cmp(&rank(b))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(requests)
    }
}
