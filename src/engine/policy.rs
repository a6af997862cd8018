//! Authorization predicates.
//!
//! Default-deny: every mutation names the single role (and, where it
//! matters, the single principal) allowed to perform it; reads resolve
//! per role. All checks take the acting principal explicitly.

use crate::models::{CorrectionRequest, Principal, Record, Role};

use super::error::EngineError;

/// Require an exact role, with a client-facing explanation on refusal.
pub fn require_role(principal: &Principal, role: Role, action: &str) -> Result<(), EngineError> {
    if principal.role != role {
        return Err(EngineError::Authorization(format!(
            "Only {} accounts can {action}",
            role.as_str()
        )));
    }
    Ok(())
}

/// Visibility of a record: admins see everything including
/// soft-deleted rows, the other roles see the records they are party
/// to while not deleted.
pub fn can_view_record(principal: &Principal, record: &Record) -> bool {
    match principal.role {
        Role::Admin => true,
        _ if record.deleted => false,
        Role::Patient => record.patient_id == principal.id,
        Role::Doctor => record.doctor_id == principal.id,
        Role::Management => record.author_id == principal.id,
    }
}

/// Visibility of a correction request: the filing patient, the
/// assigned doctor, and admins.
pub fn can_view_correction(principal: &Principal, request: &CorrectionRequest) -> bool {
    match principal.role {
        Role::Admin => true,
        Role::Patient => request.patient_id == principal.id,
        Role::Doctor => request.doctor_id == principal.id,
        Role::Management => false,
    }
}
