//! Patient consent gate for record entry.
//!
//! Management cannot enter a record for a patient without the
//! patient's say-so. The flow: the operator requests a code, the
//! patient receives a 6-digit code through their notifications and
//! reads it back to the operator out of band, the operator verifies
//! it and earns a short-lived single-use grant that the
//! record-creation endpoint consumes.
//!
//! Codes and grants live in memory only: one active code per patient,
//! bounded wrong attempts, constant-time comparison, expiry on both
//! sides of the exchange.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::api::types::hash_token;
use crate::config;
use crate::engine::{policy, EngineError};
use crate::models::{NotificationKind, OutboxEntry, Principal, Role};
use crate::store::{collections, encode, DocumentStore, StoreError};

/// An issued consent code awaiting verification.
struct PendingCode {
    code: String,
    requested_by: Uuid,
    issued_at: Instant,
    attempts: u32,
}

/// A verified grant, good for one record creation while it lives.
struct Grant {
    expires_at: Instant,
}

/// In-memory consent state plus a handle to the store for staging the
/// code notification. Shared behind an `Arc` by the API layer.
pub struct ConsentService {
    store: Arc<dyn DocumentStore>,
    codes: Mutex<HashMap<Uuid, PendingCode>>,
    grants: Mutex<HashMap<(Uuid, Uuid), Grant>>,
}

/// 6-digit numeric code, zero-padded.
fn generate_code() -> String {
    use rand::Rng;
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

impl ConsentService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            codes: Mutex::new(HashMap::new()),
            grants: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a consent code for a patient. The code reaches the
    /// patient through their own notifications; the operator never
    /// sees it directly. A new request replaces any earlier code for
    /// the same patient.
    pub fn request_code(
        &self,
        requester: &Principal,
        patient_id: Uuid,
    ) -> Result<(), EngineError> {
        policy::require_role(requester, Role::Management, "request patient consent")?;

        let doc = self
            .store
            .get(collections::USERS, patient_id)?
            .ok_or_else(|| EngineError::NotFound(format!("Account {patient_id} not found")))?;
        let patient: Principal = doc.parse()?;
        if patient.role != Role::Patient || !patient.is_approved() {
            return Err(EngineError::Validation(
                "Consent codes can only be issued for approved patient accounts".into(),
            ));
        }

        let code = generate_code();
        {
            let mut codes = self.codes.lock().map_err(|_| StoreError::Poisoned)?;
            codes.insert(
                patient_id,
                PendingCode {
                    code: code.clone(),
                    requested_by: requester.id,
                    issued_at: Instant::now(),
                    attempts: 0,
                },
            );
        }

        let entry = OutboxEntry::new(
            patient_id,
            NotificationKind::ConsentCode,
            "Consent code",
            format!(
                "{} asks to enter a medical record for you. Share code {code} with them to approve.",
                requester.name
            ),
        );
        self.store
            .insert(collections::OUTBOX, entry.id, encode(&entry)?)?;

        tracing::info!(patient_id = %patient_id, requester = %requester.id, "Consent code issued");
        Ok(())
    }

    /// Verify the code the patient read back. On success the code is
    /// consumed and the operator holds a grant for this patient.
    pub fn verify_code(
        &self,
        requester: &Principal,
        patient_id: Uuid,
        code: &str,
    ) -> Result<(), EngineError> {
        policy::require_role(requester, Role::Management, "verify patient consent")?;

        let mut codes = self.codes.lock().map_err(|_| StoreError::Poisoned)?;
        let pending = codes.get_mut(&patient_id).ok_or_else(|| {
            EngineError::Validation("No active consent code for this patient".into())
        })?;

        if pending.requested_by != requester.id {
            return Err(EngineError::Authorization(
                "The consent code was requested by a different operator".into(),
            ));
        }
        if pending.issued_at.elapsed() > Duration::from_secs(config::CONSENT_CODE_TTL_SECS) {
            codes.remove(&patient_id);
            return Err(EngineError::Validation(
                "Consent code expired, request a new one".into(),
            ));
        }

        // Compare SHA-256 digests in constant time; the digests also
        // equalize the operand lengths.
        let expected = hash_token(&pending.code);
        let provided = hash_token(code.trim());
        if expected.ct_eq(&provided).unwrap_u8() == 0 {
            pending.attempts += 1;
            if pending.attempts >= config::CONSENT_MAX_ATTEMPTS {
                codes.remove(&patient_id);
                return Err(EngineError::Validation(
                    "Too many wrong attempts, the consent code was invalidated".into(),
                ));
            }
            return Err(EngineError::Validation("Incorrect consent code".into()));
        }

        // One code, one grant
        codes.remove(&patient_id);
        drop(codes);

        let mut grants = self.grants.lock().map_err(|_| StoreError::Poisoned)?;
        grants.insert(
            (requester.id, patient_id),
            Grant {
                expires_at: Instant::now() + Duration::from_secs(config::CONSENT_GRANT_TTL_SECS),
            },
        );

        tracing::info!(patient_id = %patient_id, requester = %requester.id, "Consent verified");
        Ok(())
    }

    /// Take the grant for this operator and patient pair. Single use:
    /// creating a second record requires a fresh verification.
    pub fn consume_grant(&self, requester_id: Uuid, patient_id: Uuid) -> bool {
        let Ok(mut grants) = self.grants.lock() else {
            return false;
        };
        match grants.remove(&(requester_id, patient_id)) {
            Some(grant) => Instant::now() < grant.expires_at,
            None => false,
        }
    }

    /// Drop expired codes and grants. Called from the background loop.
    pub fn cleanup(&self) {
        if let Ok(mut codes) = self.codes.lock() {
            let ttl = Duration::from_secs(config::CONSENT_CODE_TTL_SECS);
            codes.retain(|_, c| c.issued_at.elapsed() < ttl);
        }
        if let Ok(mut grants) = self.grants.lock() {
            let now = Instant::now();
            grants.retain(|_, g| now < g.expires_at);
        }
    }
}
