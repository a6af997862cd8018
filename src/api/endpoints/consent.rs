//! Consent endpoints.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::config;
use crate::models::Principal;

#[derive(Deserialize)]
pub struct ConsentRequestBody {
    pub patient_id: Uuid,
}

#[derive(Serialize)]
pub struct ConsentRequestResponse {
    pub requested: bool,
    pub expires_in_secs: u64,
}

/// `POST /api/consent/request` — issue a consent code for a patient.
/// The code goes to the patient's notifications, not to the caller.
pub async fn request_code(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ConsentRequestBody>,
) -> Result<Json<ConsentRequestResponse>, ApiError> {
    ctx.consent.request_code(&principal, body.patient_id)?;
    Ok(Json(ConsentRequestResponse {
        requested: true,
        expires_in_secs: config::CONSENT_CODE_TTL_SECS,
    }))
}

#[derive(Deserialize)]
pub struct ConsentVerifyBody {
    pub patient_id: Uuid,
    pub code: String,
}

#[derive(Serialize)]
pub struct ConsentVerifyResponse {
    pub granted: bool,
    pub expires_in_secs: u64,
}

/// `POST /api/consent/verify` — verify the code read back by the
/// patient. Success earns a single-use grant for record creation.
pub async fn verify_code(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ConsentVerifyBody>,
) -> Result<Json<ConsentVerifyResponse>, ApiError> {
    ctx.consent
        .verify_code(&principal, body.patient_id, &body.code)?;
    Ok(Json(ConsentVerifyResponse {
        granted: true,
        expires_in_secs: config::CONSENT_GRANT_TTL_SECS,
    }))
}
