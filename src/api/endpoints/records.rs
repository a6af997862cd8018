//! Record lifecycle endpoints.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{Principal, Record, RecordChanges, RecordDraft, Role};

#[derive(Serialize)]
pub struct RecordListResponse {
    pub records: Vec<Record>,
    pub total: usize,
}

/// `POST /api/records` — management enters a record for a consenting
/// patient. The caller's consent grant for the draft's patient is
/// consumed; without one the request is refused before the engine
/// runs. A wrong role gets its authorization error from the engine
/// instead.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Json(draft): Json<RecordDraft>,
) -> Result<Json<Record>, ApiError> {
    if principal.role == Role::Management
        && !ctx.consent.consume_grant(principal.id, draft.patient_id)
    {
        return Err(ApiError::ConsentRequired);
    }
    let record = ctx.engine.create_record(&principal, draft)?;
    Ok(Json(record))
}

/// `GET /api/records` — records visible to the caller, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<RecordListResponse>, ApiError> {
    let records = ctx.engine.list_records(&principal)?;
    let total = records.len();
    Ok(Json(RecordListResponse { records, total }))
}

/// `GET /api/records/:id` — one record, if visible to the caller.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(record_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let record_id = Uuid::parse_str(&record_id)
        .map_err(|e| ApiError::Validation(format!("Invalid record id: {e}")))?;
    let record = ctx.engine.get_record(&principal, record_id)?;
    Ok(Json(record))
}

/// `POST /api/records/:id/verify` — assigned doctor confirms the
/// record.
pub async fn verify(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(record_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let record_id = Uuid::parse_str(&record_id)
        .map_err(|e| ApiError::Validation(format!("Invalid record id: {e}")))?;
    let record = ctx.engine.verify_record(&principal, record_id)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct RejectBody {
    pub reason: String,
}

/// `POST /api/records/:id/reject` — assigned doctor rejects the
/// record with a reason.
pub async fn reject(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(record_id): Path<String>,
    Json(body): Json<RejectBody>,
) -> Result<Json<Record>, ApiError> {
    let record_id = Uuid::parse_str(&record_id)
        .map_err(|e| ApiError::Validation(format!("Invalid record id: {e}")))?;
    let record = ctx.engine.reject_record(&principal, record_id, &body.reason)?;
    Ok(Json(record))
}

/// `PATCH /api/records/:id` — assigned doctor applies partial
/// changes. Editing a verified record sends it back to verification.
pub async fn edit(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(record_id): Path<String>,
    Json(changes): Json<RecordChanges>,
) -> Result<Json<Record>, ApiError> {
    let record_id = Uuid::parse_str(&record_id)
        .map_err(|e| ApiError::Validation(format!("Invalid record id: {e}")))?;
    let record = ctx.engine.edit_record(&principal, record_id, changes)?;
    Ok(Json(record))
}

#[derive(Serialize)]
pub struct RemoveResponse {
    pub deleted: bool,
}

/// `DELETE /api/records/:id` — admin soft delete. The record drops
/// out of non-admin reads but stays on disk.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(record_id): Path<String>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let record_id = Uuid::parse_str(&record_id)
        .map_err(|e| ApiError::Validation(format!("Invalid record id: {e}")))?;
    ctx.engine.delete_record(&principal, record_id)?;
    Ok(Json(RemoveResponse { deleted: true }))
}
