//! Correction workflow endpoints.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{
    CorrectionPriority, CorrectionRequest, Principal, RecordChanges, Resolution,
};

#[derive(Deserialize)]
pub struct FileCorrectionBody {
    pub reason: String,
    #[serde(default)]
    pub proposed_changes: Option<RecordChanges>,
    #[serde(default)]
    pub priority: Option<CorrectionPriority>,
}

/// `POST /api/records/:id/corrections` — patient files a correction
/// request against one of their verified records.
pub async fn file(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(record_id): Path<String>,
    Json(body): Json<FileCorrectionBody>,
) -> Result<Json<CorrectionRequest>, ApiError> {
    let record_id = Uuid::parse_str(&record_id)
        .map_err(|e| ApiError::Validation(format!("Invalid record id: {e}")))?;
    let request = ctx.engine.request_correction(
        &principal,
        record_id,
        &body.reason,
        body.proposed_changes,
        body.priority.unwrap_or(CorrectionPriority::Medium),
    )?;
    Ok(Json(request))
}

#[derive(Serialize)]
pub struct CorrectionListResponse {
    pub corrections: Vec<CorrectionRequest>,
    pub total: usize,
}

/// `GET /api/corrections` — correction requests visible to the
/// caller, pending first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<CorrectionListResponse>, ApiError> {
    let corrections = ctx.engine.list_corrections(&principal)?;
    let total = corrections.len();
    Ok(Json(CorrectionListResponse { corrections, total }))
}

#[derive(Deserialize)]
pub struct ResolveBody {
    pub resolution: Resolution,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub record_changes: Option<RecordChanges>,
}

/// `POST /api/corrections/:id/resolve` — assigned doctor approves or
/// rejects a pending request, optionally applying record changes on
/// approval.
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<CorrectionRequest>, ApiError> {
    let request_id = Uuid::parse_str(&request_id)
        .map_err(|e| ApiError::Validation(format!("Invalid correction request id: {e}")))?;
    let request = ctx.engine.resolve_correction(
        &principal,
        request_id,
        body.resolution,
        body.response,
        body.record_changes,
    )?;
    Ok(Json(request))
}
