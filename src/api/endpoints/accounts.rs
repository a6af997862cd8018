//! Account endpoints.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{AccountStatus, Principal, Role};

#[derive(Deserialize)]
pub struct RegisterBody {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// `POST /api/accounts/register` — open self-registration. The new
/// account waits in `pending` for an admin decision.
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<Principal>, ApiError> {
    let principal = ctx.engine.register(&body.name, &body.email, body.role)?;
    Ok(Json(principal))
}

#[derive(Deserialize)]
pub struct AccountListQuery {
    #[serde(default)]
    pub status: Option<AccountStatus>,
}

#[derive(Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<Principal>,
    pub total: usize,
}

/// `GET /api/accounts?status=` — admin listing, oldest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AccountListQuery>,
) -> Result<Json<AccountListResponse>, ApiError> {
    let accounts = ctx.engine.list_accounts(&principal, query.status)?;
    let total = accounts.len();
    Ok(Json(AccountListResponse { accounts, total }))
}

#[derive(Deserialize)]
pub struct SetStatusBody {
    pub status: AccountStatus,
}

/// `POST /api/accounts/:id/status` — admin decision on an account.
pub async fn set_status(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(account_id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<Principal>, ApiError> {
    let account_id = Uuid::parse_str(&account_id)
        .map_err(|e| ApiError::Validation(format!("Invalid account id: {e}")))?;
    let account = ctx
        .engine
        .set_account_status(&principal, account_id, body.status)?;
    Ok(Json(account))
}
